//! # Calldata Encoding Helpers
//!
//! Stateless ABI encoding for the fixed function signatures the governance
//! flow submits, plus the ProposalCreated event topic and its decoder.
//! Selectors are derived from the canonical signatures at call time rather
//! than hardcoded.

use crate::error::{SimulatorError, SimulatorResult};
use sha3::{Digest, Keccak256};

/// Signature of the governor's proposal-creation event
pub const PROPOSAL_CREATED_SIGNATURE: &str =
    "ProposalCreated(uint256,address,address[],uint256[],string[],bytes[],uint256,uint256,string)";

/// First four bytes of the keccak-256 hash of a canonical function signature
fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// keccak-256 topic for an event signature, `0x`-prefixed
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

/// Topic0 used to filter governor logs for proposal creation
pub fn proposal_created_topic() -> String {
    event_topic(PROPOSAL_CREATED_SIGNATURE)
}

fn encode_u256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_address(address: &str) -> SimulatorResult<[u8; 32]> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    let bytes = hex::decode(stripped)
        .map_err(|e| SimulatorError::config_error(format!("Invalid address {address}: {e}")))?;
    if bytes.len() != 20 {
        return Err(SimulatorError::config_error(format!(
            "Invalid address length for {address}"
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

fn calldata(sel: [u8; 4], words: &[&[u8]]) -> String {
    let mut out = Vec::with_capacity(4 + words.iter().map(|w| w.len()).sum::<usize>());
    out.extend_from_slice(&sel);
    for word in words {
        out.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(out))
}

/// `delegate(address)` on the token contract
pub fn delegate_calldata(delegatee: &str) -> SimulatorResult<String> {
    let word = encode_address(delegatee)?;
    Ok(calldata(selector("delegate(address)"), &[&word]))
}

/// `propose(string)` on the payload contract
pub fn propose_calldata(description: &str) -> String {
    let bytes = description.as_bytes();
    let mut padded = bytes.to_vec();
    let remainder = padded.len() % 32;
    if remainder != 0 {
        padded.resize(padded.len() + 32 - remainder, 0);
    }
    let offset = encode_u256(32);
    let length = encode_u256(bytes.len() as u64);
    calldata(
        selector("propose(string)"),
        &[&offset, &length, padded.as_slice()],
    )
}

/// `castVote(uint256,uint8)` on the governor
pub fn cast_vote_calldata(proposal_id: u64, support: u8) -> String {
    let id = encode_u256(proposal_id);
    let support = encode_u256(u64::from(support));
    calldata(selector("castVote(uint256,uint8)"), &[&id, &support])
}

/// `queue(uint256)` on the governor
pub fn queue_calldata(proposal_id: u64) -> String {
    let id = encode_u256(proposal_id);
    calldata(selector("queue(uint256)"), &[&id])
}

/// `execute(uint256)` on the governor
pub fn execute_calldata(proposal_id: u64) -> String {
    let id = encode_u256(proposal_id);
    calldata(selector("execute(uint256)"), &[&id])
}

/// Minimal `0x`-prefixed hex for a block count or quantity
pub fn to_be_hex(value: u64) -> String {
    format!("{value:#x}")
}

/// Parse a `0x`-prefixed hex quantity into a u64
pub fn parse_hex_u64(value: &str) -> SimulatorResult<u64> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| SimulatorError::rpc_error("hex", format!("Invalid quantity {value}: {e}")))
}

/// Fields decoded from a ProposalCreated event's data payload.
///
/// The event carries nine parameters, none indexed. Only the static words
/// matter for flow control: id (word 0), proposer (word 1), startBlock
/// (word 6), endBlock (word 7). The dynamic arrays and description are
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCreatedEvent {
    pub id: u64,
    pub proposer: String,
    pub start_block: u64,
    pub end_block: u64,
}

/// Decode the static head of a ProposalCreated event data payload
pub fn decode_proposal_created(data: &str) -> SimulatorResult<ProposalCreatedEvent> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(stripped).map_err(|e| {
        SimulatorError::EventDiscovery(format!("Invalid event data encoding: {e}"))
    })?;
    if bytes.len() < 9 * 32 {
        return Err(SimulatorError::EventDiscovery(format!(
            "ProposalCreated data too short: {} bytes",
            bytes.len()
        )));
    }

    let word_u64 = |index: usize| -> SimulatorResult<u64> {
        let word = &bytes[index * 32..(index + 1) * 32];
        if word[..24].iter().any(|b| *b != 0) {
            return Err(SimulatorError::EventDiscovery(format!(
                "Event word {index} exceeds u64 range"
            )));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[24..]);
        Ok(u64::from_be_bytes(buf))
    };

    let proposer = format!("0x{}", hex::encode(&bytes[44..64]));

    Ok(ProposalCreatedEvent {
        id: word_u64(0)?,
        proposer,
        start_block: word_u64(6)?,
        end_block: word_u64(7)?,
    })
}
