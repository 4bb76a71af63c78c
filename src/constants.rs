//! # System Constants
//!
//! Operational boundaries of the governance rehearsal flow: the global
//! timeout bounding every network wait, per-stage gas allowances, and the
//! sandbox addresses and calldata the flow submits verbatim.

use std::time::Duration;

/// Global timeout bounding every receipt poll and publisher call (10 minutes)
pub const GLOBAL_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval between receipt polls while waiting for a transaction to mine
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Gas allowance for deployment, setup calls, and proposal creation (160M)
pub const DEPLOY_GAS: &str = "0x9896800";

/// Gas allowance for votes and queueing (10M)
pub const VOTE_GAS: &str = "0x989680";

/// Gas allowance for proposal execution (40M). Execution may fan out into
/// many downstream contracts, so it gets a higher limit than the vote and
/// queue allowance.
pub const EXECUTE_GAS: &str = "0x2625A00";

/// Zero value/gas-price used on every sandbox transaction
pub const ZERO_HEX: &str = "0x0";

/// Pre-funded sender used for deployment and setup calls on the fork
pub const FUNDED_DEPLOYER: &str = "0x4F6F977aCDD1177DCD81aB83074855EcB9C2D49e";

/// Balance topped up onto the deployer before deployment (100 ETH in wei)
pub const FUND_BALANCE_WEI: &str = "0x56BC75E2D63100000";

/// Calldata for `setExecutable(true)` on a freshly deployed payload
pub const SET_EXECUTABLE_CALLDATA: &str =
    "0x0e6a204c0000000000000000000000000000000000000000000000000000000000000001";

/// Blocks scanned backwards from the head when looking for the
/// ProposalCreated event after proposal submission
pub const EVENT_SCAN_WINDOW: u64 = 10;

/// Non-critical block advance attempted after successful execution
pub const POST_EXECUTION_BLOCKS: u64 = 10;

/// The "for" support value passed to castVote
pub const VOTE_SUPPORT_FOR: u8 = 1;

/// Tenderly API base used by the provisioner
pub const TENDERLY_API_BASE: &str = "https://api.tenderly.co";

/// GitHub API base used by the report publisher
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Chain identity forked by every provisioned environment (Ethereum mainnet)
pub const FORK_NETWORK_ID: u64 = 1;
