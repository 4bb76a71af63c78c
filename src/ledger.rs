//! # Transaction Ledger
//!
//! In-memory record of every transaction the orchestrator submits, keyed by
//! transaction hash (plus a synthetic `proposal-<id>` alias for the
//! proposal-creation transaction). Entries transition from pending to a
//! terminal status and are never deleted; the summary is always ordered by
//! protocol stage, not insertion order.

use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a tracked transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Submitted, receipt not yet classified
    Pending,
    /// Mined with a success status flag, or trusted under the sandbox policy
    Success,
    /// Mined with a failure flag, timed out, or errored during verification
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One submitted transaction with its parameters and inspector link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
    pub gas_limit: String,
    pub gas_price: String,
    pub status: TxStatus,
    pub error: Option<String>,
    /// Deep link to the transaction on the environment dashboard
    pub dashboard_url: String,
    pub stage: Stage,
    pub description: String,
}

/// Ledger of every transaction submitted during one run.
///
/// The flow engine is strictly sequential, so no interior locking is needed;
/// the signal-driven termination path observes the ledger only through
/// [`TransactionLedger::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct TransactionLedger {
    entries: HashMap<String, TrackedTransaction>,
    /// Insertion order of keys, for deterministic iteration within a stage
    order: Vec<String>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry under the given key. The key is usually
    /// the transaction hash; the proposal-creation transaction is
    /// additionally recorded under `proposal-<id>`.
    pub fn record(&mut self, key: impl Into<String>, tx: TrackedTransaction) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, tx);
    }

    /// Transition an entry's status and optionally attach an error.
    /// A no-op when the hash is unknown; never errors.
    pub fn set_status(&mut self, hash: &str, status: TxStatus, error: Option<String>) {
        if let Some(tx) = self.entries.get_mut(hash) {
            tx.status = status;
            if error.is_some() {
                tx.error = error;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TrackedTransaction> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one stage, in insertion order
    pub fn by_stage(&self, stage: Stage) -> Vec<&TrackedTransaction> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter(|tx| tx.stage == stage)
            .collect()
    }

    /// Cheap owned copy published to the termination-signal observer after
    /// each stage completes.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Render the markdown summary table, ordered by the fixed stage
    /// priority list. The `proposal-<id>` alias intentionally duplicates the
    /// creation transaction and is skipped here so each submission appears
    /// once.
    pub fn summarize(&self) -> String {
        if self.entries.is_empty() {
            return "No transactions tracked.".to_string();
        }

        let mut summary = String::from("### 📊 Transaction Summary\n\n");
        summary.push_str("| Step | Status | Transaction |\n");
        summary.push_str("|------|--------|-------------|\n");

        for stage in Stage::ALL {
            for key in &self.order {
                if key.starts_with("proposal-") {
                    continue;
                }
                let Some(tx) = self.entries.get(key) else {
                    continue;
                };
                if tx.stage != stage {
                    continue;
                }
                let status = match tx.status {
                    TxStatus::Success => "✅ Success",
                    TxStatus::Failed => "❌ Failed",
                    TxStatus::Pending => "⏳ Pending",
                };
                let link = if tx.dashboard_url.is_empty() {
                    format!("{}...", &tx.hash[..tx.hash.len().min(10)])
                } else {
                    format!("[View]({})", tx.dashboard_url)
                };
                summary.push_str(&format!("| {} | {} | {} |\n", tx.stage, status, link));
                if let Some(error) = &tx.error {
                    summary.push_str(&format!("| | | **Error:** {error} |\n"));
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(hash: &str, stage: Stage, status: TxStatus) -> TrackedTransaction {
        TrackedTransaction {
            hash: hash.to_string(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            data: "0x".to_string(),
            value: "0x0".to_string(),
            gas_limit: "0x989680".to_string(),
            gas_price: "0x0".to_string(),
            status,
            error: None,
            dashboard_url: String::new(),
            stage,
            description: format!("{stage} tx"),
        }
    }

    #[test]
    fn set_status_on_unknown_hash_is_a_noop() {
        let mut ledger = TransactionLedger::new();
        ledger.set_status("0xmissing", TxStatus::Failed, Some("boom".into()));
        assert!(ledger.is_empty());
    }

    #[test]
    fn set_status_transitions_and_attaches_error() {
        let mut ledger = TransactionLedger::new();
        ledger.record("0xaa", tx("0xaa", Stage::Execution, TxStatus::Pending));
        ledger.set_status("0xaa", TxStatus::Failed, Some("status 0x0".into()));

        let entry = ledger.get("0xaa").unwrap();
        assert_eq!(entry.status, TxStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("status 0x0"));
    }

    #[test]
    fn summary_follows_stage_priority_regardless_of_insertion_order() {
        let mut ledger = TransactionLedger::new();
        ledger.record("0xee", tx("0xee", Stage::Execution, TxStatus::Success));
        ledger.record("0xvv", tx("0xvv", Stage::Voting, TxStatus::Success));
        ledger.record("0xdd", tx("0xdd", Stage::Deployment, TxStatus::Success));
        ledger.record("0xqq", tx("0xqq", Stage::Queueing, TxStatus::Success));

        let summary = ledger.summarize();
        let deployment = summary.find("| deployment |").unwrap();
        let voting = summary.find("| voting |").unwrap();
        let queueing = summary.find("| queueing |").unwrap();
        let execution = summary.find("| execution |").unwrap();
        assert!(deployment < voting && voting < queueing && queueing < execution);
    }

    #[test]
    fn proposal_alias_duplicates_content_but_not_summary_rows() {
        let mut ledger = TransactionLedger::new();
        let create = tx("0xcc", Stage::ProposalCreation, TxStatus::Success);
        ledger.record("0xcc", create.clone());
        ledger.record("proposal-7", create);

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("proposal-7").unwrap().hash, "0xcc");
        let rows = ledger.summarize().matches("proposalCreation").count();
        assert_eq!(rows, 1);
    }

    #[test]
    fn empty_ledger_summary() {
        assert_eq!(TransactionLedger::new().summarize(), "No transactions tracked.");
    }
}
