//! Flow stage definitions shared by the engine and the transaction ledger.
//!
//! The governance rehearsal is one linear sequence of stages with no
//! branching; modeling the sequence as an enum makes reordering or inserting
//! a stage a type-checked change rather than a reshuffle of free-form calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named stages of the governance flow, in protocol order.
///
/// The declaration order doubles as the fixed priority used when summarizing
/// the transaction ledger: reports are always stage-oriented, never
/// insertion-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Payload contract deployment onto the fork
    Deployment,
    /// Marking the deployed payload executable by the governor
    SetExecutable,
    /// Delegating token voting weight to the payload
    Delegation,
    /// Submitting the propose() call and discovering the proposal event
    ProposalCreation,
    /// Casting votes from each configured voter
    Voting,
    /// Queueing the succeeded proposal into the timelock
    Queueing,
    /// Executing the queued proposal
    Execution,
}

impl Stage {
    /// All stages in summary priority order
    pub const ALL: [Stage; 7] = [
        Stage::Deployment,
        Stage::SetExecutable,
        Stage::Delegation,
        Stage::ProposalCreation,
        Stage::Voting,
        Stage::Queueing,
        Stage::Execution,
    ];

    /// Stages whose transactions must be verified against a mined receipt
    /// before their status is trusted. Everything else is fire-and-forget
    /// under the sandbox's synchronous-execution guarantee.
    pub fn is_outcome_critical(&self) -> bool {
        matches!(self, Stage::ProposalCreation | Stage::Execution)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::SetExecutable => write!(f, "setExecutable"),
            Self::Delegation => write!(f, "delegation"),
            Self::ProposalCreation => write!(f, "proposalCreation"),
            Self::Voting => write!(f, "voting"),
            Self::Queueing => write!(f, "queueing"),
            Self::Execution => write!(f, "execution"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" => Ok(Self::Deployment),
            "setExecutable" => Ok(Self::SetExecutable),
            "delegation" => Ok(Self::Delegation),
            "proposalCreation" => Ok(Self::ProposalCreation),
            "voting" => Ok(Self::Voting),
            "queueing" => Ok(Self::Queueing),
            "execution" => Ok(Self::Execution),
            _ => Err(format!("Invalid stage: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn display_round_trips_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_str(&stage.to_string()).unwrap(), stage);
        }
    }

    #[test]
    fn only_proposal_creation_and_execution_are_verified() {
        let critical: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(Stage::is_outcome_critical)
            .collect();
        assert_eq!(critical, vec![Stage::ProposalCreation, Stage::Execution]);
    }
}
