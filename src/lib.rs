//! # Governance Simulation Orchestrator
//!
//! Rehearses a governance proposal end to end against a disposable forked
//! chain environment: provision the fork, deploy the payload contract,
//! create the proposal, vote, queue, wait out the timelock, and execute.
//! Every transaction is tracked in a ledger, and the outcome is rendered
//! into a markdown report that can be published as a PR comment.
//!
//! ## Module Map
//!
//! - [`config`] - layered configuration (env over file over defaults)
//! - [`provisioner`] - disposable virtual testnet lifecycle
//! - [`rpc`] - JSON-RPC client for the sandboxed chain
//! - [`encoding`] - ABI selectors, calldata, and event decoding
//! - [`artifacts`] - compiled payload and description discovery
//! - [`engine`] - the sequential governance flow state machine
//! - [`ledger`] - transaction tracking and summaries
//! - [`report`] / [`publisher`] - markdown rendering and PR comments

pub mod artifacts;
pub mod config;
pub mod constants;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod presetup;
pub mod provisioner;
pub mod publisher;
pub mod report;
pub mod rpc;
pub mod stage;

pub use config::SimulationConfig;
pub use engine::{FlowEngine, FlowObservation, FlowResult, VerificationPolicy};
pub use error::{SimulatorError, SimulatorResult};
pub use ledger::{TrackedTransaction, TransactionLedger, TxStatus};
pub use provisioner::{VnetHandle, VnetProvisioner};
pub use publisher::GithubPublisher;
pub use stage::Stage;

/// Crate version, surfaced in user agents and logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
