//! # Governance Flow Engine
//!
//! The sequential state machine driving one proposal rehearsal: deploy the
//! payload, prepare state, create the proposal, walk it through voting,
//! queueing, and the timelock, then execute it. Transitions are strictly
//! forward with no rollback; a stage failure is fatal to the run except for
//! the documented tolerances (funding, pre-setup, time advancement).
//!
//! Every submitted transaction lands in the [`TransactionLedger`], and a
//! read-only snapshot of {ledger, environment} is published to observers
//! after each stage so the termination-signal path never reads live state.

use crate::artifacts::{self, PayloadArtifact};
use crate::config::SimulationConfig;
use crate::constants::{
    DEPLOY_GAS, EVENT_SCAN_WINDOW, EXECUTE_GAS, FUNDED_DEPLOYER, FUND_BALANCE_WEI,
    POST_EXECUTION_BLOCKS, SET_EXECUTABLE_CALLDATA, VOTE_GAS, VOTE_SUPPORT_FOR, ZERO_HEX,
};
use crate::encoding;
use crate::error::{SimulatorError, SimulatorResult};
use crate::ledger::{TrackedTransaction, TransactionLedger, TxStatus};
use crate::presetup::PreSetupRegistry;
use crate::provisioner::VnetHandle;
use crate::rpc::{ChainRpcClient, TxRequest};
use crate::stage::Stage;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Trust policy for a submitted transaction.
///
/// The sandbox executes synchronously and deterministically, so most
/// intermediate transactions are safe to record as successful without a
/// receipt. That assumption is only valid under the sandbox's guarantees,
/// so it is an explicit, overridable policy rather than hardcoded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Record as successful immediately; never poll for a receipt
    TrustSandbox,
    /// Poll for a mined receipt and classify before trusting the status
    Verify,
}

impl VerificationPolicy {
    /// Default policy per stage: outcome-critical stages are verified,
    /// everything else trusts the sandbox.
    pub fn default_for(stage: Stage) -> Self {
        if stage.is_outcome_critical() {
            Self::Verify
        } else {
            Self::TrustSandbox
        }
    }
}

/// Read-only snapshot published to observers after each stage completes
#[derive(Debug, Clone, Default)]
pub struct FlowObservation {
    pub ledger: TransactionLedger,
    pub vnet: Option<VnetHandle>,
}

/// Proposal derived from the governor's creation event
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: u64,
    pub proposer: String,
    pub start_block: u64,
    pub end_block: u64,
    pub description: String,
}

/// Terminal output of a successful flow
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub proposal_id: u64,
    pub execution_tx_hash: String,
}

/// Blocks to mine so the chain head passes the voting start.
/// The +2 margin guards against off-by-one activation semantics in the
/// target governor.
pub fn blocks_to_voting_start(start_block: u64, current_block: u64) -> u64 {
    (start_block + 2).saturating_sub(current_block)
}

/// Blocks to mine so the chain head passes the voting end
pub fn blocks_to_voting_end(end_block: u64, current_block: u64) -> u64 {
    (end_block + 1).saturating_sub(current_block)
}

/// Advance sandbox wall-clock time with the two-tier fallback: a direct
/// increase-time call, then a single block mined at `now + seconds`, then a
/// warning and no delay. Never fatal; execution may fail naturally later if
/// the timelock actually required the elapsed time.
pub async fn advance_time_with_fallback(rpc: &ChainRpcClient, seconds: u64) {
    match rpc.increase_time(seconds).await {
        Ok(()) => info!(seconds, "Time advanced"),
        Err(primary) => {
            warn!(error = %primary, "evm_increaseTime failed, attempting timestamp mine");
            let fallback = async {
                let block = rpc.latest_block().await?;
                rpc.mine_with_timestamp(block.timestamp + seconds).await
            };
            match fallback.await {
                Ok(()) => info!(seconds, "Mined block with advanced timestamp"),
                Err(e) => {
                    warn!(error = %e, "Time advancement failed, proceeding without delay");
                }
            }
        }
    }
}

/// Drives the eleven-stage governance sequence against one environment
pub struct FlowEngine {
    igp_id: String,
    config: SimulationConfig,
    vnet: VnetHandle,
    rpc: ChainRpcClient,
    ledger: TransactionLedger,
    pre_setup: PreSetupRegistry,
    project_root: PathBuf,
    observer: Option<watch::Sender<FlowObservation>>,
    policy_override: Option<VerificationPolicy>,
}

impl FlowEngine {
    pub fn new(
        igp_id: impl Into<String>,
        config: SimulationConfig,
        vnet: VnetHandle,
    ) -> SimulatorResult<Self> {
        let rpc = ChainRpcClient::new(vnet.admin_rpc.clone())?;
        Ok(Self {
            igp_id: igp_id.into(),
            config,
            vnet,
            rpc,
            ledger: TransactionLedger::new(),
            pre_setup: PreSetupRegistry::new(),
            project_root: PathBuf::from("."),
            observer: None,
            policy_override: None,
        })
    }

    /// Attach pre-setup routines for this run
    pub fn with_pre_setup(mut self, registry: PreSetupRegistry) -> Self {
        self.pre_setup = registry;
        self
    }

    /// Resolve artifact and description paths against a different root
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Publish a {ledger, environment} snapshot after every stage
    pub fn with_observer(mut self, sender: watch::Sender<FlowObservation>) -> Self {
        self.observer = Some(sender);
        self
    }

    /// Force one verification policy for every stage, overriding the
    /// per-stage defaults
    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy_override = Some(policy);
        self
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn vnet(&self) -> &VnetHandle {
        &self.vnet
    }

    /// Run the full governance sequence. The ledger remains readable through
    /// [`FlowEngine::ledger`] after a failure, so reports can include every
    /// transaction up to the failure point.
    pub async fn run(&mut self) -> SimulatorResult<FlowResult> {
        let artifact = PayloadArtifact::load(&self.project_root, &self.igp_id)?;

        let payload = self.deploy(&artifact).await?;
        self.publish_observation();

        self.pre_setup.run_for(&self.igp_id, &self.rpc).await;

        self.mark_executable(&payload).await?;
        self.publish_observation();

        self.delegate(&payload).await?;
        self.publish_observation();

        let proposal = self.create_proposal(&payload).await?;
        self.publish_observation();

        self.advance_to_voting_start(&proposal).await?;

        self.cast_votes(proposal.id).await?;
        self.publish_observation();

        self.advance_to_voting_end(&proposal).await?;

        self.queue(proposal.id).await?;
        self.publish_observation();

        info!(
            seconds = self.config.governance.timelock_delay,
            "Waiting out the timelock delay"
        );
        advance_time_with_fallback(&self.rpc, self.config.governance.timelock_delay).await;

        let execution_tx_hash = self.execute(proposal.id).await;
        self.publish_observation();
        let execution_tx_hash = execution_tx_hash?;

        // Final advancement is cosmetic; a failure here never taints the run.
        if let Err(e) = self.rpc.increase_blocks(POST_EXECUTION_BLOCKS).await {
            warn!(error = %e, "Final block advancement skipped");
        }

        info!(
            proposal_id = proposal.id,
            tx = %execution_tx_hash,
            "Proposal executed"
        );

        Ok(FlowResult {
            proposal_id: proposal.id,
            execution_tx_hash,
        })
    }

    fn policy(&self, stage: Stage) -> VerificationPolicy {
        self.policy_override
            .unwrap_or_else(|| VerificationPolicy::default_for(stage))
    }

    fn tx_url(&self, hash: &str) -> String {
        self.vnet.tx_url(
            &self.config.tenderly.account_id,
            &self.config.tenderly.project_slug,
            hash,
        )
    }

    fn publish_observation(&self) {
        if let Some(sender) = &self.observer {
            let _ = sender.send(FlowObservation {
                ledger: self.ledger.snapshot(),
                vnet: Some(self.vnet.clone()),
            });
        }
    }

    /// Submit a transaction, record it, and apply the stage's verification
    /// policy. A verified transaction that fails its receipt classification
    /// is recorded as failed and aborts the stage.
    async fn submit(
        &mut self,
        stage: Stage,
        description: String,
        tx: TxRequest,
    ) -> SimulatorResult<String> {
        let hash = self.rpc.send_transaction(&tx).await?;
        let policy = self.policy(stage);
        let initial = match policy {
            VerificationPolicy::TrustSandbox => TxStatus::Success,
            VerificationPolicy::Verify => TxStatus::Pending,
        };

        self.ledger.record(
            hash.clone(),
            TrackedTransaction {
                hash: hash.clone(),
                from: tx.from,
                to: tx.to.unwrap_or_default(),
                data: tx.data,
                value: tx.value,
                gas_limit: tx.gas,
                gas_price: tx.gas_price,
                status: initial,
                error: None,
                dashboard_url: self.tx_url(&hash),
                stage,
                description,
            },
        );

        if policy == VerificationPolicy::Verify {
            if let Err(message) = self.verify(&hash).await {
                self.ledger
                    .set_status(&hash, TxStatus::Failed, Some(message.clone()));
                return Err(SimulatorError::verification(stage.to_string(), message));
            }
            self.ledger.set_status(&hash, TxStatus::Success, None);
        }

        Ok(hash)
    }

    /// Poll for a mined receipt and classify it. Any timeout, RPC error, or
    /// non-success status flag classifies as failed.
    async fn verify(&self, hash: &str) -> Result<(), String> {
        match self.rpc.wait_for_receipt(hash).await {
            Ok(receipt) if receipt.succeeded() => Ok(()),
            Ok(_) => Err("Transaction failed (status: 0x0)".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn deploy(&mut self, artifact: &PayloadArtifact) -> SimulatorResult<String> {
        info!(igp_id = %self.igp_id, from = FUNDED_DEPLOYER, "Deploying payload contract");

        // Funding may fail on some sandbox versions; deployment is attempted
        // regardless and downstream steps fail naturally if it mattered.
        if let Err(e) = self.rpc.set_balance(FUNDED_DEPLOYER, FUND_BALANCE_WEI).await {
            warn!(error = %e, "Could not fund deployer account, attempting deployment anyway");
        }

        let tx = TxRequest {
            from: FUNDED_DEPLOYER.to_string(),
            to: None,
            data: artifact.bytecode.clone(),
            value: ZERO_HEX.to_string(),
            gas: DEPLOY_GAS.to_string(),
            gas_price: ZERO_HEX.to_string(),
        };
        let hash = self.rpc.send_transaction(&tx).await?;

        self.ledger.record(
            hash.clone(),
            TrackedTransaction {
                hash: hash.clone(),
                from: tx.from,
                to: String::new(),
                data: tx.data,
                value: tx.value,
                gas_limit: tx.gas,
                gas_price: tx.gas_price,
                status: TxStatus::Success,
                error: None,
                dashboard_url: self.tx_url(&hash),
                stage: Stage::Deployment,
                description: format!("Deploy PayloadIGP{} Contract", self.igp_id),
            },
        );

        let receipt = self.rpc.wait_for_receipt(&hash).await.map_err(|e| {
            SimulatorError::Deployment(format!("Could not get deployment receipt: {e}"))
        })?;

        let address = receipt.contract_address.ok_or_else(|| {
            SimulatorError::Deployment("No contract address in receipt".to_string())
        })?;

        info!(address = %address, "Payload deployed");
        Ok(address)
    }

    async fn mark_executable(&mut self, payload: &str) -> SimulatorResult<()> {
        self.submit(
            Stage::SetExecutable,
            format!("Set PayloadIGP{} as Executable", self.igp_id),
            TxRequest {
                from: FUNDED_DEPLOYER.to_string(),
                to: Some(payload.to_string()),
                data: SET_EXECUTABLE_CALLDATA.to_string(),
                value: ZERO_HEX.to_string(),
                gas: DEPLOY_GAS.to_string(),
                gas_price: ZERO_HEX.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    async fn delegate(&mut self, payload: &str) -> SimulatorResult<()> {
        let data = encoding::delegate_calldata(payload)?;
        self.submit(
            Stage::Delegation,
            format!("Delegate INST Voting Power to PayloadIGP{}", self.igp_id),
            TxRequest {
                from: self.config.addresses.delegator.clone(),
                to: Some(self.config.addresses.inst.clone()),
                data,
                value: ZERO_HEX.to_string(),
                gas: DEPLOY_GAS.to_string(),
                gas_price: ZERO_HEX.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    async fn create_proposal(&mut self, payload: &str) -> SimulatorResult<Proposal> {
        let description = artifacts::read_description(&self.project_root, &self.igp_id);
        let data = encoding::propose_calldata(&description);

        let hash = self
            .submit(
                Stage::ProposalCreation,
                format!("Create IGP-{}", self.igp_id),
                TxRequest {
                    from: self.config.addresses.proposer.clone(),
                    to: Some(payload.to_string()),
                    data,
                    value: ZERO_HEX.to_string(),
                    gas: DEPLOY_GAS.to_string(),
                    gas_price: ZERO_HEX.to_string(),
                },
            )
            .await?;

        // Give the sandbox a moment to index the event log.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let current_block = self.rpc.block_number().await?;
        let from_block = current_block.saturating_sub(EVENT_SCAN_WINDOW);
        info!(from_block, current_block, "Scanning for ProposalCreated events");

        let logs = self
            .rpc
            .get_logs(
                &self.config.addresses.governor,
                &encoding::proposal_created_topic(),
                from_block,
            )
            .await?;

        // The window may contain older proposals; the most recently emitted
        // event is ours.
        let last = logs.last().ok_or_else(|| {
            SimulatorError::EventDiscovery("No ProposalCreated events found".to_string())
        })?;
        let event = encoding::decode_proposal_created(&last.data)?;

        // Alias the creation transaction under the proposal id so reports
        // can find it without knowing the hash.
        if let Some(entry) = self.ledger.get(&hash).cloned() {
            self.ledger.record(format!("proposal-{}", event.id), entry);
        }

        info!(
            proposal_id = event.id,
            start_block = event.start_block,
            end_block = event.end_block,
            "Proposal created"
        );

        Ok(Proposal {
            id: event.id,
            proposer: event.proposer,
            start_block: event.start_block,
            end_block: event.end_block,
            description,
        })
    }

    async fn advance_to_voting_start(&mut self, proposal: &Proposal) -> SimulatorResult<()> {
        let current = self.rpc.block_number().await?;
        let blocks = blocks_to_voting_start(proposal.start_block, current);
        info!(
            blocks,
            current,
            target = proposal.start_block,
            "Advancing to voting start"
        );
        self.rpc.increase_blocks(blocks).await?;
        Ok(())
    }

    async fn cast_votes(&mut self, proposal_id: u64) -> SimulatorResult<()> {
        let data = encoding::cast_vote_calldata(proposal_id, VOTE_SUPPORT_FOR);
        // Voters go one at a time to keep nonce ordering deterministic
        // against the sandbox.
        for voter in self.config.addresses.cast_votes.clone() {
            self.submit(
                Stage::Voting,
                format!("Cast Vote for IGP-{}", self.igp_id),
                TxRequest {
                    from: voter.clone(),
                    to: Some(self.config.addresses.governor.clone()),
                    data: data.clone(),
                    value: ZERO_HEX.to_string(),
                    gas: VOTE_GAS.to_string(),
                    gas_price: ZERO_HEX.to_string(),
                },
            )
            .await?;
            info!(voter = %voter, "Vote cast");
        }
        Ok(())
    }

    async fn advance_to_voting_end(&mut self, proposal: &Proposal) -> SimulatorResult<()> {
        let current = self.rpc.block_number().await?;
        let blocks = blocks_to_voting_end(proposal.end_block, current);
        info!(
            blocks,
            current,
            target = proposal.end_block,
            "Advancing to voting end"
        );
        self.rpc.increase_blocks(blocks).await?;
        Ok(())
    }

    async fn queue(&mut self, proposal_id: u64) -> SimulatorResult<()> {
        self.submit(
            Stage::Queueing,
            format!("Queue IGP-{} Proposal {proposal_id}", self.igp_id),
            TxRequest {
                from: self.config.addresses.proposer.clone(),
                to: Some(self.config.addresses.governor.clone()),
                data: encoding::queue_calldata(proposal_id),
                value: ZERO_HEX.to_string(),
                gas: VOTE_GAS.to_string(),
                gas_price: ZERO_HEX.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    async fn execute(&mut self, proposal_id: u64) -> SimulatorResult<String> {
        self.submit(
            Stage::Execution,
            format!("Execute IGP-{} Proposal {proposal_id}", self.igp_id),
            TxRequest {
                from: self.config.addresses.proposer.clone(),
                to: Some(self.config.addresses.governor.clone()),
                data: encoding::execute_calldata(proposal_id),
                value: ZERO_HEX.to_string(),
                gas: EXECUTE_GAS.to_string(),
                gas_price: ZERO_HEX.to_string(),
            },
        )
        .await
    }
}
