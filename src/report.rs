//! # Report Generator
//!
//! Renders the transaction ledger and flow outcome into an idempotent
//! markdown status document. Success and failure variants share a stable
//! anchor token embedding the proposal identifier, so a publisher can
//! locate and overwrite a prior report instead of duplicating it.

use crate::engine::FlowResult;
use crate::ledger::TransactionLedger;
use crate::provisioner::VnetHandle;

/// Stable anchor token identifying this proposal's report. Byte-identical
/// across runs for the same identifier.
pub fn anchor(igp_id: &str) -> String {
    format!("<!-- governance-simulation-igp-{igp_id} -->")
}

/// Cross-reference links included in the success report
#[derive(Debug, Clone, Default)]
pub struct ReportLinks {
    pub execution_url: String,
    pub fluid_ui_url: String,
}

/// Staging UI link keyed on the environment's RPC identity. Mirrors the
/// dashboard convention: the fourth path segment of the admin RPC, or the
/// last segment when the URL is shorter.
pub fn fluid_ui_link(admin_rpc: &str) -> String {
    let parts: Vec<&str> = admin_rpc.split('/').collect();
    let rpc_id = parts
        .get(3)
        .copied()
        .filter(|segment| !segment.is_empty())
        .or_else(|| parts.last().copied())
        .unwrap_or_default();
    format!("https://staging.fluid.io/?isCustomVnet=true&tenderlyId={rpc_id}")
}

/// Render the success report
pub fn render_success(
    igp_id: &str,
    result: &FlowResult,
    vnet: &VnetHandle,
    ledger: &TransactionLedger,
    actions: &[String],
    links: &ReportLinks,
) -> String {
    let actions_section = actions
        .iter()
        .map(|action| format!("- {action}"))
        .collect::<Vec<_>>()
        .join("\n");

    let proposal_tx_section = ledger
        .get(&format!("proposal-{}", result.proposal_id))
        .map(|tx| {
            format!(
                r"### Proposal Creation Transaction

**Transaction Hash:** `{hash}`

**Dashboard:** [View Transaction]({url})

<details>
<summary><kbd>Raw Transaction Data</kbd></summary>

```
From: {from}
To: {to}
Data: {data}
Value: {value}
Gas Limit: {gas_limit}
Gas Price: {gas_price}
```

</details>
",
                hash = tx.hash,
                url = tx.dashboard_url,
                from = tx.from,
                to = tx.to,
                data = tx.data,
                value = tx.value,
                gas_limit = tx.gas_limit,
                gas_price = tx.gas_price,
            )
        })
        .unwrap_or_default();

    format!(
        r"{anchor}

## Governance Simulation Completed - IGP-{igp_id}

**Payload Contract:** `PayloadIGP{igp_id}`

### Proposal Actions
{actions_section}

{summary}

{proposal_tx_section}
### Links

- [Execution Transaction]({execution})
- [Fluid UI (Staging)]({fluid})
- [Virtual Network Dashboard]({vnet_link})
",
        anchor = anchor(igp_id),
        summary = ledger.summarize(),
        execution = links.execution_url,
        fluid = links.fluid_ui_url,
        vnet_link = vnet.link,
    )
}

/// Render the failure report, including the ledger as of the failure point
pub fn render_failure(
    igp_id: &str,
    error_message: &str,
    vnet: Option<&VnetHandle>,
    ledger: &TransactionLedger,
) -> String {
    let vnet_section = vnet
        .map(|handle| {
            format!(
                r"### Virtual Network Details

| Parameter | Value |
|-----------|-------|
| Virtual Network ID | `{id}` |
| VNet Dashboard | [View Network]({link}) |
",
                id = handle.id,
                link = handle.link,
            )
        })
        .unwrap_or_default();

    format!(
        r"{anchor}

## Governance Simulation Failed - IGP-{igp_id}

**Payload Contract:** `PayloadIGP{igp_id}`

{summary}

### Error Details

**Error Message:** `{error_message}`

### Troubleshooting

{hints}

{vnet_section}
",
        anchor = anchor(igp_id),
        summary = ledger.summarize(),
        hints = troubleshooting(error_message),
    )
}

/// Rule-based troubleshooting note keyed on known error substrings
pub fn troubleshooting(error_message: &str) -> &'static str {
    if error_message.contains("execution reverted") {
        return "- **Transaction execution reverted** - Check business logic constraints
- Verify contract permissions and state requirements
- Review parameter validation and preconditions
- Use the environment debugger for a detailed stack trace";
    }

    if error_message.contains("Called function does not exist") {
        return "- **Function does not exist** - Verify function signature and ABI
- Check contract deployment and initialization
- Confirm correct contract address is being called
- Review contract interface and method names";
    }

    if error_message.contains("AdminModule__AddressNotAContract") {
        return "- **Address is not a contract** - Check pre-setup script requirements
- Verify all required contracts are deployed
- Review contract address configuration
- Ensure deployment completed successfully";
    }

    "- Review the error message above for specific details
- Check the environment debugger for transaction analysis"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{TrackedTransaction, TxStatus};
    use crate::stage::Stage;

    fn sample_vnet() -> VnetHandle {
        VnetHandle {
            id: "vnet-1".to_string(),
            admin_rpc: "https://rpc.tenderly.co/vnet/abc123".to_string(),
            slug: "igp-110-1".to_string(),
            link: "https://dashboard.tenderly.co/acct/proj/testnet/vnet-1".to_string(),
        }
    }

    fn tracked(hash: &str, stage: Stage) -> TrackedTransaction {
        TrackedTransaction {
            hash: hash.to_string(),
            from: "0xproposer".to_string(),
            to: "0xgovernor".to_string(),
            data: "0xfe0d94c1".to_string(),
            value: "0x0".to_string(),
            gas_limit: "0x2625A00".to_string(),
            gas_price: "0x0".to_string(),
            status: TxStatus::Success,
            error: None,
            dashboard_url: "https://dashboard.example/tx".to_string(),
            stage,
            description: String::new(),
        }
    }

    #[test]
    fn anchor_is_byte_stable_across_runs() {
        assert_eq!(anchor("110"), anchor("110"));
        assert_eq!(anchor("110"), "<!-- governance-simulation-igp-110 -->");
        assert_ne!(anchor("110"), anchor("111"));
    }

    #[test]
    fn success_report_carries_anchor_actions_and_proposal_tx() {
        let mut ledger = TransactionLedger::new();
        let create = tracked("0xcc", Stage::ProposalCreation);
        ledger.record("0xcc", create.clone());
        ledger.record("proposal-7", create);

        let report = render_success(
            "110",
            &FlowResult {
                proposal_id: 7,
                execution_tx_hash: "0xee".to_string(),
            },
            &sample_vnet(),
            &ledger,
            &["Action 1: Do X".to_string()],
            &ReportLinks::default(),
        );

        assert!(report.starts_with(&anchor("110")));
        assert!(report.contains("- Action 1: Do X"));
        assert!(report.contains("Raw Transaction Data"));
        assert!(report.contains("proposalCreation"));
    }

    #[test]
    fn failure_report_includes_ledger_snapshot_and_hints() {
        let mut ledger = TransactionLedger::new();
        let mut failed = tracked("0xee", Stage::Execution);
        failed.status = TxStatus::Failed;
        failed.error = Some("execution reverted".to_string());
        ledger.record("0xee", failed);

        let report = render_failure("110", "execution reverted", Some(&sample_vnet()), &ledger);

        assert!(report.contains(&anchor("110")));
        assert!(report.contains("Simulation Failed"));
        assert!(report.contains("| execution |"));
        assert!(report.contains("Transaction execution reverted"));
        assert!(report.contains("vnet-1"));
    }

    #[test]
    fn failure_report_without_environment_omits_vnet_section() {
        let report = render_failure("2", "boom", None, &TransactionLedger::new());
        assert!(!report.contains("Virtual Network Details"));
        assert!(report.contains("No transactions tracked."));
    }

    #[test]
    fn troubleshooting_distinguishes_known_substrings() {
        assert!(troubleshooting("execution reverted at 0x1").contains("reverted"));
        assert!(troubleshooting("Called function does not exist in contract")
            .contains("Function does not exist"));
        assert!(troubleshooting("AdminModule__AddressNotAContract(0xdead)")
            .contains("not a contract"));
        assert!(troubleshooting("something else").contains("Review the error message"));
    }

    #[test]
    fn fluid_ui_link_uses_fourth_path_segment() {
        assert_eq!(
            fluid_ui_link("https://rpc.tenderly.co/vnet/abc123"),
            "https://staging.fluid.io/?isCustomVnet=true&tenderlyId=vnet"
        );
    }

    #[test]
    fn reports_are_idempotent() {
        let ledger = TransactionLedger::new();
        let first = render_failure("9", "boom", None, &ledger);
        let second = render_failure("9", "boom", None, &ledger);
        assert_eq!(first, second);
    }
}
