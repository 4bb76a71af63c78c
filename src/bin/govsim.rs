//! Command-line entry point for the governance simulation orchestrator.

use clap::Parser;
use govsim::config::SimulationConfig;
use govsim::engine::{FlowEngine, FlowObservation};
use govsim::error::SimulatorResult;
use govsim::logging::init_logging;
use govsim::presetup::PreSetupRegistry;
use govsim::provisioner::{VnetHandle, VnetProvisioner};
use govsim::publisher::{spawn_signal_handler, GithubPublisher};
use govsim::{report, VERSION};
use std::io::Write;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "govsim",
    version = VERSION,
    about = "Rehearse a governance proposal against a disposable forked chain"
)]
struct Cli {
    /// Proposal identifier, with or without an IGP prefix (e.g. 110, igp-110)
    #[arg(long)]
    id: String,

    /// Configuration file path
    #[arg(long, default_value = "config/simulation-config.yml")]
    config: String,
}

/// Parse arguments, exiting 1 with usage on a bad or missing argument.
/// Help and version requests still exit 0.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = i32::from(e.use_stderr());
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Strip common identifier prefixes down to the bare number
fn normalize_id(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    lowered
        .strip_prefix("igp-")
        .or_else(|| lowered.strip_prefix("igp"))
        .unwrap_or(&lowered)
        .to_string()
}

/// Append a key=value line for the CI workflow, if an output file is set
fn ci_output(key: &str, value: &str) {
    let Ok(path) = std::env::var("GITHUB_OUTPUT") else {
        return;
    };
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{key}={value}"));
    if let Err(e) = result {
        warn!(error = %e, key, "Could not write CI output");
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = parse_args();
    let igp_id = normalize_id(&cli.id);
    info!(igp_id = %igp_id, version = VERSION, "Starting governance simulation");

    let config = SimulationConfig::load(std::path::Path::new(&cli.config));

    let publisher = match GithubPublisher::from_config(config.github.as_ref()) {
        Ok(publisher) => publisher,
        Err(e) => {
            warn!(error = %e, "Could not build GitHub client, reports stay local");
            None
        }
    };

    let anchor = report::anchor(&igp_id);
    let comment_id = match &publisher {
        Some(publisher) => publisher.find_or_create(&anchor, &igp_id).await,
        None => None,
    };

    let (observer_tx, observer_rx) = watch::channel(FlowObservation::default());
    let _signal_handler = spawn_signal_handler(
        observer_rx,
        publisher.clone(),
        comment_id,
        igp_id.clone(),
    );

    match run(&igp_id, config.clone(), observer_tx).await {
        Ok((body, outputs)) => {
            if let Some(publisher) = &publisher {
                publisher.publish(comment_id, &body).await;
            }
            for (key, value) in &outputs {
                ci_output(key, value);
            }
            info!(igp_id = %igp_id, "Simulation completed successfully");
        }
        Err((error, ledger, vnet)) => {
            error!(error = %error, "Simulation failed");

            let body = report::render_failure(&igp_id, &error.to_string(), vnet.as_ref(), &ledger);
            if let Some(publisher) = &publisher {
                publisher.publish(comment_id, &body).await;
            }

            eprintln!("\nTroubleshooting:\n{}", report::troubleshooting(&error.to_string()));

            ci_output("simulation_status", "failed");
            ci_output("error_message", &error.to_string());
            if let Some(vnet) = &vnet {
                ci_output("vnet_id", &vnet.id);
                ci_output("vnet_link", &vnet.link);
            }
            std::process::exit(1);
        }
    }
}

type RunFailure = (govsim::SimulatorError, govsim::TransactionLedger, Option<VnetHandle>);

/// Provision the environment and drive the flow, returning either the
/// rendered success report plus CI outputs, or enough context to render a
/// failure report.
async fn run(
    igp_id: &str,
    config: SimulationConfig,
    observer: watch::Sender<FlowObservation>,
) -> Result<(String, Vec<(String, String)>), RunFailure> {
    let vnet = provision(igp_id, &config)
        .await
        .map_err(|e| (e, govsim::TransactionLedger::new(), None))?;
    let _ = observer.send(FlowObservation {
        ledger: govsim::TransactionLedger::new(),
        vnet: Some(vnet.clone()),
    });

    let mut engine = match FlowEngine::new(igp_id, config.clone(), vnet.clone()) {
        Ok(engine) => engine
            .with_pre_setup(PreSetupRegistry::new())
            .with_observer(observer),
        Err(e) => return Err((e, govsim::TransactionLedger::new(), Some(vnet))),
    };

    let result = match engine.run().await {
        Ok(result) => result,
        Err(e) => return Err((e, engine.ledger().snapshot(), Some(vnet))),
    };

    let links = report::ReportLinks {
        execution_url: vnet.tx_url(
            &config.tenderly.account_id,
            &config.tenderly.project_slug,
            &result.execution_tx_hash,
        ),
        fluid_ui_url: report::fluid_ui_link(&vnet.admin_rpc),
    };
    let actions = govsim::artifacts::extract_proposal_actions(std::path::Path::new("."), igp_id);
    let body = report::render_success(igp_id, &result, &vnet, engine.ledger(), &actions, &links);

    let outputs = vec![
        ("proposal_id".to_string(), result.proposal_id.to_string()),
        ("vnet_id".to_string(), vnet.id.clone()),
        (
            "transaction_hash".to_string(),
            result.execution_tx_hash.clone(),
        ),
        (
            "tenderly_execution_link".to_string(),
            links.execution_url.clone(),
        ),
        ("fluid_ui_link".to_string(), links.fluid_ui_url.clone()),
    ];

    Ok((body, outputs))
}

async fn provision(igp_id: &str, config: &SimulationConfig) -> SimulatorResult<VnetHandle> {
    let provisioner = VnetProvisioner::new(config.tenderly.clone())?;
    provisioner.provision(igp_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identifier_is_a_usage_error_not_a_help_request() {
        let err = Cli::try_parse_from(["govsim"]).unwrap_err();
        assert!(err.use_stderr());
        assert_eq!(i32::from(err.use_stderr()), 1);

        let help = Cli::try_parse_from(["govsim", "--help"]).unwrap_err();
        assert!(!help.use_stderr());
    }

    #[test]
    fn identifier_prefixes_are_stripped() {
        assert_eq!(normalize_id("110"), "110");
        assert_eq!(normalize_id("igp-110"), "110");
        assert_eq!(normalize_id("IGP-110"), "110");
        assert_eq!(normalize_id("IGP110"), "110");
        assert_eq!(normalize_id("  igp-7 "), "7");
    }
}
