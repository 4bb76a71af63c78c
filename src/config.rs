//! # Configuration Resolver
//!
//! Merges environment variables, an optional YAML file, and compiled-in
//! defaults into one immutable [`SimulationConfig`]. Precedence, highest
//! first: environment variable, YAML value, default. A missing file is not
//! an error and a malformed file is logged and ignored; resolution never
//! aborts the process.

use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::warn;

/// Tenderly provisioning credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenderlyConfig {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub project_slug: String,
}

/// Governance actor addresses on the forked chain
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressConfig {
    /// INST token contract receiving the delegate call
    pub inst: String,
    /// Governor contract enforcing the proposal lifecycle
    pub governor: String,
    /// Address submitting propose/queue/execute
    pub proposer: String,
    /// Token holder delegating voting weight to the payload
    pub delegator: String,
    /// Addresses casting "for" votes, in submission order
    pub cast_votes: Vec<String>,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            inst: "0x6f40d4A6237C257fff2dB00FA0510DeEECd303eb".to_string(),
            governor: "0x0204Cd037B2ec03605CFdFe482D8e257C765fA1B".to_string(),
            proposer: "0xA45f7bD6A5Ff45D31aaCE6bCD3d426D9328cea01".to_string(),
            delegator: "0x5AAB0630aaCa6d0bf1c310aF6C2BB3826A951cFb".to_string(),
            cast_votes: vec![
                "0x5AAB0630aaCa6d0bf1c310aF6C2BB3826A951cFb".to_string(),
                "0xA45f7bD6A5Ff45D31aaCE6bCD3d426D9328cea01".to_string(),
            ],
        }
    }
}

/// Governance timing parameters in blocks/seconds
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    pub voting_delay: u64,
    pub voting_period: u64,
    pub timelock_delay: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_delay: 13140,
            voting_period: 13140,
            timelock_delay: 86400,
        }
    }
}

/// Optional GitHub reporting integration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    /// "owner/repo" form
    pub repo: String,
    pub pr_number: Option<u64>,
}

/// Complete, immutable run configuration
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    pub tenderly: TenderlyConfig,
    pub addresses: AddressConfig,
    pub governance: GovernanceConfig,
    pub github: Option<GithubConfig>,
}

/// Raw YAML file shape; every section is optional so a partial file merges
/// cleanly over the defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    tenderly: Option<TenderlyConfig>,
    addresses: Option<AddressConfig>,
    governance: Option<GovernanceConfig>,
    github: Option<GithubConfig>,
}

impl SimulationConfig {
    /// Resolve configuration from the given YAML path, the process
    /// environment, and compiled defaults.
    pub fn load(path: &Path) -> Self {
        let file = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<FileConfig>(&contents) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed config file, using defaults");
                    FileConfig::default()
                }
            },
            // Missing file falls back entirely to env + defaults.
            Err(_) => FileConfig::default(),
        };

        Self::merge(file)
    }

    fn merge(file: FileConfig) -> Self {
        let file_tenderly = file.tenderly.unwrap_or_default();
        let tenderly = TenderlyConfig {
            access_key: env_or("TENDERLY_ACCESS_KEY", file_tenderly.access_key),
            account_id: env_or("TENDERLY_ACCOUNT_ID", file_tenderly.account_id),
            project_slug: env_or("TENDERLY_PROJECT_SLUG", file_tenderly.project_slug),
        };

        let file_github = file.github;
        let token = env_or(
            "GITHUB_TOKEN",
            file_github.as_ref().map(|g| g.token.clone()).unwrap_or_default(),
        );
        let repo = env_or(
            "GITHUB_REPOSITORY",
            file_github.as_ref().map(|g| g.repo.clone()).unwrap_or_default(),
        );
        let pr_number = env::var("PR_NUMBER")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file_github.as_ref().and_then(|g| g.pr_number));

        // Reporting stays disabled unless both credentials are present; the
        // publisher treats a disabled integration as normal, never an error.
        let github = if !token.is_empty() && !repo.is_empty() {
            Some(GithubConfig {
                token,
                repo,
                pr_number,
            })
        } else {
            None
        };

        Self {
            tenderly,
            addresses: file.addresses.unwrap_or_default(),
            governance: file.governance.unwrap_or_default(),
            github,
        }
    }
}

fn env_or(var: &str, fallback: String) -> String {
    match env::var(var) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    /// Resolution reads the process environment, which is shared across test
    /// threads; every test takes this lock before touching or observing it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn defaults_apply_when_file_is_missing() {
        let _env = env_guard();
        let config = SimulationConfig::load(Path::new("does/not/exist.yml"));
        assert_eq!(config.governance.timelock_delay, 86400);
        assert_eq!(config.addresses.cast_votes.len(), 2);
    }

    #[test]
    fn file_values_override_defaults() {
        let _env = env_guard();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "governance:\n  voting_delay: 100\n  voting_period: 200\n  timelock_delay: 300"
        )
        .unwrap();

        let config = SimulationConfig::load(file.path());
        assert_eq!(config.governance.voting_delay, 100);
        assert_eq!(config.governance.timelock_delay, 300);
        // Untouched sections keep their defaults.
        assert_eq!(
            config.addresses.governor,
            "0x0204Cd037B2ec03605CFdFe482D8e257C765fA1B"
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let _env = env_guard();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tenderly:\n  access_key: from-file\n  account_id: acct-file\n  project_slug: proj-file"
        )
        .unwrap();

        std::env::set_var("TENDERLY_ACCESS_KEY", "from-env");
        let config = SimulationConfig::load(file.path());
        std::env::remove_var("TENDERLY_ACCESS_KEY");

        assert_eq!(config.tenderly.access_key, "from-env");
        assert_eq!(config.tenderly.account_id, "acct-file");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let _env = env_guard();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "governance: [not, a, mapping").unwrap();

        let config = SimulationConfig::load(file.path());
        assert_eq!(config.governance.voting_period, 13140);
    }

    #[test]
    fn github_disabled_without_credentials() {
        let _env = env_guard();
        std::env::remove_var("GITHUB_TOKEN");
        std::env::remove_var("GITHUB_REPOSITORY");
        let config = SimulationConfig::load(Path::new("does/not/exist.yml"));
        assert!(config.github.is_none());
    }
}
