//! # Network Provisioner
//!
//! Creates a disposable forked-chain environment through the Tenderly
//! Virtual TestNet API and returns its connection endpoint and dashboard
//! link. Provisioning failure is fatal to the whole run; nothing downstream
//! can proceed without an environment, so there is no retry.

use crate::config::TenderlyConfig;
use crate::constants::{FORK_NETWORK_ID, GLOBAL_TIMEOUT, TENDERLY_API_BASE};
use crate::error::{SimulatorError, SimulatorResult};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Identity and connection endpoint of one provisioned environment.
/// Read-only after creation; every tracked transaction derives its
/// dashboard deep link from it.
#[derive(Debug, Clone)]
pub struct VnetHandle {
    pub id: String,
    pub admin_rpc: String,
    pub slug: String,
    /// Dashboard link for the whole environment
    pub link: String,
}

impl VnetHandle {
    /// Deep link to one transaction on the environment dashboard
    pub fn tx_url(&self, account_id: &str, project_slug: &str, hash: &str) -> String {
        format!(
            "https://dashboard.tenderly.co/{account_id}/{project_slug}/testnet/{}/tx/{hash}",
            self.id
        )
    }
}

#[derive(Debug, Deserialize)]
struct VnetResponse {
    id: String,
    slug: String,
    #[serde(default)]
    rpcs: Option<Vec<NamedRpc>>,
    /// Legacy single-endpoint field, used when the named list is absent
    #[serde(default)]
    admin_rpc_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedRpc {
    name: String,
    url: String,
}

/// Client for the environment-provisioning API
#[derive(Debug)]
pub struct VnetProvisioner {
    client: reqwest::Client,
    api_base: String,
    config: TenderlyConfig,
}

impl VnetProvisioner {
    pub fn new(config: TenderlyConfig) -> SimulatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(GLOBAL_TIMEOUT)
            .user_agent(format!("govsim/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: TENDERLY_API_BASE.to_string(),
            config,
        })
    }

    /// Point the provisioner at a different API base (test servers)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Create a fresh forked environment for the given proposal identifier.
    /// The slug carries a timestamp so repeated runs never collide.
    pub async fn provision(&self, igp_id: &str) -> SimulatorResult<VnetHandle> {
        let TenderlyConfig {
            access_key,
            account_id,
            project_slug,
        } = &self.config;

        if access_key.is_empty() || account_id.is_empty() || project_slug.is_empty() {
            return Err(SimulatorError::config_error(
                "Tenderly credentials not configured",
            ));
        }

        let slug = format!("igp-{igp_id}-{}", Utc::now().timestamp_millis());
        let body = json!({
            "slug": slug,
            "display_name": format!("IGP {igp_id} Simulation"),
            "fork_config": { "network_id": FORK_NETWORK_ID },
            "virtual_network_config": {
                "chain_config": { "chain_id": FORK_NETWORK_ID }
            }
        });

        let url = format!(
            "{}/api/v1/account/{account_id}/project/{project_slug}/vnets",
            self.api_base
        );

        let response = self
            .client
            .post(&url)
            .header("X-Access-Key", access_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SimulatorError::Provisioning(format!(
                "VNet creation returned {status}: {detail}"
            )));
        }

        let vnet: VnetResponse = response.json().await?;

        let admin_rpc = vnet
            .rpcs
            .as_deref()
            .and_then(|rpcs| {
                rpcs.iter()
                    .find(|rpc| rpc.name == "Admin RPC")
                    .map(|rpc| rpc.url.clone())
            })
            .or(vnet.admin_rpc_url)
            .ok_or_else(|| {
                SimulatorError::Provisioning("No admin RPC endpoint in VNet response".to_string())
            })?;

        let link = format!(
            "https://dashboard.tenderly.co/{account_id}/{project_slug}/testnet/{}",
            vnet.id
        );

        info!(vnet_id = %vnet.id, rpc = %admin_rpc, link = %link, "VNet created");

        Ok(VnetHandle {
            id: vnet.id,
            admin_rpc,
            slug: vnet.slug,
            link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> TenderlyConfig {
        TenderlyConfig {
            access_key: "key".to_string(),
            account_id: "acct".to_string(),
            project_slug: "proj".to_string(),
        }
    }

    #[tokio::test]
    async fn extracts_admin_rpc_from_named_endpoint_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/account/acct/project/proj/vnets"))
            .and(header("X-Access-Key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "vnet-1",
                "slug": "igp-110-123",
                "rpcs": [
                    { "name": "Public RPC", "url": "https://rpc.example/public" },
                    { "name": "Admin RPC", "url": "https://rpc.example/admin" }
                ]
            })))
            .mount(&server)
            .await;

        let provisioner = VnetProvisioner::new(creds())
            .unwrap()
            .with_api_base(server.uri());
        let handle = provisioner.provision("110").await.unwrap();

        assert_eq!(handle.id, "vnet-1");
        assert_eq!(handle.admin_rpc, "https://rpc.example/admin");
        assert_eq!(
            handle.link,
            "https://dashboard.tenderly.co/acct/proj/testnet/vnet-1"
        );
    }

    #[tokio::test]
    async fn falls_back_to_legacy_admin_rpc_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "vnet-2",
                "slug": "igp-9-456",
                "admin_rpc_url": "https://rpc.example/legacy-admin"
            })))
            .mount(&server)
            .await;

        let provisioner = VnetProvisioner::new(creds())
            .unwrap()
            .with_api_base(server.uri());
        let handle = provisioner.provision("9").await.unwrap();
        assert_eq!(handle.admin_rpc, "https://rpc.example/legacy-admin");
    }

    #[tokio::test]
    async fn missing_credentials_abort_before_any_request() {
        let provisioner = VnetProvisioner::new(TenderlyConfig::default()).unwrap();
        let err = provisioner.provision("1").await.unwrap_err();
        assert!(matches!(err, SimulatorError::Configuration(_)));
    }

    #[tokio::test]
    async fn api_failure_is_fatal_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let provisioner = VnetProvisioner::new(creds())
            .unwrap()
            .with_api_base(server.uri());
        let err = provisioner.provision("1").await.unwrap_err();
        assert!(matches!(err, SimulatorError::Provisioning(_)));
    }
}
