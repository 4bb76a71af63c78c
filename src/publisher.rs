//! # Report Publisher
//!
//! Finds-or-creates, then updates, a comment on the configured issue/PR.
//! Absent credentials disable the integration silently; an update failure
//! falls back to creating a fresh comment, accepting a possible duplicate
//! over a lost report. Every call is bounded by the global timeout so a
//! reporting outage can never hang the run.

use crate::config::GithubConfig;
use crate::constants::{GITHUB_API_BASE, GLOBAL_TIMEOUT};
use crate::engine::FlowObservation;
use crate::error::{SimulatorError, SimulatorResult};
use crate::report;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Comment {
    id: u64,
    body: String,
}

/// Client for the comment-hosting API
#[derive(Debug, Clone)]
pub struct GithubPublisher {
    client: reqwest::Client,
    api_base: String,
    token: String,
    repo: String,
    pr_number: Option<u64>,
}

impl GithubPublisher {
    /// Build a publisher from the optional reporting configuration.
    /// `None` means the integration is disabled, which is never an error.
    pub fn from_config(config: Option<&GithubConfig>) -> SimulatorResult<Option<Self>> {
        let Some(config) = config else {
            info!("GitHub integration not configured, skipping comment management");
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(GLOBAL_TIMEOUT)
            .user_agent(format!("govsim/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Some(Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            token: config.token.clone(),
            repo: config.repo.clone(),
            pr_number: config.pr_number,
        }))
    }

    /// Point the publisher at a different API base (test servers)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn comments_url(&self, pr_number: u64) -> String {
        format!(
            "{}/repos/{}/issues/{pr_number}/comments",
            self.api_base, self.repo
        )
    }

    /// Search existing comments for the anchor token; return the match's id
    /// or create a placeholder and return its id. Any API failure is logged
    /// and reported as `None`; reporting problems never abort the run.
    pub async fn find_or_create(&self, anchor: &str, igp_id: &str) -> Option<u64> {
        let pr_number = self.pr_number?;

        let result = self.try_find_or_create(pr_number, anchor, igp_id).await;
        match result {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "GitHub comment management failed");
                None
            }
        }
    }

    async fn try_find_or_create(
        &self,
        pr_number: u64,
        anchor: &str,
        igp_id: &str,
    ) -> SimulatorResult<u64> {
        let comments: Vec<Comment> = self
            .client
            .get(self.comments_url(pr_number))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SimulatorError::Publishing(format!("Comment listing failed: {e}")))?
            .json()
            .await?;

        if let Some(existing) = comments.iter().find(|c| c.body.contains(anchor)) {
            info!(comment_id = existing.id, "Found existing report comment");
            return Ok(existing.id);
        }

        let placeholder = format!(
            "{anchor}\n\n## Governance Simulation - IGP-{igp_id}\n\n*Simulation in progress...*"
        );
        let created: Comment = self
            .client
            .post(self.comments_url(pr_number))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({ "body": placeholder }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SimulatorError::Publishing(format!("Comment creation failed: {e}")))?
            .json()
            .await?;

        info!(comment_id = created.id, "Created report comment");
        Ok(created.id)
    }

    /// Overwrite an existing comment's body
    pub async fn update(&self, comment_id: u64, body: &str) -> SimulatorResult<()> {
        self.client
            .patch(format!(
                "{}/repos/{}/issues/comments/{comment_id}",
                self.api_base, self.repo
            ))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SimulatorError::Publishing(format!("Comment update failed: {e}")))?;

        info!(comment_id, "Updated report comment");
        Ok(())
    }

    /// Create a brand-new comment, used as the fallback when update fails
    pub async fn create_new(&self, body: &str) -> SimulatorResult<()> {
        let Some(pr_number) = self.pr_number else {
            return Err(SimulatorError::Publishing(
                "No PR number configured".to_string(),
            ));
        };

        self.client
            .post(self.comments_url(pr_number))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SimulatorError::Publishing(format!("Comment creation failed: {e}")))?;

        info!("Created new report comment");
        Ok(())
    }

    /// Publish a report: update in place when a comment id is known, fall
    /// back to a fresh comment when the update fails. Total failure is
    /// logged only; it never becomes the run's exit status.
    pub async fn publish(&self, comment_id: Option<u64>, body: &str) {
        let update_result = match comment_id {
            Some(id) => self.update(id, body).await,
            None => Err(SimulatorError::Publishing(
                "No comment established".to_string(),
            )),
        };

        if let Err(update_err) = update_result {
            warn!(error = %update_err, "Comment update failed, creating a new comment");
            if let Err(create_err) = self.create_new(body).await {
                warn!(error = %create_err, "Could not publish report at all");
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn termination_signal() -> &'static str {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Spawn the termination-signal observer. On SIGINT/SIGTERM it reads the
/// latest post-stage snapshot and best-effort publishes a failure report
/// before exiting with a non-zero code. It only publishes when a report
/// comment was already established and an environment had been provisioned.
pub fn spawn_signal_handler(
    observer: watch::Receiver<FlowObservation>,
    publisher: Option<GithubPublisher>,
    comment_id: Option<u64>,
    igp_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = termination_signal().await;
        warn!(signal, "Process received termination signal");

        let observation = observer.borrow().clone();
        if let (Some(publisher), Some(id), Some(vnet)) =
            (publisher, comment_id, observation.vnet.as_ref())
        {
            let body = report::render_failure(
                &igp_id,
                &format!("Process terminated with signal: {signal}"),
                Some(vnet),
                &observation.ledger,
            );
            match crate::rpc::with_global_timeout("termination report", publisher.update(id, &body))
                .await
            {
                Ok(()) => info!("Failure report published on termination"),
                Err(e) => warn!(error = %e, "Failed to publish termination report"),
            }
        }

        std::process::exit(1);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(base: String, pr_number: Option<u64>) -> GithubPublisher {
        GithubPublisher::from_config(Some(&GithubConfig {
            token: "tok".to_string(),
            repo: "org/repo".to_string(),
            pr_number,
        }))
        .unwrap()
        .unwrap()
        .with_api_base(base)
    }

    #[test]
    fn absent_config_disables_the_integration() {
        assert!(GithubPublisher::from_config(None).unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_pr_number_skips_comment_management() {
        let publisher = publisher("http://localhost:1".to_string(), None);
        assert!(publisher.find_or_create("<!-- a -->", "1").await.is_none());
    }

    #[tokio::test]
    async fn finds_existing_comment_by_anchor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/issues/5/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 11, "body": "unrelated" },
                { "id": 22, "body": "<!-- governance-simulation-igp-110 -->\nolder report" }
            ])))
            .mount(&server)
            .await;

        let publisher = publisher(server.uri(), Some(5));
        let id = publisher
            .find_or_create("<!-- governance-simulation-igp-110 -->", "110")
            .await;
        assert_eq!(id, Some(22));
    }

    #[tokio::test]
    async fn creates_placeholder_when_no_comment_matches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Simulation in progress"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 33, "body": "placeholder"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(server.uri(), Some(5));
        let id = publisher.find_or_create("<!-- anchor -->", "110").await;
        assert_eq!(id, Some(33));
    }

    #[tokio::test]
    async fn publish_falls_back_to_new_comment_when_update_fails() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 44, "body": "new"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(server.uri(), Some(5));
        publisher.publish(Some(99), "report body").await;
    }

    #[tokio::test]
    async fn api_failure_on_find_is_reported_as_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let publisher = publisher(server.uri(), Some(5));
        assert!(publisher.find_or_create("<!-- a -->", "1").await.is_none());
    }
}
