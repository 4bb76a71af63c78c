//! # Artifact and Description Sources
//!
//! Filesystem conventions for per-proposal inputs: compiled payload
//! artifacts (required before deployment), the optional free-text proposal
//! description, and best-effort extraction of human-readable action
//! summaries from the payload source.

use crate::error::{SimulatorError, SimulatorResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Compiled payload contract artifact (hardhat layout)
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadArtifact {
    pub bytecode: String,
}

/// Path of the compiled artifact for a proposal identifier
fn artifact_path(root: &Path, igp_id: &str) -> PathBuf {
    root.join("artifacts")
        .join("contracts")
        .join("payloads")
        .join(format!("IGP{igp_id}"))
        .join(format!("PayloadIGP{igp_id}.sol"))
        .join(format!("PayloadIGP{igp_id}.json"))
}

/// Directory holding the proposal's source, description, and setup files
fn payload_dir(root: &Path, igp_id: &str) -> PathBuf {
    root.join("contracts")
        .join("payloads")
        .join(format!("IGP{igp_id}"))
}

impl PayloadArtifact {
    /// Load the compiled artifact for a proposal. Absence is fatal before
    /// any deployment is attempted.
    pub fn load(root: &Path, igp_id: &str) -> SimulatorResult<Self> {
        let path = artifact_path(root, igp_id);
        if !path.exists() {
            return Err(SimulatorError::Artifact(format!(
                "{}\nCompile the payload first or ensure PayloadIGP{igp_id}.sol exists",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Read the proposal description, defaulting to a generated title when the
/// file is absent or unreadable
pub fn read_description(root: &Path, igp_id: &str) -> String {
    let path = payload_dir(root, igp_id).join("description.md");
    std::fs::read_to_string(path).unwrap_or_else(|_| format!("IGP-{igp_id}"))
}

/// Best-effort extraction of proposal action descriptions.
///
/// Preference order: structured `// Action N: …` comments preceding
/// `actionN()` calls in the payload's execute body, then `### Action N:`
/// headings in description.md, then a placeholder stating nothing was found.
pub fn extract_proposal_actions(root: &Path, igp_id: &str) -> Vec<String> {
    let source_path =
        payload_dir(root, igp_id).join(format!("PayloadIGP{igp_id}.sol"));
    if let Ok(source) = std::fs::read_to_string(&source_path) {
        let actions = extract_actions_from_source(&source);
        if !actions.is_empty() {
            return actions;
        }
    } else {
        warn!(path = %source_path.display(), "Payload source not readable, falling back to description");
    }

    let description_path = payload_dir(root, igp_id).join("description.md");
    if let Ok(description) = std::fs::read_to_string(description_path) {
        let actions = extract_actions_from_description(&description);
        if !actions.is_empty() {
            return actions;
        }
    }

    vec!["No actions found in contract or description file".to_string()]
}

/// Parse `// Action N: Description` comments that directly precede an
/// `actionN()` invocation inside the execute body. The leading comment
/// marker is stripped.
pub fn extract_actions_from_source(source: &str) -> Vec<String> {
    let Some(body) = execute_body(source) else {
        return Vec::new();
    };

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("//") || is_action_call(line))
        .collect();

    let mut actions = Vec::new();
    for pair in lines.windows(2) {
        if pair[0].starts_with("//") && is_action_call(pair[1]) {
            let description = pair[0].trim_start_matches('/').trim_start();
            actions.push(description.to_string());
        }
    }
    actions
}

/// Parse `### Action N: Description` (or `## …`) headings out of the
/// markdown description, stripping the heading and label
pub fn extract_actions_from_description(description: &str) -> Vec<String> {
    description
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start_matches('#').trim_start();
            if line.starts_with('#') && trimmed.starts_with("Action ") {
                let rest = &trimmed["Action ".len()..];
                let digits = rest.chars().take_while(char::is_ascii_digit).count();
                if digits > 0 && rest[digits..].starts_with(':') {
                    return Some(rest[digits + 1..].trim().to_string());
                }
            }
            None
        })
        .collect()
}

/// Locate the body of `function execute(…)` by brace matching
fn execute_body(source: &str) -> Option<&str> {
    let start = source.find("function execute")?;
    let open = source[start..].find('{')? + start;

    let mut depth = 0usize;
    for (offset, ch) in source[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[open + 1..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_action_call(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("action") else {
        return false;
    };
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && rest[digits..].trim_start().starts_with('(')
}
