//! One-shot commands against the local storage node
//!
//! `NodeClient` is the spawn-with-timeout primitive shared by the name
//! resolver, the key registry, and the fetcher's local-node strategy. Failure
//! subtypes are classified here, at the process boundary, into
//! [`NodeErrorKind`]; callers match on the enum, never on stderr text.

pub mod supervisor;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use common::prelude::ContentId;

/// Fixed delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Classified failure cause of a node command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeErrorKind {
    /// The naming pointer exists but has never been published
    NotPublished,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{binary}' command timed out after {after:?}")]
    Timeout { binary: String, after: Duration },
    #[error("node command failed: {stderr}")]
    Command { kind: NodeErrorKind, stderr: String },
}

impl NodeError {
    pub fn is_not_published(&self) -> bool {
        matches!(
            self,
            NodeError::Command {
                kind: NodeErrorKind::NotPublished,
                ..
            }
        )
    }
}

/// The store reports an unpublished pointer in prose; recognize it once,
/// here, and hand callers a structured kind.
fn classify(stderr: &str) -> NodeErrorKind {
    if stderr.contains("no link named") || stderr.contains("could not resolve name") {
        NodeErrorKind::NotPublished
    } else {
        NodeErrorKind::Other
    }
}

/// Runs one-shot commands against the node binary with a hard timeout
#[derive(Debug, Clone)]
pub struct NodeClient {
    binary: String,
    timeout: Duration,
    max_retries: u32,
}

impl NodeClient {
    pub fn new(binary: String, timeout: Duration, max_retries: u32) -> Self {
        Self {
            binary,
            timeout,
            max_retries,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run a single command; the process is killed when the timeout expires
    pub async fn run(&self, args: &[&str]) -> Result<Vec<u8>, NodeError> {
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NodeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| NodeError::Timeout {
                binary: self.binary.clone(),
                after: self.timeout,
            })?
            .map_err(|source| NodeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            format!("node exited with {}", output.status)
        } else {
            stderr
        };
        Err(NodeError::Command {
            kind: classify(&stderr),
            stderr,
        })
    }

    /// Run a command with up to `max_retries` attempts and a fixed delay
    /// between them, returning the last error
    pub async fn run_with_retry(&self, args: &[&str]) -> Result<Vec<u8>, NodeError> {
        let attempts = self.max_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.run(args).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    tracing::warn!(attempt, max = attempts, error = %e, "node command attempt failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_error.expect("at least one attempt was made"))
    }

    /// Read content bytes from the local node
    pub async fn cat(&self, id: &ContentId) -> Result<Vec<u8>, NodeError> {
        self.run(&["cat", id.as_str()]).await
    }

    /// Add a file to the store, honoring the pinning flags
    pub async fn add_file(
        &self,
        path: &Path,
        pin_enabled: bool,
        pin_recursive: bool,
    ) -> Result<ContentId, NodeError> {
        let mut args: Vec<String> = vec!["add".to_string(), "-Q".to_string()];
        if !pin_enabled {
            args.push("--pin=false".to_string());
        }
        if !pin_recursive {
            args.push("--recursive=false".to_string());
        }
        args.push(path.display().to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_with_retry(&arg_refs).await?;
        Ok(ContentId::from(
            String::from_utf8_lossy(&output).trim().to_string(),
        ))
    }
}
