//! Naming pointer resolution
//!
//! Dereferences the mutable naming pointer to the content identifier of the
//! newest bundle via the local node. The resolve always bypasses the node's
//! resolution cache so readers see the freshest mapping.

use std::path::PathBuf;

use common::prelude::ContentId;

use crate::node::{NodeClient, NodeError};

/// Prefix the node prints before the resolved identifier
const RESOLVED_PREFIX: &str = "/ipfs/";

#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// File holding the naming pointer's peer id
    pub key_file: PathBuf,
    /// Timeout string handed to `name resolve --timeout`
    pub resolve_timeout: String,
    pub allow_offline: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The pointer exists but has never been published. Recoverable by the
    /// publisher side, not the reader
    #[error("naming pointer not published: {reason}")]
    NotPublished { reason: String },
    #[error("malformed resolve output: {0}")]
    MalformedResult(String),
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Resolves the naming pointer to the newest bundle's identifier
pub struct NameResolver {
    node: NodeClient,
    config: ResolveConfig,
}

impl NameResolver {
    pub fn new(config: ResolveConfig, node: NodeClient) -> Self {
        Self { node, config }
    }

    /// Resolve the pointer to a content identifier
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotPublished`] when the key file is unreadable
    /// or empty (no network call is made), or when the node reports the
    /// pointer as never published. Output without the `/ipfs/` prefix is a
    /// [`ResolveError::MalformedResult`].
    pub async fn resolve(&self) -> Result<ContentId, ResolveError> {
        let peer = std::fs::read_to_string(&self.config.key_file).map_err(|e| {
            ResolveError::NotPublished {
                reason: format!(
                    "cannot read naming key file {}: {}",
                    self.config.key_file.display(),
                    e
                ),
            }
        })?;
        let peer = peer.trim();
        if peer.is_empty() {
            return Err(ResolveError::NotPublished {
                reason: format!(
                    "naming key file {} is empty",
                    self.config.key_file.display()
                ),
            });
        }

        let target = format!("/ipns/{}", peer);
        let mut args = vec![
            "name",
            "resolve",
            "--nocache",
            "--timeout",
            self.config.resolve_timeout.as_str(),
        ];
        if self.config.allow_offline {
            args.push("--offline");
        }
        args.push(target.as_str());

        let output = match self.node.run_with_retry(&args).await {
            Ok(output) => output,
            Err(e) if e.is_not_published() => {
                return Err(ResolveError::NotPublished {
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8_lossy(&output);
        let position = text
            .find(RESOLVED_PREFIX)
            .ok_or_else(|| ResolveError::MalformedResult(text.trim().to_string()))?;
        let id = text[position + RESOLVED_PREFIX.len()..].trim();
        if id.is_empty() {
            return Err(ResolveError::MalformedResult(text.trim().to_string()));
        }

        tracing::info!(peer = %peer, id = %id, "resolved naming pointer");
        Ok(ContentId::from(id))
    }
}
