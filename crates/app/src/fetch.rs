//! Multi-source content fetcher with ordered failover
//!
//! The connection mode decides the strategy order: `gateway` tries the
//! primary gateway, then the fallbacks, then the local node; `api` tries the
//! local node first. Attempts are strictly sequential (the first success
//! short-circuits) and every failure is recorded so the final error names
//! each upstream and why it failed, in attempt order.
//!
//! The fetcher makes no caching or pinning decisions.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use common::prelude::ContentId;

use crate::config::ConnectionMode;
use crate::node::NodeClient;

const USER_AGENT: &str = concat!("loglink/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub mode: ConnectionMode,
    pub gateway_url: Url,
    pub fallback_gateways: Vec<Url>,
    pub use_fallback_gateways: bool,
    /// Per-attempt timeout
    pub timeout: Duration,
}

/// One upstream to try, in order
#[derive(Debug, Clone)]
enum Strategy {
    Gateway(Url),
    LocalNode,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Gateway(url) => write!(f, "gateway {}", url),
            Strategy::LocalNode => f.write_str("local node"),
        }
    }
}

/// A single failed attempt, kept for the aggregate error
#[derive(Debug)]
pub struct AttemptFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("all fetch attempts for {id} failed:\n{}", format_attempts(.attempts))]
    NotFound {
        id: ContentId,
        attempts: Vec<AttemptFailure>,
    },
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieves raw bytes for a content identifier with sequential fallback
pub struct ContentFetcher {
    http: Client,
    node: NodeClient,
    config: FetchConfig,
}

impl ContentFetcher {
    pub fn new(config: FetchConfig, node: NodeClient) -> Result<Self, FetchError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, node, config })
    }

    /// Strategy order for the configured connection mode
    fn strategies(&self) -> Vec<Strategy> {
        let mut gateways = vec![Strategy::Gateway(self.config.gateway_url.clone())];
        if self.config.use_fallback_gateways {
            gateways.extend(
                self.config
                    .fallback_gateways
                    .iter()
                    .cloned()
                    .map(Strategy::Gateway),
            );
        }

        match self.config.mode {
            ConnectionMode::Gateway => {
                gateways.push(Strategy::LocalNode);
                gateways
            }
            ConnectionMode::Api => {
                let mut strategies = vec![Strategy::LocalNode];
                strategies.extend(gateways);
                strategies
            }
        }
    }

    /// Fetch raw bytes for `id`, trying each strategy in order
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] only after every strategy has been
    /// tried; the error message concatenates each attempt's failure reason in
    /// attempt order.
    pub async fn fetch(&self, id: &ContentId) -> Result<Vec<u8>, FetchError> {
        let mut attempts = Vec::new();
        for strategy in self.strategies() {
            match self.attempt(&strategy, id).await {
                Ok(bytes) => {
                    tracing::debug!(%id, source = %strategy, size = bytes.len(), "fetched content");
                    return Ok(bytes);
                }
                Err(reason) => {
                    tracing::warn!(%id, source = %strategy, %reason, "fetch attempt failed");
                    attempts.push(AttemptFailure {
                        source: strategy.to_string(),
                        reason,
                    });
                }
            }
        }
        Err(FetchError::NotFound {
            id: id.clone(),
            attempts,
        })
    }

    async fn attempt(&self, strategy: &Strategy, id: &ContentId) -> Result<Vec<u8>, String> {
        match strategy {
            Strategy::Gateway(base) => {
                let url = format!("{}{}", base, id);
                let response = self
                    .http
                    .get(&url)
                    .timeout(self.config.timeout)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !response.status().is_success() {
                    return Err(format!("gateway responded with status {}", response.status()));
                }
                response
                    .bytes()
                    .await
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| e.to_string())
            }
            Strategy::LocalNode => self.node.cat(id).await.map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fetcher(mode: ConnectionMode, use_fallbacks: bool, node_binary: &str) -> ContentFetcher {
        let config = FetchConfig {
            mode,
            gateway_url: Url::parse("http://127.0.0.1:9/ipfs/").unwrap(),
            fallback_gateways: vec![
                Url::parse("http://127.0.0.1:9/fb1/").unwrap(),
                Url::parse("http://127.0.0.1:9/fb2/").unwrap(),
            ],
            use_fallback_gateways: use_fallbacks,
            timeout: Duration::from_secs(2),
        };
        let node = NodeClient::new(node_binary.to_string(), Duration::from_secs(2), 1);
        ContentFetcher::new(config, node).unwrap()
    }

    fn labels(fetcher: &ContentFetcher) -> Vec<String> {
        fetcher.strategies().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_gateway_mode_tries_gateways_then_local_node() {
        let fetcher = fetcher(ConnectionMode::Gateway, true, "ipfs");
        let labels = labels(&fetcher);
        assert_eq!(labels.len(), 4);
        assert!(labels[0].contains("/ipfs/"));
        assert!(labels[1].contains("/fb1/"));
        assert!(labels[2].contains("/fb2/"));
        assert_eq!(labels[3], "local node");
    }

    #[test]
    fn test_api_mode_tries_local_node_first() {
        let fetcher = fetcher(ConnectionMode::Api, true, "ipfs");
        let labels = labels(&fetcher);
        assert_eq!(labels[0], "local node");
        assert!(labels[1].contains("/ipfs/"));
    }

    #[test]
    fn test_fallbacks_can_be_disabled() {
        let fetcher = fetcher(ConnectionMode::Gateway, false, "ipfs");
        let labels = labels(&fetcher);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1], "local node");
    }

    #[cfg(unix)]
    mod with_fake_node {
        use super::*;
        use crate::testutil::fake_binary;

        #[tokio::test]
        async fn test_error_aggregates_every_attempt_in_order() {
            // Port 9 (discard) refuses connections; the node binary does not
            // exist. Every strategy fails and every reason must show up.
            let fetcher = fetcher(
                ConnectionMode::Gateway,
                true,
                "/nonexistent/loglink-test-node",
            );
            let error = fetcher.fetch(&ContentId::from("bafytest")).await.unwrap_err();

            let FetchError::NotFound { attempts, .. } = &error else {
                panic!("expected NotFound, got {:?}", error);
            };
            assert_eq!(attempts.len(), 4);

            let message = error.to_string();
            let primary = message.find("/ipfs/").unwrap();
            let fb1 = message.find("/fb1/").unwrap();
            let fb2 = message.find("/fb2/").unwrap();
            let local = message.find("local node").unwrap();
            assert!(primary < fb1 && fb1 < fb2 && fb2 < local);
        }

        #[tokio::test]
        async fn test_later_strategy_success_short_circuits_the_error_path() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                "loglink-test-node-cat",
                "#!/bin/sh\nprintf 'BUNDLE-BYTES'\n",
            );

            // Every gateway fails; the local node (last strategy) succeeds
            // and the error path is never taken.
            let fetcher = fetcher(
                ConnectionMode::Gateway,
                true,
                &binary.display().to_string(),
            );
            let bytes = fetcher.fetch(&ContentId::from("bafytest")).await.unwrap();
            assert_eq!(bytes, b"BUNDLE-BYTES");
        }
    }
}
