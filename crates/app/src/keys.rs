//! Naming identity registry
//!
//! Thin wrapper over the node's key management. The node would silently
//! accept a duplicate `key gen`, so `create` checks the existing list first
//! and fails with a distinct error instead. Key material is generated by the
//! node itself, never here.

use crate::node::{NodeClient, NodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Public value (peer id) of the identity
    pub value: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyRegistryError {
    #[error("key '{0}' already exists")]
    Duplicate(String),
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Lists and creates the identities that own naming pointers
pub struct KeyRegistry {
    node: NodeClient,
    key_gen_bits: u32,
}

impl KeyRegistry {
    pub fn new(node: NodeClient, key_gen_bits: u32) -> Self {
        Self { node, key_gen_bits }
    }

    /// List known identities as `(value, name)` pairs
    pub async fn list(&self) -> Result<Vec<KeyInfo>, KeyRegistryError> {
        let output = self.node.run_with_retry(&["key", "list", "-l"]).await?;
        Ok(parse_key_list(&String::from_utf8_lossy(&output)))
    }

    /// Create a named identity, returning its public value
    ///
    /// # Errors
    ///
    /// Returns [`KeyRegistryError::Duplicate`] when an identity with the
    /// exact name already exists; key generation is not invoked in that case.
    pub async fn create(&self, name: &str) -> Result<String, KeyRegistryError> {
        let existing = self.list().await?;
        if existing.iter().any(|key| key.name == name) {
            return Err(KeyRegistryError::Duplicate(name.to_string()));
        }

        let size = format!("--size={}", self.key_gen_bits);
        let output = self
            .node
            .run_with_retry(&["key", "gen", "--type=rsa", size.as_str(), name])
            .await?;
        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }
}

/// Each line is `<value...> <name>`: the last token is the name, everything
/// before it the value.
fn parse_key_list(output: &str) -> Vec<KeyInfo> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let (name, value) = tokens.split_last()?;
            Some(if value.is_empty() {
                KeyInfo {
                    value: (*name).to_string(),
                    name: String::new(),
                }
            } else {
                KeyInfo {
                    value: value.join(" "),
                    name: (*name).to_string(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_key_list_lines() {
        let output = "k51qzi5uqu5dkml4vrxk self\nk51qzi5uqu5dghjkl audit\n\nlonely\n";
        let keys = parse_key_list(output);

        assert_eq!(keys.len(), 3);
        assert_eq!(
            keys[0],
            KeyInfo {
                value: "k51qzi5uqu5dkml4vrxk".to_string(),
                name: "self".to_string()
            }
        );
        assert_eq!(keys[1].name, "audit");
        // A line without a separator is kept as a nameless value.
        assert_eq!(keys[2].value, "lonely");
        assert_eq!(keys[2].name, "");
    }

    #[cfg(unix)]
    mod with_fake_node {
        use std::time::Duration;

        use super::*;
        use crate::testutil::fake_binary;

        fn script(marker: &std::path::Path) -> String {
            format!(
                concat!(
                    "#!/bin/sh\n",
                    "if [ \"$1\" = \"key\" ] && [ \"$2\" = \"list\" ]; then\n",
                    "  echo 'k51abc self'\n",
                    "  echo 'k51def audit'\n",
                    "  exit 0\n",
                    "fi\n",
                    "if [ \"$1\" = \"key\" ] && [ \"$2\" = \"gen\" ]; then\n",
                    "  touch {marker}\n",
                    "  echo 'k51new'\n",
                    "  exit 0\n",
                    "fi\n",
                    "exit 1\n",
                ),
                marker = marker.display()
            )
        }

        fn registry(binary: &std::path::Path) -> KeyRegistry {
            KeyRegistry::new(
                NodeClient::new(binary.display().to_string(), Duration::from_secs(5), 1),
                2048,
            )
        }

        #[tokio::test]
        async fn test_duplicate_create_fails_without_generating() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("generated");
            let binary = fake_binary(dir.path(), "loglink-test-keys-dup", &script(&marker));

            let error = registry(&binary).create("audit").await.unwrap_err();
            assert!(matches!(error, KeyRegistryError::Duplicate(name) if name == "audit"));
            assert!(!marker.exists(), "key generation must not be invoked");
        }

        #[tokio::test]
        async fn test_create_fresh_name_generates_and_returns_value() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("generated");
            let binary = fake_binary(dir.path(), "loglink-test-keys-gen", &script(&marker));

            let value = registry(&binary).create("fresh").await.unwrap();
            assert_eq!(value, "k51new");
            assert!(marker.exists());
        }

        #[tokio::test]
        async fn test_list_parses_node_output() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("generated");
            let binary = fake_binary(dir.path(), "loglink-test-keys-list", &script(&marker));

            let keys = registry(&binary).list().await.unwrap();
            assert_eq!(keys.len(), 2);
            assert_eq!(keys[1].name, "audit");
        }
    }
}
