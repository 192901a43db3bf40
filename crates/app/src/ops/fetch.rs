use std::io::Write;

use clap::Args;

use common::crypto::EnvelopeError;
use common::prelude::*;

use crate::resolve::NameResolver;
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Fetch {
    /// Content identifier of the bundle to fetch
    pub identifier: Option<String>,

    /// Resolve the naming pointer and print the newest bundle's identifier
    #[arg(long, short = 'r')]
    pub resolve: bool,

    /// Continue from the back-link recorded by the previous fetch
    #[arg(long)]
    pub chain: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchOpError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Fetch(#[from] crate::fetch::FetchError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Resolve(#[from] crate::resolve::ResolveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no identifier given; pass a content id or use --resolve/--chain")]
    MissingIdentifier,

    #[error("no back-link recorded; fetch a bundle first")]
    NoPreviousBundle,
}

#[async_trait::async_trait]
impl crate::op::Op for Fetch {
    type Error = FetchOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        if self.resolve {
            let id = resolve_newest(&state).await?;
            return Ok(id.to_string());
        }

        let id = if self.chain {
            state.read_chain()?.ok_or(FetchOpError::NoPreviousBundle)?
        } else {
            self.identifier
                .clone()
                .map(ContentId::from)
                .ok_or(FetchOpError::MissingIdentifier)?
        };

        fetch_bundle(&state, &id).await
    }
}

/// Resolve the naming pointer and record the result as the chain cursor
pub(crate) async fn resolve_newest(state: &AppState) -> Result<ContentId, FetchOpError> {
    let resolver = NameResolver::new(state.resolve_config(), state.node_client());
    let id = resolver.resolve().await?;
    state.write_chain(Some(&id))?;
    Ok(id)
}

/// Fetch, decrypt and render one bundle; persists the back-link for
/// `fetch --chain`
pub(crate) async fn fetch_bundle(state: &AppState, id: &ContentId) -> Result<String, FetchOpError> {
    let fetcher = crate::fetch::ContentFetcher::new(state.fetch_config(), state.node_client())?;
    let raw = fetcher.fetch(id).await?;

    let decryptor = HybridDecryptor::new(&state.crypto_config()?)?;
    let payload = match decryptor.decrypt_and_parse(&raw) {
        Ok(payload) => payload,
        // The response did not contain (or decrypt to) JSON at all; show
        // the raw bytes so the operator can see what the upstream returned.
        Err(e) if is_diagnosable(&e) => {
            return Ok(format!(
                "{}\n[raw response]\n{}",
                e,
                String::from_utf8_lossy(&raw)
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let (field, order) = state.sort_params();
    let bundle = parse_bundle(&payload, field, order)?;
    append_output_file(state, &bundle)?;

    let mut out = String::new();
    for parsed in &bundle.entries {
        let marker = if parsed.is_synthesized() {
            " (recovered)"
        } else {
            ""
        };
        out.push_str(&format!("{}{}\n", parsed.entry(), marker));
    }

    state.write_chain(bundle.prev.as_ref())?;
    match &bundle.prev {
        Some(prev) => out.push_str(&format!(
            "prev: {}\nrun 'loglink fetch --chain' for older bundles",
            prev
        )),
        None => out.push_str("beginning of history reached"),
    }

    Ok(out)
}

fn is_diagnosable(error: &DecryptError) -> bool {
    matches!(
        error,
        DecryptError::InvalidPlaintext(_) | DecryptError::Envelope(EnvelopeError::NotJson(_))
    )
}

/// Append the fetched entries to the JSON-lines output file
fn append_output_file(state: &AppState, bundle: &LogBundle) -> Result<(), FetchOpError> {
    let dir = state.log_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(&state.settings.logging.output_file);

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    for parsed in &bundle.entries {
        let line = serde_json::to_string(parsed.entry())?;
        writeln!(file, "{}", line)?;
    }
    Ok(())
}
