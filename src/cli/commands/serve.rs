//! Serve command - question answering over HTTP.

use super::query::prepare;
use crate::cli::ServeArgs;
use crate::config::Settings;
use crate::server::{AppState, serve_http};

/// Load the target index once, then answer `POST /ask` until Ctrl+C.
pub async fn run(settings: &Settings, args: &ServeArgs) -> anyhow::Result<()> {
    let prepared = prepare(settings, &args.target, &args.retrieval)?;
    if prepared.index.is_empty() {
        eprintln!("Warning: no indexed documents; every question gets the fallback answer.");
    }

    let state = AppState {
        answerer: prepared.answerer(settings)?,
        index: prepared.index,
        use_coarse_stage: prepared.use_coarse_stage,
    };
    let bind = args.bind.as_deref().unwrap_or(&settings.server.bind);
    serve_http(state, bind).await?;
    Ok(())
}
