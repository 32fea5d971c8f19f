//! Command implementations for the CLI
//!
//! - graph: interactive terminal dashboard
//! - print: stream entries to stdout as open metrics or csv

pub mod graph;
pub mod print;

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use metrics_viewer::config::{self, ViewerConfig};

use crate::cli::{PipelineArgs, SourceArgs};

/// Layer CLI flags over the file/env configuration and validate the result
pub fn resolve_config(
    config_path: Option<&Path>,
    source: &SourceArgs,
    pipeline: &PipelineArgs,
) -> Result<ViewerConfig> {
    let mut cfg = config::load_config(config_path)?;
    source.apply(&mut cfg);
    pipeline.apply(&mut cfg);
    cfg.validate()?;

    if let Some(file) = &cfg.file {
        std::fs::File::open(file)
            .with_context(|| format!("could not open file {}", file.display()))?;
    }

    tracing::debug!(config = ?redacted(&cfg), "Resolved configuration");
    Ok(cfg)
}

/// Copy of `cfg` safe to log
fn redacted(cfg: &ViewerConfig) -> ViewerConfig {
    let mut cfg = cfg.clone();
    if cfg.password.is_some() {
        cfg.password = Some("***".to_string());
    }
    if cfg.token.is_some() {
        cfg.token = Some("***".to_string());
    }
    cfg
}

/// Token cancelled on Ctrl-C
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = trigger.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                tracing::info!("Ctrl-C received, shutting down");
                trigger.cancel();
            }
        }
    });
    token
}
