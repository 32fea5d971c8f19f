use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use metrics_viewer::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config.as_deref();

    match args.command {
        cli::Commands::Graph {
            source,
            pipeline,
            file_mode,
            log_file,
        } => {
            // The dashboard owns the terminal, so logs only go to an explicit file
            if log_file.is_some() {
                init_tracing(log_file.as_deref())?;
            }
            let mut config = commands::resolve_config(config_path, &source, &pipeline)?;
            if let Some(mode) = file_mode {
                config.file_mode = mode;
            }
            commands::graph::execute(config).await?;
        }
        cli::Commands::Print {
            source,
            pipeline,
            format,
            metrics,
            no_header,
        } => {
            init_tracing(None)?;
            let config = commands::resolve_config(config_path, &source, &pipeline)?;
            commands::print::execute(config, format, metrics, no_header).await?;
        }
    }

    Ok(())
}
