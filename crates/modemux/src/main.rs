mod cli;
mod config;
mod output;
mod scenario;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, OutputFormat};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let orchestrator_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Config => {
            let rendered = match cli.output {
                OutputFormat::Text => toml::to_string_pretty(&orchestrator_config)
                    .into_diagnostic()?,
                OutputFormat::Json => {
                    serde_json::to_string_pretty(&orchestrator_config).into_diagnostic()?
                }
            };
            println!("{rendered}");
        }
        Command::Simulate { scenario } => {
            let report = scenario::run(scenario, orchestrator_config).await?;

            if cli.output == OutputFormat::Text {
                for event in &report.events {
                    println!("{}", output::format_event(event));
                }
                println!();
            }
            println!("{}", output::render_dump(cli.output, &report.dump)?);
        }
    }
    Ok(())
}
