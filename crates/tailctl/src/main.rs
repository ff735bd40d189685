mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tailctl_api::{InMemoryMetrics, MetricsSink};
use tailctl_core::{Dispatcher, Operations};

use crate::cli::{Cli, Command, GlobalOpts, InvokeArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output only.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need API access
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "tailctl", &mut std::io::stdout());
            Ok(())
        }

        Command::Tools(args) => {
            let cfg = config::load(&cli.global)?;
            let format = config::output_format(&cli.global, &cfg)?;
            commands::tools::handle(&args, &cli.global, format)
        }

        Command::Invoke(args) => invoke(&args, &cli.global).await,
    }
}

async fn invoke(args: &InvokeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let format = config::output_format(global, &cfg)?;
    let client_config = config::resolve_client_config(global, &cfg)?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let api = client_config.build_client_with_metrics(sink)?;
    let dispatcher = Dispatcher::new(Operations::new(api, client_config.liveness));

    tracing::debug!(tool = %args.tool, operation = %args.operation, "dispatching invocation");
    let result = commands::invoke::handle(args, &dispatcher, global, format).await;

    if global.metrics {
        eprintln!("{}", output::render(cli::OutputFormat::JsonCompact, &metrics.snapshot())?);
    }
    result
}
