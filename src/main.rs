//! SUSA CLI: run (with the interactive debugger), check, tokens, ast.
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use susa::cli::{Command, SusaCli};
use susa::commands;
use susa::commands::run::RunOptions;
use susa::config::load_config;

/// `SUSA_LOG` takes an EnvFilter directive (e.g. `susa=debug`); default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("SUSA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = SusaCli::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let ok = match args.cmd {
        Command::Run { input, timeout_ms, debug, step, breakpoints, watches } => {
            let config = load_config(&args.config)?;
            let opts = RunOptions { timeout_ms, debug, step, breakpoints, watches };
            commands::run::main_with_opts(input, config, opts).await?
        }
        Command::Check { input } => commands::check::main(input)?,
        Command::Tokens { input, trivia } => commands::tokens::main(input, trivia)?,
        Command::Ast { input } => commands::ast::main(input)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
