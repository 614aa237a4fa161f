use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "susa",
    about = "SUSA: run, debug, check and inspect .susa programs",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct SusaCli {
    /// Global: path to config (TOML); default: ~/.susa/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Global: disable colored output
    #[arg(long = "no-color", action = ArgAction::SetTrue, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a program, streaming its output
    ///
    /// Examples:
    ///   susa run demo.susa
    ///   susa run demo.susa --debug -b 4 -b 9:i>2 --watch total
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Wall-clock budget in milliseconds (0 = unlimited)
        #[arg(long = "timeout-ms", value_name = "N")]
        timeout_ms: Option<u64>,

        /// Debug mode: breakpoints and stepping; stdin takes debugger commands while paused
        #[arg(long = "debug", action = ArgAction::SetTrue)]
        debug: bool,

        /// Pause before the first statement (implies --debug)
        #[arg(long = "step", action = ArgAction::SetTrue)]
        step: bool,

        /// Breakpoint as LINE or LINE:CONDITION (repeatable)
        #[arg(short = 'b', long = "break", value_name = "LINE[:COND]")]
        breakpoints: Vec<String>,

        /// Watch expression shown on every pause (repeatable)
        #[arg(long = "watch", value_name = "EXPR")]
        watches: Vec<String>,
    },

    /// Validate a program and print diagnostics (exit 1 on errors)
    Check {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Dump the token stream
    Tokens {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Include whitespace and comment tokens
        #[arg(long = "trivia", action = ArgAction::SetTrue)]
        trivia: bool,
    },

    /// Dump the AST as JSON
    Ast {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

/// `12` or `12:x > 3`.
pub fn parse_breakpoint_spec(spec: &str) -> Result<(usize, Option<String>), String> {
    let (line, condition) = match spec.split_once(':') {
        Some((line, cond)) => (line, Some(cond.trim().to_string()).filter(|c| !c.is_empty())),
        None => (spec, None),
    };
    let line = line.trim().parse::<usize>().map_err(|_| format!("invalid breakpoint line in '{}'", spec))?;
    if line == 0 {
        return Err(format!("breakpoint lines start at 1, got '{}'", spec));
    }
    Ok((line, condition))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_specs() {
        assert_eq!(parse_breakpoint_spec("4"), Ok((4, None)));
        assert_eq!(parse_breakpoint_spec("9:i > 2"), Ok((9, Some("i > 2".to_string()))));
        assert!(parse_breakpoint_spec("x").is_err());
        assert!(parse_breakpoint_spec("0").is_err());
    }

    #[test]
    fn run_accepts_repeated_breakpoints() {
        let cli = SusaCli::parse_from(["susa", "run", "a.susa", "-b", "2", "-b", "5:x", "--watch", "x"]);
        match cli.cmd {
            Command::Run { breakpoints, watches, .. } => {
                assert_eq!(breakpoints, vec!["2", "5:x"]);
                assert_eq!(watches, vec!["x"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
