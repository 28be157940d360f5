//! Snip CLI
//!
//! CLI tool for inspecting snippet filters and scripts, running scripts
//! through the built-in snippets, and replaying race scenarios.

mod simulate;

use std::fs;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use snip_core::{
    parse_script, parse_scriptlet_call, DispatchConfig, RaceCoordinator, SnippetCall, SnippetFilterSet,
    SnippetRegistry,
};

#[derive(Parser)]
#[command(name = "snip-cli")]
#[command(about = "Snippet filter and race tools")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a snippet script (or a filter list) and print it as JSON
    Parse {
        /// Input file
        #[arg(short, long)]
        input: String,

        /// Treat the input as a filter list instead of a single script
        #[arg(long)]
        filters: bool,

        /// Treat each line as a comma-separated scriptlet call (`+js(name, arg)`)
        #[arg(long, conflicts_with = "filters")]
        scriptlet: bool,
    },

    /// Run a script, or the scripts a filter list selects for a host
    Run {
        /// Script file, or filter list when --host is given
        #[arg(short, long)]
        input: String,

        /// Select scripts from the filter list for this host
        #[arg(long)]
        host: Option<String>,

        /// JSON dispatch config file ({"debug": bool, "stopOnError": bool})
        #[arg(short, long)]
        config: Option<String>,

        /// Log every call before it runs
        #[arg(long)]
        debug: bool,
    },

    /// Replay a race scenario file and print the event trace
    Simulate {
        /// Scenario JSON file
        #[arg(short, long)]
        input: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Parse {
            input,
            filters,
            scriptlet,
        } => cmd_parse(&input, filters, scriptlet),
        Commands::Run {
            input,
            host,
            config,
            debug,
        } => cmd_run(&input, host.as_deref(), config.as_deref(), debug),
        Commands::Simulate { input } => cmd_simulate(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn cmd_parse(input: &str, filters: bool, scriptlet: bool) -> Result<(), String> {
    let content = read_input(input)?;

    if filters {
        let set = SnippetFilterSet::from_text(&content);
        print_json(&set.filters())
    } else if scriptlet {
        print_json(&parse_scriptlet_lines(&content))
    } else {
        print_json(&parse_script(&content))
    }
}

/// One call per line; lines that do not name a snippet are skipped.
fn parse_scriptlet_lines(content: &str) -> Vec<SnippetCall> {
    content.lines().filter_map(parse_scriptlet_call).collect()
}

fn cmd_run(input: &str, host: Option<&str>, config: Option<&str>, debug: bool) -> Result<(), String> {
    let content = read_input(input)?;

    let mut dispatch_config = match config {
        Some(path) => {
            let text = read_input(path)?;
            serde_json::from_str::<DispatchConfig>(&text)
                .map_err(|e| format!("Invalid config '{}': {}", path, e))?
        }
        None => DispatchConfig::default(),
    };
    dispatch_config.debug |= debug;

    let set;
    let scripts: Vec<&str> = match host {
        Some(host) => {
            set = SnippetFilterSet::from_text(&content);
            set.scripts_for_host(host)
        }
        None => vec![content.as_str()],
    };
    if scripts.is_empty() {
        println!("No snippet filters apply to '{}'", host.unwrap_or_default());
        return Ok(());
    }

    let registry = SnippetRegistry::with_builtins();
    let races = RaceCoordinator::new();
    let mut reports = Vec::with_capacity(scripts.len());
    for script in &scripts {
        reports.push(registry.run_script(script, &races, &dispatch_config));
    }

    print_json(&reports)?;

    let failures: usize = reports.iter().map(|report| report.failures.len()).sum();
    if failures > 0 {
        eprintln!("{} snippet call(s) failed", failures);
    }
    Ok(())
}

fn cmd_simulate(input: &str) -> Result<(), String> {
    let content = read_input(input)?;
    let scenario: simulate::Scenario = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid scenario '{}': {}", input, e))?;

    print_json(&simulate::run_scenario(&scenario))
}
