//! huginn: cache inspection and one-shot model calls
//!
//! Operates on the cache directory named by the loaded configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use huginn::{
    CacheManager, CachingClient, CallerStats, Config, LlmClient, OllamaClient, ResponseText,
    TimingClient,
};

/// Huginn cache CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version)]
#[command(about = "Prompt cache and call profiler for LLM pipelines")]
struct Args {
    /// Path to a config file (default: ~/.huginn/config.toml if present)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show cache contents and the call profile summary
    Stats,

    /// Print the cached final result for a subject
    Show {
        /// Subject (e.g. a ticker symbol)
        subject: String,
    },

    /// Drop expired entries now
    Prune,

    /// Remove every cached result and response (the call log is kept)
    Clear,

    /// Send one prompt through the caching stack
    Ask {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// Caller tag recorded in the call profile
        #[arg(long)]
        caller: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let cache = Arc::new(CacheManager::open(config.cache_config()));

    match args.command {
        Command::Stats => {
            let stats = cache.stats();
            println!("cache dir:      {}", cache.config().dir.display());
            println!("size:           {} bytes", stats.size_bytes);
            println!(
                "final entries:  {} ({} live)",
                stats.final_entries, stats.live_final_entries
            );
            println!(
                "prompt entries: {} ({} live)",
                stats.prompt_entries, stats.live_prompt_entries
            );
            println!("logged calls:   {}", stats.logged_calls);

            let summary = cache.profile_summary();
            if summary.overall.calls > 0 {
                println!();
                print_stats_header();
                print_stats_row("(all)", &summary.overall);
                for (caller, stats) in &summary.by_caller {
                    print_stats_row(caller, stats);
                }
            }
        }

        Command::Show { subject } => {
            let subject = huginn::validate_subject(&subject)?;
            match cache.get_final(subject) {
                Some(result) => println!("{result}"),
                None => {
                    eprintln!("no live result cached for {subject}");
                    std::process::exit(1);
                }
            }
        }

        Command::Prune => {
            let report = cache.prune()?;
            println!(
                "removed {} final and {} prompt entries",
                report.final_removed, report.prompts_removed
            );
        }

        Command::Clear => {
            cache.clear()?;
            println!("cache cleared");
        }

        Command::Ask { prompt, caller } => {
            let prompt = read_input(prompt)?;
            let model = OllamaClient::from_settings(&config.model);
            let timed =
                TimingClient::new(model, config.retry_config()).with_sink(cache.clone());
            let client = CachingClient::new(timed, cache.clone());

            let response = client.call(&prompt, caller.as_deref()).await?;
            println!("{}", response.to_text());
            if response.cached {
                eprintln!("(served from cache)");
            }
        }
    }

    Ok(())
}

fn print_stats_header() {
    println!(
        "{:<24} {:>6} {:>10} {:>10} {:>10}",
        "caller", "calls", "total s", "mean s", "max s"
    );
}

fn print_stats_row(label: &str, stats: &CallerStats) {
    println!(
        "{:<24} {:>6} {:>10.3} {:>10.3} {:>10.3}",
        label,
        stats.calls,
        stats.total_seconds,
        stats.mean_seconds(),
        stats.max_seconds
    );
}

/// Use the argument if given, otherwise read all of stdin.
fn read_input(arg: Option<String>) -> io::Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no prompt given (pass it as an argument or pipe it on stdin)",
        ));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim_end().to_string())
}
