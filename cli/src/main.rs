use std::path::PathBuf;
use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lkr_dispatch::DispatchOptions;

mod sim;

use sim::{RedefineReport, SimulateReport};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "lkr::dispatch=debug,lkr::class=info,lkr_dispatch=info";

#[derive(Debug, Parser)]
#[command(
    name = "lkr-dispatch",
    author,
    version,
    about = "Drive LKR call-site caches through synthetic workloads",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Cycle calls through several receiver classes and report the call site
    Simulate {
        /// Number of distinct receiver classes
        #[arg(long, default_value_t = 1)]
        classes: usize,
        /// Total number of calls
        #[arg(long, default_value_t = 1000)]
        calls: usize,
        /// Threads sharing the call site
        #[arg(long, default_value_t = 1)]
        threads: usize,
        #[command(flatten)]
        config: ConfigArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Warm a monomorphic site, redefine its method and call it again
    Redefine {
        /// Warm-up calls before the redefinition
        #[arg(long, default_value_t = 100)]
        calls: usize,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, clap::Args)]
struct ConfigArgs {
    /// Polymorphic cache size; overrides the config file and environment
    #[arg(long)]
    cache_limit: Option<usize>,
    /// TOML file with dispatch options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(&self) -> anyhow::Result<DispatchOptions> {
        let mut options = match &self.config {
            Some(path) => DispatchOptions::load(path)?,
            None => DispatchOptions::default(),
        };
        options.apply_env(|key| std::env::var(key).ok())?;
        if let Some(limit) = self.cache_limit {
            options.cache_limit = limit;
        }
        options.validate().context("invalid --cache-limit")?;
        Ok(options)
    }
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("LKR_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn print_simulate(report: &SimulateReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let stats = &report.stats;
    println!(
        "classes={} calls={} threads={} cache_limit={}",
        report.classes, report.calls, report.threads, report.cache_limit
    );
    println!("state: {:?}", stats.state);
    println!("depth: {}", stats.depth);
    println!(
        "hits: {} ({:.1}%)  extensions: {}  races: {}  stale: {}  uncached: {}",
        stats.hits,
        stats.hit_ratio() * 100.0,
        stats.extensions,
        stats.races,
        stats.stale_skips,
        stats.uncached_calls
    );
    let chain: Vec<String> = report.chain.iter().map(|kind| format!("{kind:?}")).collect();
    println!("chain: [{}]", chain.join(", "));
    Ok(())
}

fn print_redefine(report: &RedefineReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("before: {}", report.before);
        println!("after: {}", report.after);
        println!("state: {:?}", report.stats.state);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    match CliArgs::parse().command {
        Commands::Simulate {
            classes,
            calls,
            threads,
            config,
            json,
        } => {
            let options = config.resolve().context("invalid dispatch options")?;
            let report = sim::simulate(options, classes, calls, threads)?;
            print_simulate(&report, json)
        }
        Commands::Redefine { calls, config, json } => {
            let options = config.resolve().context("invalid dispatch options")?;
            let report = sim::redefine(options, calls)?;
            print_redefine(&report, json)
        }
    }
}
