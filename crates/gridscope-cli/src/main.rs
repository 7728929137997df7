//! Thin command-line front end over the analytics pipeline: build analytics
//! from a recorded episode, print KPI summaries, pre-warm a cache directory.
//! No analytics logic lives here.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gridscope_analytics::EpisodeAnalytics;
use gridscope_cache::{prewarm, AnalyticsStore, CacheKey, PrewarmJob};
use gridscope_core::Episode;

#[derive(Parser)]
#[command(
    name = "gridscope",
    about = "Episode analytics for grid-agent evaluation runs",
    version
)]
struct Cli {
    /// Log more (-v: debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build analytics from a recorded episode JSON file and persist them.
    Build {
        /// Recorded episode (JSON, as written by the runner export)
        episode: PathBuf,
        /// Output directory for the Parquet/JSON analytics
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print KPI summaries for previously built analytics.
    Kpi {
        /// Directory written by `gridscope build`
        analytics: PathBuf,
    },
    /// Build analytics for many episodes into a cache directory.
    Prewarm {
        /// Recorded episode JSON files
        episodes: Vec<PathBuf>,
        /// Cache root directory
        #[arg(short, long)]
        cache_root: PathBuf,
        /// Worker threads (0 = auto-detect)
        #[arg(short, long, default_value_t = 0)]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    match cli.command {
        Commands::Build { episode, out } => build(&episode, &out),
        Commands::Kpi { analytics } => kpi(&analytics),
        Commands::Prewarm {
            episodes,
            cache_root,
            threads,
        } => run_prewarm(&episodes, &cache_root, threads),
    }
}

fn load_episode(path: &Path) -> Result<Episode> {
    let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing '{}'", path.display()))
}

fn build(episode_path: &Path, out: &Path) -> Result<()> {
    let episode = load_episode(episode_path)?;
    info!(
        agent = %episode.meta.agent_name,
        episode = %episode.meta.episode_name,
        steps = episode.n_steps(),
        "building analytics"
    );
    let analytics = EpisodeAnalytics::build(&episode)?;
    analytics
        .save(out)
        .with_context(|| format!("persisting analytics to '{}'", out.display()))?;
    println!("analytics written to {}", out.display());
    Ok(())
}

fn kpi(dir: &Path) -> Result<()> {
    let analytics = EpisodeAnalytics::load_from(dir)?;
    let meta = analytics.meta();
    println!(
        "{} / {}: {} steps played, total reward {:.3}",
        meta.agent_name, meta.episode_name, meta.nb_timestep_played, meta.total_reward
    );
    println!(
        "maintenance downtime: {:.1} minutes",
        analytics.maintenance_minutes()
    );
    println!(
        "distinct topology signatures: {}",
        analytics.topology_registry().len()
    );
    println!("\nusage-rate bands:\n{}", analytics.usage_bands());
    println!("\nproduction share:\n{}", analytics.production_share());
    println!("\noverflow trace:\n{}", analytics.overflow_trace());
    Ok(())
}

fn run_prewarm(episodes: &[PathBuf], cache_root: &Path, threads: usize) -> Result<()> {
    let mut jobs = Vec::with_capacity(episodes.len());
    for path in episodes {
        let episode = load_episode(path)?;
        let key = CacheKey::new(
            episode.meta.agent_name.clone(),
            episode.meta.episode_name.clone(),
        );
        jobs.push(PrewarmJob { key, episode });
    }

    let store = AnalyticsStore::new(cache_root);
    let summary = prewarm(&store, jobs, threads)?;
    println!(
        "pre-warm done: {} built, {} failed",
        summary.success, summary.failure
    );
    for (key, error) in &summary.failures {
        eprintln!("  {key}: {error}");
    }
    if summary.failure > 0 {
        anyhow::bail!("{} episode(s) failed to build", summary.failure);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
