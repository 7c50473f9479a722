//! `hiermap` command line: find the multi-level module map of a network file.
//!
//! ```text
//! hiermap <seed> <network> <trials> [recursive]
//! ```
//!
//! Files ending in `.net` are read as Pajek, anything else as a link list. The
//! best tree found so far is written to `<network stem>.tree` (or `--output`)
//! every time a trial improves on it.

use clap::{Parser, ValueEnum};
use hiermap::hierarchy::{save_tree, HealthCheck};
use hiermap::{load_link_list, load_pajek, FlowNetwork, HierarchyResult, Infomap, RecursionMode};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "hiermap",
    version,
    about = "Hierarchical map equation community detection"
)]
struct Cli {
    /// Random seed
    seed: u64,
    /// Network file (.net for Pajek, otherwise a link list)
    network: PathBuf,
    /// Number of independent attempts
    trials: usize,
    /// Probability of repeating a level search (eager mode only)
    recursive: Option<f64>,
    /// How the search recurses into modules
    #[arg(long, value_enum, default_value_t = Mode::Fast)]
    mode: Mode,
    /// Only find the best two-level partition
    #[arg(long)]
    two_level: bool,
    /// Output .tree file (default: <network>.tree)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Explore only the best level in depth
    Fast,
    /// Explore every candidate level in depth
    Eager,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hiermap=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> hiermap::Result<()> {
    let network = if cli.network.extension().is_some_and(|ext| ext == "net") {
        load_pajek(&cli.network)?
    } else {
        load_link_list(&cli.network)?
    };
    info!(
        nodes = network.node_count(),
        links = network.link_count(),
        aggregated = network.aggregated_link_count(),
        path = %cli.network.display(),
        "loaded network"
    );

    let flow = FlowNetwork::from_network(&network)?;
    if flow.dropped_self_links() > 0 {
        warn!(count = flow.dropped_self_links(), "ignoring self-links");
    }

    let mode = match cli.mode {
        Mode::Fast => {
            if cli.recursive.is_some() {
                warn!("recursive probability only applies to --mode eager");
            }
            RecursionMode::Fast
        }
        Mode::Eager => RecursionMode::Eager {
            recursive: cli.recursive.unwrap_or(0.0),
        },
    };
    let detector = Infomap::new()
        .with_seed(cli.seed)
        .with_trials(cli.trials)
        .with_mode(mode);

    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.network));
    let names = flow.names();
    let sizes = flow.sizes();

    let result = if cli.two_level {
        let result = detector.run_two_level(&flow)?;
        save_tree(&output, &result.tree, result.code_length, names, &sizes)?;
        result
    } else {
        detector.run_with_sink(&flow, |tree, code_length, _| {
            save_tree(&output, tree, code_length, names, &sizes)
        })?
    };
    info!(path = %output.display(), "wrote tree");
    let health = result.tree.health_check();
    if !health.is_healthy() {
        warn!("module tree failed its structural checks: {health}");
    }
    report(&result);
    Ok(())
}

fn default_output(network: &Path) -> PathBuf {
    network.with_extension("tree")
}

fn report(result: &HierarchyResult) {
    let stats = &result.stats;
    println!(
        "Code length {:.6} bits ({:.2}% compression of {:.6} bits)",
        result.code_length,
        result.compression(),
        result.uncompressed_code_length
    );
    println!(
        "{} bottom modules, {} with more than {} nodes",
        stats.module_count, stats.large_module_count, stats.large_module_limit
    );
    println!(
        "Average depth {:.3}, average module size {:.3}",
        stats.ave_depth, stats.ave_size
    );
    println!(
        "Gain over two-level ({:.6} bits): {:.3}%",
        stats.two_level_code_length,
        result.two_level_gain()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_positionals_and_flags() {
        let cli = Cli::try_parse_from(["hiermap", "7", "net.txt", "5", "0.3", "--mode", "eager"]).unwrap();
        assert_eq!(cli.seed, 7);
        assert_eq!(cli.trials, 5);
        assert_eq!(cli.recursive, Some(0.3));
        assert!(matches!(cli.mode, Mode::Eager));
        assert!(!cli.two_level);
    }

    #[test]
    fn test_default_output_replaces_extension() {
        assert_eq!(default_output(Path::new("data/flow.net")), PathBuf::from("data/flow.tree"));
        assert_eq!(default_output(Path::new("links")), PathBuf::from("links.tree"));
    }

    #[test]
    fn test_run_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pairs.txt");
        std::fs::write(&input, "1 2\n2 1\n3 4\n4 3\n2 3 0.1\n").unwrap();

        let cli = Cli::try_parse_from(["hiermap", "1", input.to_str().unwrap(), "3"]).unwrap();
        run(&cli).unwrap();

        let tree = std::fs::read_to_string(dir.path().join("pairs.tree")).unwrap();
        assert!(tree.starts_with("# Codelength = "));
        assert_eq!(tree.lines().count(), 5);
    }

    #[test]
    fn test_run_reports_missing_file() {
        let cli = Cli::try_parse_from(["hiermap", "1", "/nonexistent/net.txt", "1"]).unwrap();
        assert!(matches!(run(&cli), Err(hiermap::Error::Io(_))));
    }
}
