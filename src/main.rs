use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

mod config;
mod errors;
mod extract;
mod hashtree;
mod matcher;
mod pkg;
mod profile;

use config::Config;
use extract::ClassListExtractor;
use matcher::LibMatcher;
use pkg::PackageTree;
use profile::{AppStats, ProfileCache};

/// libsleuth - detect bundled third-party libraries in Android apps
#[derive(Parser, Debug)]
#[command(name = "libsleuth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// App class list to analyze (JSON with precomputed class digests)
    app: PathBuf,

    /// Directory of library profiles (*.json)
    #[arg(short, long)]
    profiles: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Package names never accepted as a library root
    /// (can be specified multiple times)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Root packages skipped by the heuristic scan
    /// (can be specified multiple times)
    #[arg(short, long)]
    ambiguous: Vec<String>,

    /// Framework package list - one class or package name per line;
    /// classes under these namespaces never count as app code
    #[arg(long, value_name = "FILE")]
    framework: Option<PathBuf>,

    /// Minimum score for accepting a partial match
    #[arg(long)]
    min_partial_score: Option<f64>,

    /// Minimum per-package similarity for candidate pairs
    #[arg(long)]
    min_class_score: Option<f64>,

    /// Disable partial matching (full matches only)
    #[arg(long)]
    no_partial: bool,

    /// Record which app packages each matched library occupies
    #[arg(long)]
    lib_usage: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("libsleuth v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let framework = match &cli.framework {
        Some(path) => Some(load_framework(path)?),
        None => None,
    };

    let cache = ProfileCache::load_dir(&cli.profiles).into_diagnostic()?;
    if cache.is_empty() {
        println!("{}", "No library profiles found.".yellow());
        return Ok(());
    }
    info!(
        "Loaded {} profiles ({} unreadable)",
        cache.len(),
        cache.error_count()
    );

    let options = config.to_matcher_options(framework);
    let mut matcher =
        LibMatcher::new(cache, Box::new(ClassListExtractor::new())).with_options(options);

    let stats = matcher.identify_libs(&cli.app).into_diagnostic()?;
    print_results(&stats, matcher.cache().error_count());

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path).into_diagnostic()?
    } else {
        let dir = cli.app.parent().unwrap_or(std::path::Path::new("."));
        Config::from_default_locations(dir).into_diagnostic()?
    };

    // Override with CLI arguments
    if !cli.exclude.is_empty() {
        config.excluded.extend(cli.exclude.clone());
    }
    if !cli.ambiguous.is_empty() {
        config.ambiguous.extend(cli.ambiguous.clone());
    }
    if let Some(score) = cli.min_partial_score {
        config.min_partial_score = score;
    }
    if let Some(score) = cli.min_class_score {
        config.min_class_score = score;
    }
    if cli.no_partial {
        config.no_partial_matching = true;
    }
    if cli.lib_usage {
        config.collect_lib_usage = true;
    }

    Ok(config)
}

fn load_framework(path: &std::path::Path) -> Result<PackageTree> {
    let text = std::fs::read_to_string(path).into_diagnostic()?;
    let mut tree = PackageTree::new();
    for line in text.lines() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let simple = name.rsplit('.').next().unwrap_or(name);
        if simple.chars().next().is_some_and(char::is_uppercase) {
            tree.add_class(name);
        } else {
            // bare package: insert a marker class so the namespace test
            // claims everything beneath it
            tree.add_class(&format!("{name}._"));
        }
    }
    Ok(tree)
}

fn print_results(stats: &AppStats, unreadable: usize) {
    println!();
    println!("{}", "=== Report ===".bold());

    let full: Vec<_> = stats.full_matches().collect();
    println!("{}", "Full matches:".green().bold());
    if full.is_empty() {
        println!("  (none)");
    }
    for pm in &full {
        let deprecated = if pm.lib.is_deprecated {
            " [deprecated]".yellow().to_string()
        } else {
            String::new()
        };
        let obfuscated = if pm.is_lib_obfuscated() {
            " [re-obfuscated]".cyan().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {}{}{}",
            "✓".green(),
            pm.lib.name(),
            pm.lib.version(),
            deprecated,
            obfuscated
        );
    }

    println!("{}", "Partial matches:".yellow().bold());
    let mut any_partial = false;
    for pm in &stats.matches {
        if pm.is_full_match() {
            continue;
        }
        for result in &pm.results {
            if result.score > 0.0 {
                any_partial = true;
                let root = result.root_package.as_deref().unwrap_or("-");
                println!(
                    "  {} {} {} score {:.2} via partition {} ({})",
                    "~".yellow(),
                    pm.lib.name(),
                    pm.lib.version(),
                    result.score,
                    root,
                    result.config
                );
            }
        }
    }
    if !any_partial {
        println!("  (none)");
    }

    // skipped is "not attempted", never to be confused with "no match"
    let skipped: Vec<_> = stats
        .matches
        .iter()
        .filter(|pm| pm.results.iter().any(|r| r.is_skipped()))
        .collect();
    if !skipped.is_empty() {
        println!("{}", "Skipped (undeterminable root package):".dimmed());
        for pm in &skipped {
            println!("  - {} {}", pm.lib.name(), pm.lib.version());
        }
    }

    if !stats.package_only_matches.is_empty() {
        println!("{}", "Root-package hits (heuristic only):".dimmed());
        for (lib, root) in &stats.package_only_matches {
            println!("  - {lib} at {root}");
        }
    }

    if !stats.lib_usage.is_empty() {
        println!("{}", "Library usage:".dimmed());
        for (lib, packages) in &stats.lib_usage {
            println!("  - {}: {}", lib, packages.join(", "));
        }
    }

    println!();
    println!(
        "{} profiles matched in {:.2?}{}",
        stats.matches.len(),
        stats.processing_time,
        if unreadable > 0 {
            format!(" ({unreadable} unreadable profiles skipped)")
        } else {
            String::new()
        }
    );
}
