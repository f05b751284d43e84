use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rl_repro::compare::{compare, load_stats};
use rl_repro::config::{Catalog, ConfigLoader, ScreeningPolicy, screen};

#[derive(Parser)]
#[command(name = "rl-repro")]
#[command(version)]
#[command(about = "Reproduce RL training runs from saved hyperparameters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved runs and whether they can be reproduced
    Catalog {
        /// Directory holding `<algo>/<run>/<env>/` run folders
        #[arg(long, env = "RL_REPRO_AGENTS_DIR", default_value = "rl-trained-agents")]
        root: PathBuf,
        /// Algorithms to scan (default: every directory under root)
        #[arg(long = "algo")]
        algorithms: Vec<String>,
        /// Policy architectures the harness can build
        #[arg(long = "policy", default_value = "MlpPolicy")]
        policies: Vec<String>,
        /// Only list reproducible runs
        #[arg(long)]
        reproducible: bool,
    },
    /// Print a configuration document after normalization
    Inspect {
        path: PathBuf,
        /// Environment the hyperparameters were saved for
        #[arg(long)]
        env: Option<String>,
    },
    /// Compare two stored evaluation summaries
    Compare {
        reference: PathBuf,
        candidate: PathBuf,
        /// Allowed mean difference in units of the larger std
        #[arg(long, default_value = "2.0")]
        tolerance: f64,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rl_repro=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    match Cli::parse().command {
        Commands::Catalog {
            root,
            algorithms,
            policies,
            reproducible,
        } => {
            let catalog = if algorithms.is_empty() {
                Catalog::discover_all(&root)?
            } else {
                let algorithms: Vec<&str> = algorithms.iter().map(String::as_str).collect();
                Catalog::discover(&root, &algorithms)?
            };
            let policy = ScreeningPolicy { policies };

            let mut accepted = 0;
            for entry in &catalog.entries {
                let screening = screen(entry, &policy);
                if screening.is_reproducible() {
                    accepted += 1;
                } else if reproducible {
                    continue;
                }
                println!("{screening}");
            }
            tracing::info!("{}/{} runs reproducible", accepted, catalog.len());
        }
        Commands::Inspect { path, env } => {
            let loader = match env {
                Some(env) => ConfigLoader::for_environment(env),
                None => ConfigLoader::new().register_legacy_tags(),
            };
            print!("{}", loader.load(&path)?.to_yaml()?);
        }
        Commands::Compare {
            reference,
            candidate,
            tolerance,
        } => {
            let reference = load_stats(&reference)?;
            let comparison = compare(&reference, &load_stats(&candidate)?, tolerance)?;
            println!("{comparison}");
            if !comparison.is_match() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
