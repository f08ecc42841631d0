//! Binary entrypoint for the runeforge CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml` and `definitions.json`
//! - `check` - load and validate the definition pack, print catalog counts
//! - `stats [ID | --all]` - print apply/remove/trigger counters
//!
//! See the library crate docs for module-level details: `runeforge::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::Path;
use std::sync::Arc;

use runeforge::config::Config;
use runeforge::logutil::init_logging;
use runeforge::registry::{load_pack_from_json, starter_pack_json, Category, DefinitionStore, Tier};
use runeforge::stats::StatisticsAggregator;
use runeforge::storage::PersistenceGateway;

#[derive(Parser)]
#[command(name = "runeforge")]
#[command(about = "Rules engine for custom item enchantments and triggered abilities")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration and starter definition pack
    Init,
    /// Validate the definition pack and print catalog counts
    Check,
    /// Print usage statistics for one enchantment or the whole catalog
    Stats {
        /// Enchantment id (case-insensitive)
        enchantment: Option<String>,
        /// Report every registered enchantment
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init which writes it)
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(pre_config.as_ref().map(|c| &c.logging), cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing runeforge configuration");
            if Path::new(&cli.config).exists() {
                eprintln!(
                    "Error: {} already exists; refusing to overwrite.",
                    cli.config
                );
                std::process::exit(1);
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let pack_path = Config::default().definitions.file;
            if Path::new(&pack_path).exists() {
                eprintln!(
                    "Error: {} already exists; refusing to overwrite.",
                    pack_path
                );
                std::process::exit(1);
            }
            tokio::fs::write(&pack_path, starter_pack_json()?).await?;
            info!("Starter definition pack written to {}", pack_path);
        }
        Commands::Check => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let pack = load_pack_from_json(&config.definitions.file)?;
            let store = DefinitionStore::new();
            let summary = match store.load(pack) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Definition pack rejected: {}", e);
                    std::process::exit(1);
                }
            };
            println!(
                "Pack ok: {} enchantments, {} abilities ({} entries skipped)",
                summary.enchantments, summary.abilities, summary.skipped
            );
            println!("By tier:");
            for tier in Tier::all() {
                println!("  {:<10} {}", tier.display_name(), store.by_tier(tier).len());
            }
            println!("By category:");
            for category in Category::all() {
                println!(
                    "  {:<10} {}",
                    category.display_name(),
                    store.by_category(category).len()
                );
            }
        }
        Commands::Stats { enchantment, all } => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let ids: Vec<String> = if all {
                // The whole catalog needs the pack; a single id does not.
                let pack = load_pack_from_json(&config.definitions.file)?;
                let store = DefinitionStore::new();
                store.load(pack)?;
                store.enchantment_ids()
            } else {
                match enchantment {
                    Some(id) => vec![id],
                    None => {
                        eprintln!("Error: give an enchantment id or --all.");
                        std::process::exit(2);
                    }
                }
            };

            let gateway = Arc::new(PersistenceGateway::connect(&config.database)?);
            let aggregator = StatisticsAggregator::new(gateway.clone());
            let rows = aggregator.summary(&ids).await?;

            println!(
                "{:<24} {:>12} {:>10} {:>10}",
                "ENCHANTMENT", "APPLICATIONS", "REMOVALS", "TRIGGERS"
            );
            for (id, stats) in rows {
                println!(
                    "{:<24} {:>12} {:>10} {:>10}",
                    id, stats.applications, stats.removals, stats.triggers
                );
            }
            gateway.shutdown();
        }
    }

    Ok(())
}
