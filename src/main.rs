use anyhow::Context;
use clap::{Parser, Subcommand};
use dumpsync::config::SAMPLE_CONFIG;
use dumpsync::listing::{describe_dump, list_dumps_after, PAGE_SIZE};
use dumpsync::{RawConfig, StateStore, SyncConfig, SyncError, Syncer};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dumpsync")]
#[command(about = "Mirror data-warehouse export dumps to local disk", long_about = None)]
#[command(version)]
struct Args {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info", global = true)]
    level: String,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download everything published since the last sync
    Sync {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Make the local files match the provider's current file set
    Mirror {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Fetch every file ever published for one table
    Fetch {
        #[arg(short, long)]
        config: PathBuf,
        /// The table to fetch
        #[arg(short, long)]
        table: String,
    },
    /// Download every artifact of one dump
    Grab {
        #[arg(short, long)]
        config: PathBuf,
        /// The dump to download
        #[arg(short, long)]
        dump: String,
    },
    /// List the published dumps
    List {
        #[arg(short, long)]
        config: PathBuf,
        /// Print the raw JSON list
        #[arg(short, long)]
        json: bool,
    },
    /// Group the historical requests files by time range
    HistoricalRequests {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Decompress and merge tables into single text files
    Unpack {
        #[arg(short, long)]
        config: PathBuf,
        /// Tables to unpack, e.g. -f user_dim account_dim
        #[arg(short, long, num_args = 1.., required = true)]
        filter: Vec<String>,
    },
    /// Issue a signed GET against an API route and print the response
    Api {
        #[arg(short, long)]
        config: PathBuf,
        /// Route relative to the API base, e.g. account/self/dump
        #[arg(short, long)]
        route: String,
    },
    /// Write a sample config file to config.toml.sample
    SampleConfig,
}

fn load_config(path: &Path) -> anyhow::Result<SyncConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    let base = std::env::current_dir().context("could not determine working directory")?;
    let config = RawConfig::from_toml(&text)?.resolve(&base, |name| std::env::var(name).ok())?;
    Ok(config)
}

async fn run(command: Command, show_progress: bool) -> anyhow::Result<()> {
    match command {
        Command::Sync { config } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?.with_progress(show_progress);
            let report = syncer.sync(&StateStore::new(&config.state_file)).await?;
            info!(
                "✅ Sync complete: {} dumps, {} tables, now at sequence {}",
                report.dumps,
                report.tables.len(),
                report.sequence
            );
        }
        Command::Mirror { config } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?.with_progress(show_progress);
            let report = syncer.mirror().await?;
            info!(
                "✅ Mirror complete: {} downloaded, {} cached, {} removed",
                report.downloaded, report.cached, report.removed
            );
        }
        Command::Fetch { config, table } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?.with_progress(show_progress);
            let count = syncer.fetch_table(&table).await?;
            info!("✅ Fetched {} files for {}", count, table);
        }
        Command::Grab { config, dump } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?.with_progress(show_progress);
            let count = syncer.grab_dump(&dump).await?;
            info!("✅ Grabbed {} files from dump {}", count, dump);
        }
        Command::List { config, json } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?;
            let dumps = list_dumps_after(syncer.api(), 0, PAGE_SIZE)
                .await
                .map_err(SyncError::not_found_as_no_files)?;
            if json {
                println!("{}", serde_json::to_string(&dumps)?);
            } else {
                for dump in &dumps {
                    println!("{}", describe_dump(dump));
                }
            }
        }
        Command::HistoricalRequests { config } => {
            let config = load_config(&config)?;
            let ranges = Syncer::from_config(&config)?.historical_requests().await?;
            println!("{}", serde_json::to_string_pretty(&ranges)?);
        }
        Command::Unpack { config, filter } => {
            let config = load_config(&config)?;
            let written =
                dumpsync::unpack::unpack(&config.save_location, &config.unpack_location, &filter)
                    .await?;
            info!("✅ Unpacked {} tables", written.len());
        }
        Command::Api { config, route } => {
            let config = load_config(&config)?;
            let syncer = Syncer::from_config(&config)?;
            let response: serde_json::Value = syncer.api().get_json(&route, &[]).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::SampleConfig => {
            std::fs::write("config.toml.sample", SAMPLE_CONFIG)
                .context("could not write config.toml.sample")?;
            info!("wrote config.toml.sample:\n{}", SAMPLE_CONFIG);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dumpsync={}", args.level).into()),
        )
        .init();

    if let Err(e) = run(args.command, !args.quiet).await {
        match e.downcast_ref::<SyncError>() {
            Some(sync_err) if sync_err.is_silent() => error!("{}", sync_err),
            _ => error!("❌ Error: {:#}", e),
        }
        std::process::exit(1);
    }
}
