//! Release pipeline executor CLI.
//!
//! Reads groups, entities, release channels and steps from a JSON record
//! store, runs the channel's steps and records the release.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use releaser::exit_codes;
use releaser::io::config::{DEFAULT_CONFIG_PATH, load_config};
use releaser::io::shell::SystemShell;
use releaser::io::store::{JsonDirStore, RecordStore};
use releaser::logging;
use releaser::release::{ReleaseResponse, release_entity, release_group};

#[derive(Parser)]
#[command(
    name = "releaser",
    version,
    about = "Run release pipelines over groups and entities"
)]
struct Cli {
    /// Path to `releaser.toml`. Defaults apply when the file is missing.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Record store directory (overrides config and `RELEASER_STORE_DIR`).
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Release every entity of a group through the group's release channel.
    ReleaseGroup { group_id: String },
    /// Release a single entity through its group's release channel.
    ReleaseEntity { entity_id: String },
    /// Print the ordered steps of a release channel.
    Steps { channel_id: String },
    /// Print a recorded release.
    Show { release_id: String },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let cfg = load_config(&cli.config)?.with_env_overrides();
    logging::init(&cfg.log_level, cli.verbose);

    let store_dir = cli.store.unwrap_or_else(|| cfg.store_dir.clone());
    let store = JsonDirStore::open(store_dir)?;
    let shell = SystemShell::new(&cfg.shell, cfg.output_limit_bytes);

    match cli.command {
        Command::ReleaseGroup { group_id } => {
            finish_release(&release_group(&store, &shell, &group_id)?)
        }
        Command::ReleaseEntity { entity_id } => {
            finish_release(&release_entity(&store, &shell, &entity_id)?)
        }
        Command::Steps { channel_id } => {
            print_json(&store.channel_steps(&channel_id)?)?;
            Ok(exit_codes::OK)
        }
        Command::Show { release_id } => {
            print_json(&store.release(&release_id)?)?;
            Ok(exit_codes::OK)
        }
    }
}

fn finish_release(response: &ReleaseResponse) -> Result<i32> {
    print_json(response)?;
    Ok(if response.ok {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
