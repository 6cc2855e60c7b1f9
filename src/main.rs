//! quickdice - interactive attack roller

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use quickdice::broadcast::RollBroadcaster;
use quickdice::config::RollerConfig;
use quickdice::{open_session, parse_command, report, CommandOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Attack and damage roller
#[derive(Parser, Debug)]
#[command(
    name = "quickdice",
    version,
    about = "Roll d20 attacks and typed damage from compact commands"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for reproducible rolls
    #[arg(long)]
    seed: Option<u64>,

    /// SQLite file for saved commands
    #[arg(long)]
    db: Option<String>,

    /// Player id shown on shared results
    #[arg(long)]
    player: Option<String>,

    /// Do not broadcast results
    #[arg(long)]
    hidden: bool,
}

fn print_outcome(outcome: &CommandOutcome) {
    if let Some(name) = &outcome.loaded {
        println!("loaded {}: {}", name, outcome.command.cleaned);
    }
    if let Some(resolution) = &outcome.resolution {
        for line in report::render(resolution) {
            println!("{}", line);
        }
    }
    if let Some(name) = &outcome.deleted {
        println!("deleted {}", name);
    }
    if let Some(name) = &outcome.saved {
        println!("saved {}", name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickdice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = RollerConfig::load(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.db.is_some() {
        config.db_path = args.db;
    }
    if let Some(player) = args.player {
        config.player_id = player;
    }
    config.hidden |= args.hidden;

    let broadcaster = RollBroadcaster::default();
    let mut session = open_session(&config, broadcaster).await?;
    tracing::info!(
        player = session.player_id(),
        hidden = session.is_hidden(),
        "Roller ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut debug = false;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "exit" => break,
            "debug" => {
                debug = !debug;
                println!("debug {}", if debug { "on" } else { "off" });
                continue;
            }
            "list" => {
                match session.saved_commands().await {
                    Ok(saved) => {
                        for saved in saved {
                            println!("{}: {}", saved.name, saved.command);
                        }
                    }
                    Err(e) => println!("error: {}", e),
                }
                continue;
            }
            _ => {}
        }

        if debug {
            if let Ok(command) = parse_command(input) {
                println!("{}", serde_json::to_string_pretty(&command.params)?);
            }
        }

        match session.execute(input).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}
