mod commands;
mod gateway;

use chime_channels::TelegramChannel;
use chime_core::config;
use chime_store::Store;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "chime",
    version,
    about = "chime — a Telegram reminder bot for your to-do list"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and the reminder scheduler.
    Start,
    /// Check configuration and store health.
    Status,
    /// Create an account.
    AddUser { username: String, password: String },
    /// Add a task to an account's to-do list.
    AddTask { username: String, text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.bot.log_level)),
        )
        .init();

    match cli.command {
        Commands::Start => {
            if !cfg.telegram.enabled {
                anyhow::bail!("Telegram is disabled in config.toml. Enable it to run the bot.");
            }
            let Some(token) = cfg.telegram.token() else {
                anyhow::bail!(
                    "Telegram is enabled but no bot token is set. \
                     Set telegram.bot_token in config.toml or the BOT_TOKEN env var."
                );
            };

            let store = Store::new(&cfg.store).await?;
            let channel = Arc::new(TelegramChannel::new(&token));

            println!("{} — starting bot...", cfg.bot.name);
            let gw = Arc::new(gateway::Gateway::new(channel, store, cfg.scheduler.clone()));
            gw.run().await?;
        }
        Commands::Status => {
            println!("{} — status\n", cfg.bot.name);
            println!("Config: {}", cli.config);
            println!(
                "  telegram: {}",
                if cfg.telegram.enabled && cfg.telegram.token().is_some() {
                    "configured"
                } else if cfg.telegram.enabled {
                    "enabled but missing bot token"
                } else {
                    "disabled"
                }
            );
            println!(
                "  scheduler: {}",
                if cfg.scheduler.enabled {
                    format!("every {}s", cfg.scheduler.poll_interval_secs)
                } else {
                    "disabled".to_string()
                }
            );

            let store = Store::new(&cfg.store).await?;
            let (users, items, reminders) = store.stats().await?;
            println!(
                "  store: {} ({users} users, {items} items, {reminders} reminders)",
                cfg.store.db_path
            );
        }
        Commands::AddUser { username, password } => {
            let store = Store::new(&cfg.store).await?;
            let id = store.create_user(&username, &password).await?;
            println!("created user '{username}' (id {id})");
        }
        Commands::AddTask { username, text } => {
            let store = Store::new(&cfg.store).await?;
            let Some(user) = store.find_by_username(&username).await? else {
                anyhow::bail!("no such user: {username}");
            };
            let id = store.create_item(user.id, &text).await?;
            println!("added task {id} to {username}'s list");
        }
    }

    Ok(())
}
