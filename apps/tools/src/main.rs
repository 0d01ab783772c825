use std::time::Duration;

use anyhow::{bail, Context, Result};
use bot_api::{fan_out, BroadcastSettings};
use clap::{Parser, Subcommand};
use storage::{RecordStore, Storage};
use telegram::{TelegramClient, TelegramConfig, DEFAULT_API_URL};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/bot.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every registered user.
    ListUsers,
    /// Print record counts.
    Stats,
    /// Send a message to every registered user. Needs BOT_TOKEN.
    Broadcast {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::ListUsers => {
            for user in storage.list_users().await? {
                println!(
                    "{}\taccount={}\tname={}\tregistered={}",
                    user.user_id,
                    user.account_id,
                    user.display_name,
                    user.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Stats => {
            let stats = storage.stats().await?;
            println!("users={}", stats.users);
            println!("tasks={}", stats.tasks);
            println!("events={}", stats.events);
            println!("files={}", stats.files);
        }
        Command::Broadcast {
            message,
            concurrency,
            timeout_secs,
        } => {
            let text = message.join(" ");
            if text.trim().is_empty() {
                bail!("broadcast message is empty");
            }
            let token = std::env::var("BOT_TOKEN")
                .or_else(|_| std::env::var("APP__BOT_TOKEN"))
                .context("BOT_TOKEN must be set to broadcast")?;
            let api_url =
                std::env::var("TELEGRAM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
            let timeout = Duration::from_secs(timeout_secs.max(1));
            let client = TelegramClient::new(&TelegramConfig {
                api_url,
                token,
                request_timeout: timeout,
            })?;
            let settings = BroadcastSettings {
                concurrency: concurrency.max(1),
                delivery_timeout: timeout,
                allowlist: Vec::new(),
            };

            let report = fan_out(&storage, &client, &settings, text.trim()).await?;
            println!(
                "delivered {} of {} users",
                report.delivered, report.attempted
            );
            for account_id in &report.failed {
                println!("failed account={account_id}");
            }
        }
    }

    storage.close().await;
    Ok(())
}
