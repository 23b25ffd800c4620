//! Rocket Notify binary.
//!
//! Start the bot and the polling loops with:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx RC_TOKEN_SALT=yyy cargo run -p notify-telegram
//! ```

use std::path::PathBuf;

use clap::Parser;
use notify_core::{config, AppConfig};
use notify_telegram::App;
use tracing_subscriber::EnvFilter;

/// Rocket Notify - Telegram alerts for unread chat messages
#[derive(Parser, Debug)]
#[command(name = "rocket-notify")]
#[command(about = "Polls Rocket.Chat (and optionally Pachca) and sends Telegram alerts for new unread messages")]
struct Args {
    /// State directory (default: $NOTIFY_STATE_DIR or ~/.rocket-notify)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Run one polling cycle, print the outcome and exit
    #[arg(long)]
    once: bool,

    /// Verbose logging (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    config::load_env_files();

    let filter = match args.verbose {
        0 => "rocket_notify=info,notify_telegram=info,notify_runtime=info,teloxide=warn",
        1 => "rocket_notify=debug,notify_telegram=debug,notify_runtime=debug,notify_backend=debug,teloxide=info",
        _ => "rocket_notify=trace,notify_telegram=trace,notify_runtime=trace,notify_backend=trace,teloxide=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut app_config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    if let Some(dir) = args.state_dir {
        app_config.state_dir = dir;
    }
    tracing::debug!(config = ?app_config, "configuration loaded");

    let app = App::build(&app_config).await?;

    if args.once {
        let (cycle, pachca) = app.run_once().await;
        println!("Rocket.Chat: {:?}", cycle);
        if let Some(outcome) = pachca {
            println!("Pachca: {:?}", outcome);
        }
        return Ok(());
    }

    match app.bot.get_me().await {
        Ok(username) => {
            tracing::info!(username = %username, "bot initialized");
            println!("\n[bell] Rocket Notify");
            println!("   Bot: @{}", username);
            println!("   Poll interval: {} min", app_config.polling_interval.as_secs() / 60);
            println!("   State: {}", app_config.state_dir.display());
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to get bot info");
            return Err(e.into());
        }
    }

    println!("\n   Press Ctrl+C to stop\n");

    let mut runtime = app.runtime();
    runtime.start()?;

    let result = app.bot.start_polling().await;

    runtime.shutdown().await?;
    result?;
    Ok(())
}
