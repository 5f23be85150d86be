// Console listener: prints every achievement the proxy reports, one per line.

use clap::Parser;
use log::{error, info, LevelFilter};
use steam_echo_proxy::ipc::{AchievementListener, MAX_MESSAGE_SIZE, PIPE_NAME};
use steam_echo_proxy::logging;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "steamecho-listen",
    version,
    about = "Print achievements reported by the SteamEcho proxy"
)]
struct Cli {
    /// Pipe name, without the \\.\pipe\ prefix
    #[arg(short, long, env = "STEAMECHO_PIPE_NAME", default_value = PIPE_NAME)]
    pipe: String,

    /// Largest accepted message in bytes
    #[arg(long, default_value_t = MAX_MESSAGE_SIZE)]
    max_message_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load or ignore .env file
    let _ = dotenvy::dotenv();
    logging::init_logger(LevelFilter::Info);

    let cli = Cli::parse();
    let listener = AchievementListener::new(cli.pipe).with_max_message_size(cli.max_message_size);

    let (sink, mut achievements) = mpsc::unbounded_channel::<String>();
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("[LISTEN] Ctrl-C received, stopping");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                error!("[LISTEN] Cannot watch for Ctrl-C: {}", e);
                // Keep the sender alive so the listener keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(name) = achievements.recv().await {
            println!("{}", name);
        }
    });

    info!("[LISTEN] Waiting for achievements on {}", listener.endpoint().display());
    let result = listener.run(sink, shutdown_rx).await;

    printer.abort();
    result.map_err(Into::into)
}
