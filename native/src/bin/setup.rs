// Proxy management: install into a game, remove it, check it, generate export forwards.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;
use steam_echo_proxy::backing::default_backing_library;
use steam_echo_proxy::{exports, install, logging};

#[derive(Parser)]
#[command(
    name = "steamecho-setup",
    version,
    about = "Install and manage the SteamEcho Steam API proxy"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether the proxy is installed under a game directory
    Status { game_dir: PathBuf },

    /// Rename the genuine steam_api DLLs and copy the proxy in their place
    Install {
        game_dir: PathBuf,

        /// Release bundle containing x86/ and x64/ proxy builds (defaults to this executable's directory)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Remove the proxy and restore the genuine DLLs
    Uninstall { game_dir: PathBuf },

    /// Turn `dumpbin /exports` output into a .def file forwarding to the backing library
    Exports {
        dumpbin: PathBuf,
        output: PathBuf,

        /// Backing library the forwards point at
        #[arg(long)]
        backing: Option<String>,
    },
}

fn default_source_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Cannot locate steamecho-setup executable")?;
    exe.parent()
        .map(|dir| dir.to_path_buf())
        .context("Executable has no parent directory")
}

fn main() -> Result<()> {
    // Load or ignore .env file
    let _ = dotenvy::dotenv();
    logging::init_logger(LevelFilter::Info);

    match Cli::parse().command {
        Command::Status { game_dir } => {
            let installed = install::check_proxy_status(&game_dir)?;
            println!(
                "{}: proxy {}",
                game_dir.display(),
                if installed { "installed" } else { "not installed" }
            );
        }
        Command::Install { game_dir, source } => {
            let source = match source {
                Some(source) => source,
                None => default_source_dir()?,
            };
            let report = install::install_proxy(&game_dir, &source)?;
            for (bitness, dir) in &report.directories {
                println!("installed {} proxy in {}", bitness, dir.display());
            }
        }
        Command::Uninstall { game_dir } => {
            let restored = install::uninstall_proxy(&game_dir)?;
            println!("restored {} director{}", restored, if restored == 1 { "y" } else { "ies" });
        }
        Command::Exports {
            dumpbin,
            output,
            backing,
        } => {
            let text = fs::read_to_string(&dumpbin)
                .with_context(|| format!("Cannot read {}", dumpbin.display()))?;
            let entries = exports::parse_dumpbin_exports(&text);
            anyhow::ensure!(
                !entries.is_empty(),
                "No exports found in {}",
                dumpbin.display()
            );

            let backing = backing.as_deref().unwrap_or(default_backing_library());
            fs::write(&output, exports::render_def(&entries, backing))
                .with_context(|| format!("Cannot write {}", output.display()))?;
            println!("wrote {} exports to {}", entries.len(), output.display());
        }
    }

    Ok(())
}
