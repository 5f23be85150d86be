// Placing the proxy into a game directory tree and taking it out again.
//
// Install renames every steam_api(64).dll to its backing name and copies the
// proxy build in under the original name. Uninstall reverses both steps.

use crate::backing::Bitness;
use crate::config::CONFIG_FILE_NAME;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Game directory not found: {0}")]
    GameDirectoryNotFound(PathBuf),
    #[error("No steam_api.dll or steam_api64.dll found under {0}")]
    NoSteamApi(PathBuf),
    #[error("Proxy build missing for {bitness}: {path}")]
    ProxyBinaryMissing { bitness: Bitness, path: PathBuf },
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Directories that now hold the proxy, with the bitness installed there.
    pub directories: Vec<(Bitness, PathBuf)>,
}

fn ensure_game_dir(game_dir: &Path) -> Result<(), InstallError> {
    if game_dir.is_dir() {
        Ok(())
    } else {
        Err(InstallError::GameDirectoryNotFound(game_dir.to_path_buf()))
    }
}

/// All directories under `root` (inclusive) containing a file named in `names`.
fn find_dirs_containing(root: &Path, names: &[&str]) -> Result<Vec<PathBuf>, InstallError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        if names.iter().any(|name| dir.join(name).is_file()) {
            found.push(dir.clone());
        }

        for entry in fs::read_dir(&dir).map_err(io_error(&dir))? {
            let entry = entry.map_err(io_error(&dir))?;
            let file_type = entry.file_type().map_err(io_error(&entry.path()))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            }
        }
    }

    found.sort();
    Ok(found)
}

/// True when some directory in the tree holds both the proxy and the backing DLL.
pub fn check_proxy_status(game_dir: &Path) -> Result<bool, InstallError> {
    ensure_game_dir(game_dir)?;

    for bitness in Bitness::ALL {
        let ready = find_dirs_containing(game_dir, &[bitness.backing_dll_name()])?
            .iter()
            .any(|dir| dir.join(bitness.proxy_dll_name()).is_file());

        if ready {
            debug!("[INSTALL] {} proxy present under {}", bitness, game_dir.display());
            return Ok(true);
        }
    }

    Ok(false)
}

/// Install the proxy from a release bundle laid out as `<source>/x86/steam_api.dll`,
/// `<source>/x64/steam_api64.dll` and an optional `<source>/steam_echo.json`.
pub fn install_proxy(game_dir: &Path, source_dir: &Path) -> Result<InstallReport, InstallError> {
    ensure_game_dir(game_dir)?;

    // Collect all work up front so a missing proxy build fails before any rename.
    let mut plan = Vec::new();
    for bitness in Bitness::ALL {
        let dirs = find_dirs_containing(
            game_dir,
            &[bitness.proxy_dll_name(), bitness.backing_dll_name()],
        )?;
        if dirs.is_empty() {
            continue;
        }

        let proxy_source = source_dir
            .join(bitness.source_dir_name())
            .join(bitness.proxy_dll_name());
        if !proxy_source.is_file() {
            return Err(InstallError::ProxyBinaryMissing {
                bitness,
                path: proxy_source,
            });
        }

        plan.push((bitness, proxy_source, dirs));
    }

    if plan.is_empty() {
        return Err(InstallError::NoSteamApi(game_dir.to_path_buf()));
    }

    let config_source = source_dir.join(CONFIG_FILE_NAME);
    let mut report = InstallReport::default();

    for (bitness, proxy_source, dirs) in plan {
        for dir in dirs {
            let proxy_path = dir.join(bitness.proxy_dll_name());
            let backing_path = dir.join(bitness.backing_dll_name());

            place_proxy(&proxy_source, &proxy_path, &backing_path)?;

            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_source.is_file() && !config_path.exists() {
                fs::copy(&config_source, &config_path).map_err(io_error(&config_path))?;
            }

            report.directories.push((bitness, dir));
        }
    }

    Ok(report)
}

/// Move the genuine DLL aside and copy the proxy in its place. A failed copy
/// puts the genuine DLL back so the game still starts.
fn place_proxy(
    proxy_source: &Path,
    proxy_path: &Path,
    backing_path: &Path,
) -> Result<(), InstallError> {
    let renamed = proxy_path.is_file() && !backing_path.exists();
    if renamed {
        fs::rename(proxy_path, backing_path).map_err(io_error(proxy_path))?;
        info!(
            "[INSTALL] Renamed {} -> {}",
            proxy_path.display(),
            backing_path.display()
        );
    }

    if proxy_path.exists() {
        return Ok(());
    }

    if let Err(source) = fs::copy(proxy_source, proxy_path) {
        if renamed {
            match fs::rename(backing_path, proxy_path) {
                Ok(()) => warn!("[INSTALL] Restored {} after failed copy", proxy_path.display()),
                Err(e) => warn!("[INSTALL] Could not restore {}: {}", proxy_path.display(), e),
            }
        }
        return Err(InstallError::Io {
            path: proxy_path.to_path_buf(),
            source,
        });
    }

    info!("[INSTALL] Copied proxy to {}", proxy_path.display());
    Ok(())
}

/// Restore every genuine DLL found under `game_dir`. Returns the number of
/// directories restored.
pub fn uninstall_proxy(game_dir: &Path) -> Result<usize, InstallError> {
    ensure_game_dir(game_dir)?;

    let mut restored = 0;
    for bitness in Bitness::ALL {
        for dir in find_dirs_containing(game_dir, &[bitness.backing_dll_name()])? {
            let proxy_path = dir.join(bitness.proxy_dll_name());
            let backing_path = dir.join(bitness.backing_dll_name());
            let config_path = dir.join(CONFIG_FILE_NAME);

            if proxy_path.exists() {
                fs::remove_file(&proxy_path).map_err(io_error(&proxy_path))?;
            }
            if config_path.exists() {
                fs::remove_file(&config_path).map_err(io_error(&config_path))?;
            }

            fs::rename(&backing_path, &proxy_path).map_err(io_error(&backing_path))?;
            info!("[INSTALL] Restored {}", proxy_path.display());
            restored += 1;
        }
    }

    Ok(restored)
}
