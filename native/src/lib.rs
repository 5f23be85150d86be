pub mod backing;
pub mod config;
#[cfg(windows)]
mod entry;
pub mod exports;
pub mod forwarder;
pub mod install;
pub mod ipc;
pub mod logging;

use backing::resolve_genuine;
use config::{ConfigError, ProxyConfig};
use forwarder::Forwarder;
use ipc::PipeNotifier;
use log::{debug, info, warn, LevelFilter};
use logging::CrashContext;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};

pub use backing::{BackingLibrary, Bitness, LoaderError};
pub use forwarder::{SetAchievementFn, DEFAULT_RESULT};
pub use ipc::{AchievementListener, Notify, NotifyError};

static DEFERRED_SETUP: OnceCell<DeferredSetup> = OnceCell::new();

/// What attach found, plus the logging it could not do while the loader
/// lock was held. Applied from the first hooked call.
struct DeferredSetup {
    log_file: Option<PathBuf>,
    level: LevelFilter,
    module_dir: Option<PathBuf>,
    backing_library: String,
    config_error: Option<ConfigError>,
    forwarding: bool,
    endpoint: PathBuf,
    attach_time: Duration,
}

impl DeferredSetup {
    fn apply(&self) {
        if let Some(log_path) = &self.log_file {
            if logging::init_file_logger(log_path, self.level).is_ok() {
                logging::init_crash_logger(CrashContext::new(
                    self.module_dir.as_deref(),
                    &self.backing_library,
                ));
            }
        }

        info!(
            "[INIT] SteamEcho proxy v{} attached in {:?}",
            get_version(),
            self.attach_time
        );
        if let Some(dir) = &self.module_dir {
            debug!("[INIT] Module directory: {}", dir.display());
        }
        if let Some(e) = &self.config_error {
            logging::log_startup_error("Configuration", e);
            warn!("[INIT] Using default configuration with environment overrides");
        }
        if self.forwarding {
            info!("[INIT] Forwarding to {}", self.backing_library);
        } else {
            warn!(
                "[INIT] {} unavailable, calls return {}",
                self.backing_library, DEFAULT_RESULT
            );
        }
        info!("[INIT] Notifying {}", self.endpoint.display());
    }
}

/// Process attach: resolve the genuine export and install the process-wide
/// forwarder. Runs under the loader lock, so logging setup waits for the
/// first hooked call. Never fails; problems only degrade forwarding.
pub fn attach(module_dir: Option<&Path>) {
    let (proxy, setup) = prepare_attach(module_dir);
    if !forwarder::install(proxy) {
        debug!("[INIT] Forwarder already installed");
    }
    let _ = DEFERRED_SETUP.set(setup);
}

fn prepare_attach(module_dir: Option<&Path>) -> (Forwarder<PipeNotifier>, DeferredSetup) {
    let attach_start = Instant::now();
    let (config, config_error) = ProxyConfig::load_or_default(module_dir);
    let proxy = build_forwarder_in(&config, module_dir);

    let setup = DeferredSetup {
        log_file: config.log_file_in(module_dir),
        level: config.level_filter(),
        module_dir: module_dir.map(Path::to_path_buf),
        backing_library: config.backing_library_name().to_string(),
        config_error,
        forwarding: proxy.is_forwarding(),
        endpoint: proxy.notifier().endpoint().to_path_buf(),
        attach_time: attach_start.elapsed(),
    };

    (proxy, setup)
}

/// Finish attach once, outside the loader lock.
pub(crate) fn finish_attach() {
    static FINISHED: Once = Once::new();

    FINISHED.call_once(|| {
        if let Some(setup) = DEFERRED_SETUP.get() {
            setup.apply();
        }
    });
}

/// Build a forwarder for `config`, looking for the backing library next to
/// the proxy first so it also works from sub-directories of the game.
pub fn build_forwarder_in(
    config: &ProxyConfig,
    module_dir: Option<&Path>,
) -> Forwarder<PipeNotifier> {
    let backing = backing_library_path(config.backing_library_name(), module_dir);
    let genuine = resolve_genuine(&backing.to_string_lossy());

    Forwarder::new(genuine, PipeNotifier::for_pipe(&config.pipe_name))
}

/// Forwarder for a process where attach never ran: environment configuration only.
pub(crate) fn build_default_forwarder() -> Forwarder<PipeNotifier> {
    let (config, _) = ProxyConfig::load_or_default(None);
    build_forwarder_in(&config, None)
}

fn backing_library_path(file_name: &str, module_dir: Option<&Path>) -> PathBuf {
    match module_dir.map(|dir| dir.join(file_name)) {
        Some(candidate) if candidate.is_file() => candidate,
        _ => PathBuf::from(file_name),
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn backing_next_to_module_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("steam_api64_original.dll"), b"").unwrap();

        assert_eq!(
            backing_library_path("steam_api64_original.dll", Some(dir.path())),
            dir.path().join("steam_api64_original.dll")
        );
    }

    #[test]
    fn backing_falls_back_to_search_path() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            backing_library_path("steam_api_original.dll", Some(dir.path())),
            PathBuf::from("steam_api_original.dll")
        );
        assert_eq!(
            backing_library_path("steam_api_original.dll", None),
            PathBuf::from("steam_api_original.dll")
        );
    }

    #[test]
    fn attach_defers_log_file_creation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("steam_echo.json"),
            r#"{ "log_file": "logs/proxy.log", "backing_library": "steam_echo_missing_backing.dll" }"#,
        )
        .unwrap();

        let (proxy, setup) = prepare_attach(Some(dir.path()));

        assert!(!proxy.is_forwarding());
        assert!(!setup.forwarding);
        assert!(setup.config_error.is_none());
        assert_eq!(setup.log_file, Some(dir.path().join("logs").join("proxy.log")));
        assert!(!dir.path().join("logs").exists());
    }

    #[test]
    fn attach_keeps_config_error_for_later() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("steam_echo.json"), "{ broken").unwrap();

        let (_, setup) = prepare_attach(Some(dir.path()));

        assert!(setup.config_error.is_some());
        assert_eq!(setup.module_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn forwarder_without_backing_library_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            backing_library: Some("steam_echo_missing_backing.dll".to_string()),
            pipe_name: "SteamEchoTestPipe".to_string(),
            ..ProxyConfig::default()
        };

        let forwarder = build_forwarder_in(&config, Some(dir.path()));

        assert!(!forwarder.is_forwarding());
        assert_eq!(
            forwarder.notifier().endpoint(),
            ipc::pipe_endpoint("SteamEchoTestPipe")
        );
    }
}
