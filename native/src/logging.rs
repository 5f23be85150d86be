use log::{error, info, LevelFilter};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Console logger for the command-line tools. `RUST_LOG` wins over `default_level`.
pub fn init_logger(default_level: LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(default_level);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    });

    let _ = builder.try_init();
}

/// Append log lines to `path` from inside the host process.
///
/// Fails if the file cannot be opened. A logger already installed by the host
/// is left in place.
pub fn init_file_logger(path: &Path, level: LevelFilter) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                record.args()
            )
        });

    let _ = builder.try_init();
    Ok(())
}

/// Where the proxy is running, stamped on every crash report so reports from
/// different games can be told apart.
#[derive(Debug, Clone, Default)]
pub struct CrashContext {
    pub host_process: Option<PathBuf>,
    pub module_dir: Option<PathBuf>,
    pub backing_library: String,
}

impl CrashContext {
    pub fn new(module_dir: Option<&Path>, backing_library: &str) -> Self {
        Self {
            host_process: std::env::current_exe().ok(),
            module_dir: module_dir.map(Path::to_path_buf),
            backing_library: backing_library.to_string(),
        }
    }

    fn header(&self, title: &str) -> String {
        format!(
            "===== STEAMECHO {} =====\n\
             Timestamp: {}\n\
             Host process: {}\n\
             Proxy directory: {}\n\
             Backing library: {}\n",
            title,
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            display_or_unknown(self.host_process.as_deref()),
            display_or_unknown(self.module_dir.as_deref()),
            self.backing_library
        )
    }
}

#[derive(Debug, Clone)]
struct CrashLog {
    path: PathBuf,
    context: CrashContext,
}

static CRASH_LOG: Mutex<Option<CrashLog>> = Mutex::new(None);

/// Record panics inside the host process to `proxy_crash.log` in the local
/// data directory.
pub fn init_crash_logger(context: CrashContext) {
    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join("SteamEcho"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = fs::create_dir_all(&log_dir);
    let path = log_dir.join("proxy_crash.log");

    info!(
        "[CRASH LOGGER] Reports for {} go to {}",
        display_or_unknown(context.host_process.as_deref()),
        path.display()
    );

    *CRASH_LOG.lock().unwrap_or_else(|e| e.into_inner()) = Some(CrashLog { path, context });

    std::panic::set_hook(Box::new(|panic_info| {
        let context = crash_log().map(|log| log.context).unwrap_or_default();
        let report = panic_report(&context, panic_info);

        if let Err(e) = append_to_crash_log(&report) {
            error!("[CRASH LOGGER] Failed to write crash log: {}", e);
        }
        error!("\n{}", report);
    }));
}

fn panic_report(context: &CrashContext, panic_info: &std::panic::PanicHookInfo) -> String {
    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "Unknown location".to_string());

    format!(
        "{}Location: {}\nMessage: {}\nThread: {}\n\nBacktrace:\n{}\n",
        context.header("PROXY PANIC"),
        location,
        panic_payload(panic_info.payload()),
        std::thread::current().name().unwrap_or("unnamed"),
        std::backtrace::Backtrace::capture()
    )
}

fn panic_payload(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Unknown panic payload"
    }
}

/// Report a startup problem that degraded the proxy without stopping it.
pub fn log_startup_error(stage: &str, error: &dyn std::fmt::Display) {
    let context = crash_log().map(|log| log.context).unwrap_or_default();
    let report = format!(
        "{}Stage: {}\nError: {}\n",
        context.header("STARTUP ERROR"),
        stage,
        error
    );

    if let Err(e) = append_to_crash_log(&report) {
        error!("[CRASH LOGGER] Failed to write startup error: {}", e);
    }
    error!("[INIT] {} failed: {}", stage, error);
}

fn crash_log() -> Option<CrashLog> {
    CRASH_LOG.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Append to the crash log; a no-op until [`init_crash_logger`] has run.
fn append_to_crash_log(report: &str) -> std::io::Result<()> {
    let Some(log) = crash_log() else {
        return Ok(());
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log.path)?;
    writeln!(file, "\n{}", report)
}

fn display_or_unknown(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
