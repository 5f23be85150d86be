// IPC between the proxy inside the game and the listening application.
// One connection per achievement: open, write the raw name, close.

pub mod notifier;
pub mod protocol;
pub mod server;

pub use notifier::{pipe_endpoint, Notify, NotifyError, PipeNotifier};
pub use protocol::{decode_achievement, MAX_MESSAGE_SIZE};
pub use server::{read_message, AchievementListener, ListenerError};

/// Default pipe name shared by the proxy and the listener.
pub const PIPE_NAME: &str = "SteamEchoPipe";
