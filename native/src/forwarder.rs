// The replacement SetAchievement export: notify the listener, then hand off to Steam.

use crate::ipc::{Notify, PipeNotifier};
use log::debug;
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};

/// `bool SteamAPI_ISteamUserStats_SetAchievement(ISteamUserStats*, const char*)`
pub type SetAchievementFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> bool;

/// Returned when the genuine library could not be resolved.
pub const DEFAULT_RESULT: bool = true;

static FORWARDER: OnceCell<Forwarder<PipeNotifier>> = OnceCell::new();

pub struct Forwarder<N: Notify> {
    genuine: Option<SetAchievementFn>,
    notifier: N,
}

impl<N: Notify> Forwarder<N> {
    pub fn new(genuine: Option<SetAchievementFn>, notifier: N) -> Self {
        Self { genuine, notifier }
    }

    pub fn is_forwarding(&self) -> bool {
        self.genuine.is_some()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Notify the listener about `name`, then call the genuine export.
    ///
    /// # Safety
    /// `name` must be null or point to a NUL-terminated string, and `stats`
    /// must be whatever the genuine export accepts.
    pub unsafe fn set_achievement(&self, stats: *mut c_void, name: *const c_char) -> bool {
        if !name.is_null() {
            let message = unsafe { CStr::from_ptr(name) }.to_bytes();
            self.notify_best_effort(message);
        }

        match self.genuine {
            Some(genuine) => unsafe { genuine(stats, name) },
            None => DEFAULT_RESULT,
        }
    }

    fn notify_best_effort(&self, message: &[u8]) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.notifier.notify(message))) {
            Ok(Ok(())) => debug!("[FORWARDER] Sent {} bytes to listener", message.len()),
            Ok(Err(e)) => debug!("[FORWARDER] Notification skipped: {}", e),
            Err(_) => debug!("[FORWARDER] Notification panicked, ignoring"),
        }
    }
}

/// Install the process-wide forwarder. Later calls keep the first instance.
pub fn install(forwarder: Forwarder<PipeNotifier>) -> bool {
    FORWARDER.set(forwarder).is_ok()
}

/// The process-wide forwarder, built from configuration on first use if
/// attach never ran. The first call also finishes attach.
pub fn global() -> &'static Forwarder<PipeNotifier> {
    let forwarder = FORWARDER.get_or_init(crate::build_default_forwarder);
    crate::finish_attach();
    forwarder
}

/// Hooked export seen by the game in place of the genuine one.
///
/// # Safety
/// Called by the host with the arguments of the genuine export.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SteamAPI_ISteamUserStats_SetAchievement(
    stats: *mut c_void,
    name: *const c_char,
) -> bool {
    unsafe { global().set_achievement(stats, name) }
}
