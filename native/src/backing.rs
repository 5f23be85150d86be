// Loading of the renamed genuine Steam API library and resolution of the hooked export.

use crate::forwarder::SetAchievementFn;
use log::warn;
use std::ffi::CStr;
use thiserror::Error;

/// Name of the single export this proxy intercepts.
pub const SET_ACHIEVEMENT_SYMBOL: &CStr = c"SteamAPI_ISteamUserStats_SetAchievement";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Backing library not found: {name} ({source})")]
    LibraryNotFound {
        name: String,
        source: std::io::Error,
    },
    #[error("Symbol {symbol} not exported by {library}")]
    SymbolNotFound { symbol: String, library: String },
    #[error("Loading backing libraries is only supported on Windows")]
    Unsupported,
}

/// Pointer width of a Steam API build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bitness {
    X86,
    X64,
}

impl Bitness {
    pub const ALL: [Bitness; 2] = [Bitness::X86, Bitness::X64];

    /// Bitness of the running build.
    pub const fn current() -> Self {
        if cfg!(target_pointer_width = "64") {
            Bitness::X64
        } else {
            Bitness::X86
        }
    }

    /// File name the game loads, which the proxy takes over.
    pub const fn proxy_dll_name(self) -> &'static str {
        match self {
            Bitness::X86 => "steam_api.dll",
            Bitness::X64 => "steam_api64.dll",
        }
    }

    /// File name the genuine library is renamed to.
    pub const fn backing_dll_name(self) -> &'static str {
        match self {
            Bitness::X86 => "steam_api_original.dll",
            Bitness::X64 => "steam_api64_original.dll",
        }
    }

    /// Sub-directory holding the proxy build of this bitness in a release bundle.
    pub const fn source_dir_name(self) -> &'static str {
        match self {
            Bitness::X86 => "x86",
            Bitness::X64 => "x64",
        }
    }
}

impl std::fmt::Display for Bitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.source_dir_name())
    }
}

pub fn default_backing_library() -> &'static str {
    Bitness::current().backing_dll_name()
}

/// The genuine library, loaded for the rest of the process lifetime.
///
/// The module handle is never freed, so the resolved pointer stays valid
/// until the host exits.
pub struct BackingLibrary {
    set_achievement: SetAchievementFn,
}

impl BackingLibrary {
    #[cfg(windows)]
    pub fn load(file_name: &str) -> Result<Self, LoaderError> {
        use windows::core::{HSTRING, PCSTR, PCWSTR};
        use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

        let wide_name = HSTRING::from(file_name);
        let module = unsafe { LoadLibraryW(PCWSTR(wide_name.as_ptr())) }.map_err(|e| {
            LoaderError::LibraryNotFound {
                name: file_name.to_string(),
                source: std::io::Error::other(e),
            }
        })?;

        let symbol = PCSTR::from_raw(SET_ACHIEVEMENT_SYMBOL.as_ptr() as *const u8);
        let proc = unsafe { GetProcAddress(module, symbol) }.ok_or_else(|| {
            LoaderError::SymbolNotFound {
                symbol: SET_ACHIEVEMENT_SYMBOL.to_string_lossy().into_owned(),
                library: file_name.to_string(),
            }
        })?;

        // SAFETY: the export has the SetAchievement signature in every Steam API release.
        let set_achievement = unsafe {
            std::mem::transmute::<unsafe extern "system" fn() -> isize, SetAchievementFn>(proc)
        };

        log::debug!(
            "[LOADER] Resolved {} in {} at {:p}",
            SET_ACHIEVEMENT_SYMBOL.to_string_lossy(),
            file_name,
            set_achievement as *const ()
        );

        Ok(Self { set_achievement })
    }

    #[cfg(not(windows))]
    pub fn load(_file_name: &str) -> Result<Self, LoaderError> {
        Err(LoaderError::Unsupported)
    }

    pub fn set_achievement(&self) -> SetAchievementFn {
        self.set_achievement
    }
}

/// Load the backing library and return the genuine export, or `None` on any failure.
pub fn resolve_genuine(file_name: &str) -> Option<SetAchievementFn> {
    match BackingLibrary::load(file_name) {
        Ok(library) => Some(library.set_achievement()),
        Err(e) => {
            warn!("[LOADER] {}", e);
            warn!("[LOADER] Calls will return the default result without forwarding");
            None
        }
    }
}
