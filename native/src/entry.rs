// DLL entry point. Resolves the genuine library as soon as the game loads the proxy.

use std::ffi::{c_void, OsString};
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use std::sync::Once;

use windows::{
    core::BOOL,
    Win32::{
        Foundation::{HINSTANCE, HMODULE},
        System::{
            LibraryLoader::GetModuleFileNameW,
            SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH},
        },
    },
};

const MAX_MODULE_PATH: usize = 32 * 1024;

#[no_mangle]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(hinstance: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
    static ATTACH: Once = Once::new();

    match reason {
        DLL_PROCESS_ATTACH => {
            ATTACH.call_once(|| {
                let module_dir = module_directory(HMODULE(hinstance.0));
                crate::attach(module_dir.as_deref());
            });
        }
        DLL_PROCESS_DETACH => {
            log::info!("[DETACH] Proxy unloading");
            log::logger().flush();
        }
        _ => {}
    }

    // Never fail the load: the game must start even if forwarding is broken.
    true.into()
}

/// Directory the proxy DLL was loaded from.
fn module_directory(module: HMODULE) -> Option<PathBuf> {
    let mut buffer = vec![0u16; MAX_MODULE_PATH];
    let len = unsafe { GetModuleFileNameW(Some(module), &mut buffer) } as usize;
    if len == 0 || len >= buffer.len() {
        return None;
    }

    let path = PathBuf::from(OsString::from_wide(&buffer[..len]));
    path.parent().map(|p| p.to_path_buf())
}
