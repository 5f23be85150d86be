// Build script linking the export-forwarding .def file into the proxy DLL.
//
// Generate the file with `steamecho-setup exports` and place it at
// exports/steam_api64.def (64-bit) or exports/steam_api.def (32-bit), or point
// STEAMECHO_EXPORTS_DEF at it.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=exports");
    println!("cargo:rerun-if-env-changed=STEAMECHO_EXPORTS_DEF");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    // Only MSVC's linker understands /DEF.
    if target_os != "windows" || target_env != "msvc" {
        return;
    }

    let def_path = match env::var("STEAMECHO_EXPORTS_DEF") {
        Ok(path) => PathBuf::from(path),
        Err(_) => {
            let pointer_width = env::var("CARGO_CFG_TARGET_POINTER_WIDTH").unwrap_or_default();
            let file_name = if pointer_width == "64" {
                "steam_api64.def"
            } else {
                "steam_api.def"
            };
            let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
            PathBuf::from(manifest_dir).join("exports").join(file_name)
        }
    };

    if def_path.is_file() {
        println!("cargo:rerun-if-changed={}", def_path.display());
        println!("cargo:rustc-cdylib-link-arg=/DEF:{}", def_path.display());
    } else {
        eprintln!("Warning: {} not found.", def_path.display());
        eprintln!("The proxy will only export SteamAPI_ISteamUserStats_SetAchievement.");
    }
}
