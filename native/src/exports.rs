// Export forwarding for the proxy DLL.
//
// Every export of the genuine library except the hooked one is forwarded to the
// backing library by a module-definition file built from `dumpbin /exports`.

use crate::backing::SET_ACHIEVEMENT_SYMBOL;
use std::fmt::Write;

/// One row of a dumpbin export table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub ordinal: u32,
    /// `None` for exports available by ordinal only.
    pub name: Option<String>,
}

fn is_hex(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse the export table printed by `dumpbin /exports`.
///
/// Named rows are `ordinal hint RVA name`, ordinal-only rows are
/// `ordinal RVA [NONAME]`. Headers, summary lines and forwarded exports
/// (which carry no RVA) are skipped.
pub fn parse_dumpbin_exports(text: &str) -> Vec<ExportEntry> {
    let mut entries = Vec::new();

    for line in text.lines() {
        if line.contains("(forwarded to") {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(ordinal) = tokens.first().and_then(|t| t.parse::<u32>().ok()) else {
            continue;
        };

        match tokens.as_slice() {
            [_, rva, "[NONAME]", ..] if is_hex(rva) => entries.push(ExportEntry {
                ordinal,
                name: None,
            }),
            [_, hint, rva, name, ..] if is_hex(hint) && is_hex(rva) => {
                let name = if *name == "[NONAME]" {
                    None
                } else {
                    Some(name.to_string())
                };
                entries.push(ExportEntry { ordinal, name });
            }
            _ => {}
        }
    }

    entries
}

/// Render a `.def` file exporting the hooked symbol from this crate and
/// forwarding everything else to `backing_module` (file stem, no `.dll`).
pub fn render_def(entries: &[ExportEntry], backing_module: &str) -> String {
    let hooked = SET_ACHIEVEMENT_SYMBOL.to_string_lossy();
    let backing_module = backing_module
        .strip_suffix(".dll")
        .unwrap_or(backing_module);

    let mut def = String::from("EXPORTS\n");
    let _ = writeln!(def, "    {}", hooked);

    for entry in entries {
        match &entry.name {
            Some(name) if *name == hooked => {}
            Some(name) => {
                let _ = writeln!(
                    def,
                    "    {name} = {backing_module}.{name} @{}",
                    entry.ordinal
                );
            }
            None => {
                let _ = writeln!(
                    def,
                    "    NONAME_{ord} = {backing_module}.#{ord} @{ord} NONAME",
                    ord = entry.ordinal
                );
            }
        }
    }

    def
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMPBIN_SAMPLE: &str = r#"
Dump of file steam_api64.dll

File Type: DLL

  Section contains the following exports for steam_api64.dll

    00000000 characteristics
    FFFFFFFF time date stamp
        0.00 version
           1 ordinal base
         4 number of functions
         3 number of names

    ordinal hint RVA      name

          1    0 00012340 SteamAPI_Init
          2    1 00012A10 SteamAPI_ISteamUserStats_SetAchievement
          3    2 00013000 SteamAPI_Shutdown
          4      00014000 [NONAME]
          5    3          SteamAPI_Legacy (forwarded to steamclient64.SteamAPI_Legacy)

  Summary

        1000 .data
"#;

    #[test]
    fn parses_named_and_ordinal_only_rows() {
        let entries = parse_dumpbin_exports(DUMPBIN_SAMPLE);

        assert_eq!(
            entries,
            vec![
                ExportEntry {
                    ordinal: 1,
                    name: Some("SteamAPI_Init".to_string())
                },
                ExportEntry {
                    ordinal: 2,
                    name: Some("SteamAPI_ISteamUserStats_SetAchievement".to_string())
                },
                ExportEntry {
                    ordinal: 3,
                    name: Some("SteamAPI_Shutdown".to_string())
                },
                ExportEntry {
                    ordinal: 4,
                    name: None
                },
            ]
        );
    }

    #[test]
    fn summary_lines_are_ignored() {
        let entries = parse_dumpbin_exports("           1 ordinal base\n         4 number of functions\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn def_forwards_everything_but_the_hook() {
        let entries = parse_dumpbin_exports(DUMPBIN_SAMPLE);
        let def = render_def(&entries, "steam_api64_original.dll");

        assert_eq!(
            def,
            "EXPORTS\n\
             \x20   SteamAPI_ISteamUserStats_SetAchievement\n\
             \x20   SteamAPI_Init = steam_api64_original.SteamAPI_Init @1\n\
             \x20   SteamAPI_Shutdown = steam_api64_original.SteamAPI_Shutdown @3\n\
             \x20   NONAME_4 = steam_api64_original.#4 @4 NONAME\n"
        );
    }

    #[test]
    fn def_with_no_exports_still_exports_the_hook() {
        assert_eq!(
            render_def(&[], "steam_api_original"),
            "EXPORTS\n    SteamAPI_ISteamUserStats_SetAchievement\n"
        );
    }
}
