//! Steam Installation Discovery
//!
//! Finds the canonical game directory by walking Steam's library metadata:
//! registry `InstallPath`, then `libraryfolders.vdf`, then the app
//! manifest's `installdir`. Returns `None` instead of failing when no
//! library contains the expected executable.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Locate the canonical install directory for the given Steam app,
/// validated by the presence of `exe_name` inside it.
pub fn locate_canonical_install(app_id: &str, exe_name: &str) -> Option<PathBuf> {
    for steam_root in candidate_steam_roots() {
        if !steam_root.exists() {
            continue;
        }
        if let Some(found) = find_install_in_steam_root(&steam_root, app_id, exe_name) {
            debug!("found game install at {}", found.display());
            return Some(found);
        }
    }
    None
}

/// Locate `steam.exe` itself, for `-applaunch` style launches.
pub fn locate_steam_executable() -> Option<PathBuf> {
    for root in candidate_steam_roots() {
        let exe = root.join("steam.exe");
        if exe.exists() {
            return Some(exe);
        }
    }
    None
}

/// Steam roots to probe, registry first, well-known paths as fallback.
fn candidate_steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(registry_root) = steam_root_from_registry() {
        roots.push(registry_root);
    }
    for fixed in [
        r"C:\Program Files (x86)\Steam",
        r"C:\Program Files\Steam",
    ] {
        let path = PathBuf::from(fixed);
        if !roots.contains(&path) {
            roots.push(path);
        }
    }
    roots
}

/// Read Steam's `InstallPath` from the registry via `reg.exe`. Only
/// meaningful on Windows; elsewhere the query simply fails and the
/// fallback paths are used.
fn steam_root_from_registry() -> Option<PathBuf> {
    if !cfg!(windows) {
        return None;
    }
    let keys = [
        r"HKEY_LOCAL_MACHINE\SOFTWARE\WOW6432Node\Valve\Steam",
        r"HKEY_LOCAL_MACHINE\SOFTWARE\Valve\Steam",
    ];
    for key in keys {
        let output = Command::new("reg")
            .args(["query", key, "/v", "InstallPath"])
            .output();
        let output = match output {
            Ok(o) if o.status.success() => o,
            _ => continue,
        };
        let text = String::from_utf8_lossy(&output.stdout);
        if let Some(path) = parse_registry_install_path(&text) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Extract the `InstallPath REG_SZ <value>` line from `reg query` output.
fn parse_registry_install_path(output: &str) -> Option<String> {
    let re = Regex::new(r"(?i)InstallPath\s+REG_SZ\s+(.+)").expect("static regex");
    re.captures(output)
        .map(|c| c[1].trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Search one Steam root: the default library first, then every library
/// listed in `libraryfolders.vdf` that carries an app manifest for us.
fn find_install_in_steam_root(steam_root: &Path, app_id: &str, exe_name: &str) -> Option<PathBuf> {
    let default = steam_root
        .join("steamapps")
        .join("common")
        .join("Trailmakers");
    if let Some(found) = dir_with_executable(&default, exe_name) {
        return Some(found);
    }

    let vdf_path = steam_root.join("steamapps").join("libraryfolders.vdf");
    let vdf = std::fs::read_to_string(&vdf_path).ok()?;
    for library in parse_library_paths(&vdf) {
        let steamapps = PathBuf::from(&library).join("steamapps");
        let manifest_path = steamapps.join(format!("appmanifest_{app_id}.acf"));
        let Ok(manifest) = std::fs::read_to_string(&manifest_path) else {
            continue;
        };
        if let Some(install_dir) = parse_install_dir(&manifest) {
            let candidate = steamapps.join("common").join(install_dir);
            if let Some(found) = dir_with_executable(&candidate, exe_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Pull every `"path" "<dir>"` value out of `libraryfolders.vdf`.
fn parse_library_paths(vdf: &str) -> Vec<String> {
    let re = Regex::new(r#""path"\s+"([^"]+)""#).expect("static regex");
    re.captures_iter(vdf)
        .map(|c| c[1].replace("\\\\", "\\"))
        .collect()
}

/// Pull the `"installdir" "<name>"` value out of an app manifest.
fn parse_install_dir(manifest: &str) -> Option<String> {
    let re = Regex::new(r#""installdir"\s+"([^"]+)""#).expect("static regex");
    re.captures(manifest).map(|c| c[1].to_string())
}

/// The directory counts as an install only if the game executable is in it.
fn dir_with_executable(dir: &Path, exe_name: &str) -> Option<PathBuf> {
    if dir.join(exe_name).exists() {
        Some(dir.to_path_buf())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_registry_install_path() {
        let output = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Valve\\Steam\r\n    InstallPath    REG_SZ    C:\\Program Files (x86)\\Steam\r\n";
        assert_eq!(
            parse_registry_install_path(output).as_deref(),
            Some("C:\\Program Files (x86)\\Steam")
        );
        assert!(parse_registry_install_path("no match here").is_none());
    }

    #[test]
    fn test_parse_library_paths_unescapes_backslashes() {
        let vdf = r#"
"libraryfolders"
{
    "0"
    {
        "path"      "C:\\Program Files (x86)\\Steam"
    }
    "1"
    {
        "path"      "D:\\SteamLibrary"
    }
}
"#;
        let paths = parse_library_paths(vdf);
        assert_eq!(
            paths,
            vec![
                "C:\\Program Files (x86)\\Steam".to_string(),
                "D:\\SteamLibrary".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_install_dir() {
        let manifest = r#"
"AppState"
{
    "appid"      "585420"
    "installdir"    "Trailmakers"
}
"#;
        assert_eq!(parse_install_dir(manifest).as_deref(), Some("Trailmakers"));
    }

    #[test]
    fn test_find_install_prefers_default_library() {
        let tmp = TempDir::new().unwrap();
        let game_dir = tmp.path().join("steamapps/common/Trailmakers");
        std::fs::create_dir_all(&game_dir).unwrap();
        std::fs::write(game_dir.join("Trailmakers.exe"), b"").unwrap();

        let found = find_install_in_steam_root(tmp.path(), "585420", "Trailmakers.exe");
        assert_eq!(found, Some(game_dir));
    }

    #[test]
    fn test_find_install_via_library_manifest() {
        let tmp = TempDir::new().unwrap();
        let steam_root = tmp.path().join("steam");
        let library = tmp.path().join("library");
        let game_dir = library.join("steamapps/common/TrailmakersCustom");
        std::fs::create_dir_all(steam_root.join("steamapps")).unwrap();
        std::fs::create_dir_all(&game_dir).unwrap();
        std::fs::write(game_dir.join("Trailmakers.exe"), b"").unwrap();

        let vdf = format!(
            "\"libraryfolders\"\n{{\n    \"0\"\n    {{\n        \"path\"      \"{}\"\n    }}\n}}\n",
            library.display()
        );
        std::fs::write(steam_root.join("steamapps/libraryfolders.vdf"), vdf).unwrap();
        std::fs::write(
            library.join("steamapps/appmanifest_585420.acf"),
            "\"AppState\"\n{\n    \"installdir\"    \"TrailmakersCustom\"\n}\n",
        )
        .unwrap();

        let found = find_install_in_steam_root(&steam_root, "585420", "Trailmakers.exe");
        assert_eq!(found, Some(game_dir));
    }

    #[test]
    fn test_missing_executable_is_not_a_find() {
        let tmp = TempDir::new().unwrap();
        let game_dir = tmp.path().join("steamapps/common/Trailmakers");
        std::fs::create_dir_all(&game_dir).unwrap();

        let found = find_install_in_steam_root(tmp.path(), "585420", "Trailmakers.exe");
        assert!(found.is_none());
    }
}
