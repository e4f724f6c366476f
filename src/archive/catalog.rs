//! Version Catalog
//!
//! The known historical releases and their Steam depot manifest ids. A
//! user-supplied `versions.json` in the config directory replaces the
//! built-in table, so new releases can be added without a new build.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One downloadable release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Display name shown to the user.
    pub name: String,
    /// Steam depot manifest id identifying the exact build.
    pub manifest_id: String,
}

/// All releases this manager knows how to fetch and run.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    versions: Vec<VersionInfo>,
}

impl VersionCatalog {
    /// The built-in release table.
    pub fn builtin() -> Self {
        let versions = BUILTIN_VERSIONS
            .iter()
            .map(|&(name, manifest_id)| VersionInfo {
                name: name.to_string(),
                manifest_id: manifest_id.to_string(),
            })
            .collect();
        Self { versions }
    }

    /// Load `versions.json` from the config directory when present,
    /// otherwise fall back to the built-in table.
    pub fn load_or_builtin(config_dir: &Path) -> Self {
        let override_path = config_dir.join("versions.json");
        if override_path.exists() {
            match Self::load(&override_path) {
                Ok(catalog) => {
                    info!("loaded version catalog from {}", override_path.display());
                    return catalog;
                }
                Err(e) => {
                    tracing::warn!("ignoring invalid versions.json: {e:#}");
                }
            }
        }
        Self::builtin()
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let versions: Vec<VersionInfo> = serde_json::from_str(&content)?;
        anyhow::ensure!(!versions.is_empty(), "version catalog is empty");
        Ok(Self { versions })
    }

    /// Look up a release by display name.
    pub fn find(&self, name: &str) -> Option<&VersionInfo> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Newest-first listing of all releases.
    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }
}

/// Display name and depot manifest id for every known release,
/// newest first.
const BUILTIN_VERSIONS: &[(&str, &str)] = &[
    ("1.9.5 PvP Update: Part 1", "3088992314067472200"),
    ("1.9 Pedal to the Metal", "4412562610966151777"),
    ("1.8 Waves, Camera, Action", "4007835113837207542"),
    ("1.7.4 Now This is Podracing", "7499996565839882351"),
    ("1.7 Spacebound", "4376696831141480241"),
    ("1.6 Wings and Weapons", "7868502592313023064"),
    ("1.5 Decals", "6418274266282092041"),
    ("1.4.2 Mirror Mode", "8084832536635904913"),
    ("1.3 Mod Makers", "752294084919392246"),
    ("1.2 Perfect Pitch", "7125249926418413647"),
    ("1.1 Summer Party", "7622037960763500709"),
    ("1.0.4 Centrifuge", "7797596154752996883"),
    ("1.0 Release", "2589706790386909403"),
    ("0.8.1 Tailwind", "2174733110758165403"),
    ("0.8.0 Rally", "6322044058692429718"),
    ("0.7.3 Happy Holidays", "1401415892018513847"),
    ("0.7.2 The Danger Zone", "6509328320731640329"),
    ("0.7.0 BLOCKS! BLOCKS! BLOCKS!", "292833379719092558"),
    ("0.6.1 Logic Update", "5774605827881735611"),
    ("0.6 Summer Update", "8321905748150428964"),
    ("0.5.2 Submarine (Water Update #2)", "4254061677353968400"),
    ("0.5.1 Build A Boat (Water Update #1)", "5339152136185287284"),
    ("0.5 The Quality Update", "9110008508980233200"),
    ("0.4.2 Race Island", "4955326297487392530"),
    ("0.4.1 Rings of Fire", "2127974181683886289"),
    ("0.4.0 Early Access", "4365140693703019383"),
    ("Alpha Demo", "1105845463103535907"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_catalog_is_populated() {
        let catalog = VersionCatalog::builtin();
        assert_eq!(catalog.versions().len(), 27);
        assert_eq!(catalog.versions()[0].name, "1.9.5 PvP Update: Part 1");
    }

    #[test]
    fn test_find_by_name() {
        let catalog = VersionCatalog::builtin();
        let v = catalog.find("1.0 Release").unwrap();
        assert_eq!(v.manifest_id, "2589706790386909403");
        assert!(catalog.find("9.9 Not A Version").is_none());
    }

    #[test]
    fn test_load_override_catalog() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("versions.json"),
            r#"[{"name": "Test Build", "manifest_id": "42"}]"#,
        )
        .unwrap();

        let catalog = VersionCatalog::load_or_builtin(tmp.path());
        assert_eq!(catalog.versions().len(), 1);
        assert_eq!(catalog.find("Test Build").unwrap().manifest_id, "42");
    }

    #[test]
    fn test_invalid_override_falls_back_to_builtin() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("versions.json"), "[]").unwrap();

        let catalog = VersionCatalog::load_or_builtin(tmp.path());
        assert_eq!(catalog.versions().len(), 27);
    }
}
