use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::template::{Template, TemplateKind};

/// Top-level configuration for exifsort.
///
/// Every section is defaulted, so a config file only needs the keys it wants to change.
/// CLI flags are applied on top of the loaded values and the result is treated as
/// read-only for the rest of the run.
///
/// # Loading
///
/// ```rust,no_run
/// use exifsort::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.naming.directory_template = "YYYY/MM".into();
/// config.dates.offset_seconds = 3600;
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How creation dates are read (ExifTool binary, tag priority).
    pub metadata: MetadataConfig,
    /// Which files are picked up and what happens on collisions.
    pub files: FileConfig,
    /// Directory and file name templates.
    pub naming: NamingConfig,
    /// Time corrections applied to the extracted date.
    pub dates: DateConfig,
    /// Output behavior.
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// ExifTool executable, looked up on `PATH` unless it is a path.
    pub exiftool: String,
    /// Group-qualified tags tried in order; the first one holding a valid date wins.
    pub date_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Extensions (without dot, case-insensitive) that are processed.
    pub extensions: Vec<String>,
    /// Folder for files whose creation date could not be determined.
    pub fallback_folder: String,
    /// If `false`, files without a date are left where they are.
    pub use_fallback_folder: bool,
    /// What to do when the destination file already exists.
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub directory_template: String,
    /// Template for the timestamp prefix put in front of the original name.
    pub file_template: String,
    /// Text inserted between the prefix and the original name.
    pub interfix: String,
    pub use_prefix: bool,
    /// Move into dated subdirectories. When `false` files are only renamed in place.
    pub use_subdirs: bool,
    /// Lowercase extensions and apply `change_extensions`.
    pub normalize_ext: bool,
    pub change_extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// Seconds added to every extracted date (camera clock correction).
    pub offset_seconds: i64,
    /// `HH:MM:SS` at which a new day begins. Earlier photos go to the previous day's folder.
    pub day_starts: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, report what would happen without touching the filesystem.
    pub dry_run: bool,
}

/// Behavior when a file's destination is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Leave the source file alone and report it.
    #[default]
    Skip,
    /// Replace the existing destination file.
    Overwrite,
    /// Pick the first free `name_N.ext`.
    Unique,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Unique => "unique",
        })
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            exiftool: "exiftool".to_string(),
            date_tags: vec![
                "EXIF:DateTimeOriginal".to_string(),
                "EXIF:CreateDate".to_string(),
                "XMP:CreateDate".to_string(),
                "QuickTime:CreateDate".to_string(),
            ],
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "dng", "mov", "mp4", "orf", "ori", "raw"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_folder: "_UNKNOWN".to_string(),
            use_fallback_folder: true,
            on_conflict: ConflictPolicy::Skip,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            directory_template: "YYYYMMDD".to_string(),
            file_template: "YYYYMMDD-HHMMSS".to_string(),
            interfix: String::new(),
            use_prefix: true,
            use_subdirs: true,
            normalize_ext: true,
            change_extensions: BTreeMap::from([
                ("jpeg".to_string(), "jpg".to_string()),
                ("tiff".to_string(), "tif".to_string()),
            ]),
        }
    }
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            offset_seconds: 0,
            day_starts: "04:00:00".to_string(),
        }
    }
}

impl Config {
    /// Resolve the config file path, in the same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            // Only the implicit default location may be absent.
            if path.is_some() {
                bail!("Config file not found: {}", config_path.display());
            }
            log::debug!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        log::debug!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Lowercase the configured extensions, strip leading dots and drop blanks.
    pub fn normalize_extensions(&mut self) {
        let mut extensions: Vec<String> = Vec::new();
        for ext in &self.files.extensions {
            let ext = ext.trim().trim_start_matches('.').to_lowercase();
            if !ext.is_empty() && !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        self.files.extensions = extensions;
    }

    /// Check the settings that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<()> {
        if self.files.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            bail!("At least one file extension must be specified.");
        }

        self.day_start()?;
        self.directory_template()?;
        self.file_template()?;

        let interfix = &self.naming.interfix;
        if interfix.contains(['/', '\\']) || interfix == "." || interfix == ".." {
            bail!("Interfix '{interfix}' must not contain path separators or be '.' or '..'.");
        }

        if self.files.use_fallback_folder {
            let folder = Path::new(&self.files.fallback_folder);
            if self.files.fallback_folder.trim().is_empty() {
                bail!("Fallback folder name must not be empty.");
            }
            if !folder
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                bail!(
                    "Fallback folder '{}' must be a relative path without '..'.",
                    self.files.fallback_folder
                );
            }
        }

        if self.metadata.date_tags.is_empty() {
            bail!("At least one metadata date tag must be configured.");
        }

        Ok(())
    }

    /// The parsed `dates.day_starts` boundary.
    pub fn day_start(&self) -> Result<NaiveTime> {
        parse_day_start(&self.dates.day_starts)
    }

    pub fn directory_template(&self) -> Result<Template> {
        Template::parse(&self.naming.directory_template, TemplateKind::Directory)
            .context("Invalid directory template")
    }

    pub fn file_template(&self) -> Result<Template> {
        Template::parse(&self.naming.file_template, TemplateKind::File)
            .context("Invalid file template")
    }

    /// Does `path` carry one of the configured extensions?
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.files.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

/// Parse a strict `HH:MM:SS` day boundary (hours 0-23, minutes and seconds 0-59).
pub fn parse_day_start(value: &str) -> Result<NaiveTime> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        bail!("Invalid time format for new day start '{value}': expected HH:MM:SS (e.g. 04:00:00)");
    }

    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .with_context(|| format!("Invalid time format for new day start '{value}'"))?;
    }
    let [h, m, s] = numbers;
    if h > 23 || m > 59 || s > 59 {
        bail!("Invalid time values in '{value}' (hours: 0-23, minutes/seconds: 0-59)");
    }

    NaiveTime::from_hms_opt(h, m, s)
        .with_context(|| format!("Invalid time for new day start '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.naming.normalize_ext);
        assert!(config.naming.use_prefix);
        assert!(config.naming.use_subdirs);
        assert!(config.files.use_fallback_folder);
        assert_eq!(config.dates.offset_seconds, 0);
        assert_eq!(config.files.fallback_folder, "_UNKNOWN");
        assert_eq!(config.naming.file_template, "YYYYMMDD-HHMMSS");
        assert_eq!(config.naming.directory_template, "YYYYMMDD");
        assert_eq!(config.files.on_conflict, ConflictPolicy::Skip);
        assert!(config.files.extensions.contains(&"jpg".to_string()));
        assert!(!config.output.dry_run);
        config.validate().unwrap();
    }

    #[test]
    fn normalize_extensions_strips_dots_and_case() {
        let mut config = Config::default();
        config.files.extensions = vec![".JPG".into(), "png".into(), " ".into(), "jpg".into()];
        config.normalize_extensions();
        assert_eq!(config.files.extensions, vec!["jpg".to_string(), "png".to_string()]);
    }

    #[test]
    fn validate_rejects_blank_extensions() {
        let mut config = Config::default();
        config.files.extensions = vec!["".into(), "  ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_fallback_folder() {
        let mut config = Config::default();
        config.files.fallback_folder = "../outside".into();
        assert!(config.validate().is_err());

        config.files.fallback_folder = String::new();
        assert!(config.validate().is_err());

        // Not checked when the fallback folder is disabled
        config.files.use_fallback_folder = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_interfix_with_path() {
        let mut config = Config::default();
        for bad in ["../../escaped", "a/b", "a\\b", "..", "."] {
            config.naming.interfix = bad.into();
            assert!(config.validate().is_err(), "interfix {bad:?} accepted");
        }

        config.naming.interfix = "trip..2024".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_templates() {
        let mut config = Config::default();
        config.naming.file_template = "YYYY/MM".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.naming.directory_template = "photos".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn day_start_parsing() {
        assert_eq!(
            parse_day_start("04:00:00").unwrap(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap()
        );
        assert_eq!(
            parse_day_start("05:30:15").unwrap(),
            NaiveTime::from_hms_opt(5, 30, 15).unwrap()
        );
        assert!(parse_day_start("04:00").is_err());
        assert!(parse_day_start("24:00:00").is_err());
        assert!(parse_day_start("12:60:00").is_err());
        assert!(parse_day_start("aa:bb:cc").is_err());
    }

    #[test]
    fn matches_extension_case_insensitive() {
        let config = Config::default();
        assert!(config.matches_extension(Path::new("a.JPG")));
        assert!(config.matches_extension(Path::new("clip.mp4")));
        assert!(!config.matches_extension(Path::new("notes.txt")));
        assert!(!config.matches_extension(Path::new("noext")));
    }

    #[test]
    fn conflict_policy_serde() {
        let json = serde_json::to_string(&ConflictPolicy::Unique).unwrap();
        assert_eq!(json, "\"unique\"");
        let policy: ConflictPolicy = serde_json::from_str("\"overwrite\"").unwrap();
        assert_eq!(policy, ConflictPolicy::Overwrite);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.naming.interfix = "vacation".into();
        config.dates.offset_seconds = -3600;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.naming.interfix, "vacation");
        assert_eq!(loaded.dates.offset_seconds, -3600);
    }

    #[test]
    fn load_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "naming": { "directory_template": "YYYY/MM" } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.naming.directory_template, "YYYY/MM");
        assert_eq!(config.naming.file_template, "YYYYMMDD-HHMMSS");
        assert_eq!(config.files.fallback_folder, "_UNKNOWN");
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn load_invalid_json_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
