use anyhow::{Context, Result};
use chrono::{Days, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::metadata::Metadata;
use crate::template::Template;

/// Where a [`FileItem`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Analyzed and waiting to be moved (or planned, in a dry run).
    Pending,
    Moved,
    /// Left untouched: invalid file, missing date without fallback, or a name collision.
    Skipped,
    /// The move itself failed.
    Error,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Moved => "moved",
            Self::Skipped => "skipped",
            Self::Error => "error",
        })
    }
}

/// One media file and everything known about where it should go.
///
/// Created when the file is enumerated, filled in by [`Planner::plan`] once its metadata
/// has been read, and finalized by [`crate::pipeline::execute`].
#[derive(Debug, Clone, Serialize)]
pub struct FileItem {
    /// Absolute path of the file as found.
    pub source: PathBuf,
    pub name: String,
    pub stem: String,
    pub extension: String,
    pub size: u64,
    /// Creation date as stored in the metadata.
    pub exif_date: Option<NaiveDateTime>,
    /// `exif_date` with the configured offset applied.
    pub date_time: Option<NaiveDateTime>,
    pub mime_type: Option<String>,
    /// First half of the MIME type (`image`, `video`), or `unknown`.
    pub media_type: String,
    /// Destination folder relative to the source directory; `None` when renaming in place.
    pub subdir: Option<PathBuf>,
    pub prefix: String,
    pub new_name: String,
    pub target: Option<PathBuf>,
    pub status: FileStatus,
    /// User-facing problem description. May be set on a pending item that is headed for
    /// the fallback folder.
    pub error: Option<String>,
}

impl FileItem {
    pub fn new(path: &Path) -> Self {
        let source = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let name = file_name_string(&source);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = source
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            source,
            name,
            stem,
            extension,
            size: 0,
            exif_date: None,
            date_time: None,
            mime_type: None,
            media_type: "unknown".to_string(),
            subdir: None,
            prefix: String::new(),
            new_name: String::new(),
            target: None,
            status: FileStatus::Pending,
            error: None,
        }
    }

    /// Check that the file can be moved. Marks the item skipped and returns `false` if not.
    pub fn validate(&mut self) -> bool {
        match check_file(&self.source) {
            Ok(size) => {
                self.size = size;
                true
            }
            Err(reason) => {
                self.skip(reason);
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == FileStatus::Pending
    }

    /// Anything went wrong, including notes on files that still get moved.
    pub fn has_issue(&self) -> bool {
        self.error.is_some() || matches!(self.status, FileStatus::Skipped | FileStatus::Error)
    }

    pub(crate) fn skip(&mut self, reason: impl Into<String>) {
        self.status = FileStatus::Skipped;
        self.error = Some(reason.into());
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = FileStatus::Error;
        self.error = Some(reason.into());
    }
}

/// Returns the file size, or the reason the file cannot be processed.
fn check_file(path: &Path) -> std::result::Result<u64, String> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Err("File does not exist.".to_string()),
    };
    if !meta.is_file() {
        return Err("Not a regular file.".to_string());
    }
    if meta.len() == 0 {
        return Err("File is empty.".to_string());
    }
    if std::fs::File::open(path).is_err() {
        return Err("File is not readable.".to_string());
    }
    if meta.permissions().readonly() {
        return Err("File is not writable.".to_string());
    }
    Ok(meta.len())
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Computes destinations from a [`Config`], which is validated on construction.
///
/// Templates and the day boundary are parsed once up front, so planning a file cannot
/// fail on configuration.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    config: &'a Config,
    source_dir: PathBuf,
    directory_template: Template,
    file_template: Template,
    day_start: NaiveTime,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a Config, source_dir: &Path) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source_dir: std::path::absolute(source_dir)
                .context("Failed to resolve source directory")?,
            directory_template: config.directory_template()?,
            file_template: config.file_template()?,
            day_start: config.day_start()?,
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Validate `path` and compute its destination from already-read metadata.
    #[cfg(test)]
    pub(crate) fn analyze(&self, path: &Path, metadata: Result<Metadata>) -> FileItem {
        let mut item = FileItem::new(path);
        if item.validate() {
            self.plan(&mut item, metadata);
        }
        item
    }

    /// Resolve the date of `item` and fill in its destination.
    ///
    /// A metadata error is not fatal: the item is treated like a file without a date
    /// and goes to the fallback folder when that is enabled.
    pub fn plan(&self, item: &mut FileItem, metadata: Result<Metadata>) {
        let cfg = self.config;

        match metadata {
            Ok(md) => {
                item.mime_type = md.mime_type().map(str::to_string);
                match md.creation_date(&cfg.metadata.date_tags) {
                    Ok(date) => item.exif_date = date,
                    Err(e) => item.error = Some(format!("Error extracting EXIF date: {e}")),
                }
            }
            Err(e) => item.error = Some(format!("Error reading EXIF metadata: {e:#}")),
        }
        item.media_type = item
            .mime_type
            .as_deref()
            .and_then(|m| m.split('/').next())
            .filter(|t| !t.is_empty())
            .unwrap_or("unknown")
            .to_string();

        if let Some(exif_date) = item.exif_date {
            match apply_offset(exif_date, cfg.dates.offset_seconds) {
                Some(dt) => item.date_time = Some(dt),
                None => {
                    item.skip("Time offset moves the date out of range.");
                    return;
                }
            }
        } else {
            if item.error.is_none() {
                item.error = Some("No EXIF date found.".to_string());
            }
            if !cfg.files.use_fallback_folder {
                item.status = FileStatus::Skipped;
                return;
            }
        }

        item.prefix = match item.date_time {
            Some(dt) if cfg.naming.use_prefix => self.file_template.render(&dt),
            _ => String::new(),
        };

        item.subdir = if cfg.naming.use_subdirs {
            Some(match item.date_time {
                Some(dt) => PathBuf::from(
                    self.directory_template
                        .render(&self.folder_date(dt)),
                ),
                None => PathBuf::from(&cfg.files.fallback_folder),
            })
        } else {
            None
        };

        item.new_name = build_name(
            &item.prefix,
            &cfg.naming.interfix,
            &item.stem,
            &self.new_extension(&item.extension),
        );

        let dir = match &item.subdir {
            Some(sub) => self.source_dir.join(sub),
            None => self.source_dir.clone(),
        };
        item.target = Some(dir.join(&item.new_name));
    }

    /// The date whose folder a photo taken at `dt` belongs in.
    ///
    /// Before the configured day start the photo still counts as part of the previous day.
    pub fn folder_date(&self, dt: NaiveDateTime) -> NaiveDateTime {
        if dt.time() < self.day_start {
            dt.checked_sub_days(Days::new(1)).unwrap_or(dt)
        } else {
            dt
        }
    }

    pub fn new_extension(&self, ext: &str) -> String {
        if !self.config.naming.normalize_ext {
            return ext.to_string();
        }
        let ext = ext.to_lowercase();
        self.config
            .naming
            .change_extensions
            .get(&ext)
            .cloned()
            .unwrap_or(ext)
    }
}

fn apply_offset(dt: NaiveDateTime, offset_seconds: i64) -> Option<NaiveDateTime> {
    TimeDelta::try_seconds(offset_seconds).and_then(|d| dt.checked_add_signed(d))
}

/// `[prefix-][interfix-]stem[.ext]`
fn build_name(prefix: &str, interfix: &str, stem: &str, ext: &str) -> String {
    let mut name = String::new();
    if !prefix.is_empty() {
        name.push_str(prefix);
        name.push('-');
    }
    if !interfix.is_empty() {
        name.push_str(interfix);
        name.push('-');
    }
    name.push_str(stem);
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}
