use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, ConflictPolicy};
use crate::item::{FileItem, FileStatus, Planner};
use crate::metadata::MetadataReader;

/// Give up looking for a free `name_N.ext` after this many attempts.
const MAX_UNIQUE_SUFFIX: u32 = 9999;

/// Overview of the source directory, shown before processing starts.
#[derive(Debug, Clone, Serialize)]
pub struct FolderInfo {
    pub path: PathBuf,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    /// Regular files directly inside the directory.
    pub file_count: usize,
    /// Files with one of the configured extensions.
    pub media_count: usize,
    /// Matching files per lowercase extension.
    pub media_types: BTreeMap<String, usize>,
}

impl FolderInfo {
    pub fn scan(dir: &Path, config: &Config) -> Result<Self> {
        let meta = std::fs::metadata(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        let mut info = Self {
            path: dir.to_path_buf(),
            created: meta.created().ok().map(DateTime::<Local>::from),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            file_count: 0,
            media_count: 0,
            media_types: BTreeMap::new(),
        };

        for path in list_files(dir)? {
            info.file_count += 1;
            if config.matches_extension(&path) {
                info.media_count += 1;
                let ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                *info.media_types.entry(ext).or_insert(0) += 1;
            }
        }

        Ok(info)
    }
}

/// Collect the media files to sort from `dir`.
///
/// Only regular files directly inside `dir` are considered (already sorted
/// subdirectories are left alone), filtered by the configured extensions and
/// ordered case-insensitively by name.
///
/// # Example
///
/// ```rust,no_run
/// use exifsort::config::Config;
/// use exifsort::pipeline::collect_files;
/// use std::path::Path;
///
/// let files = collect_files(Path::new("./DCIM"), &Config::default()).unwrap();
/// println!("Found {} media files", files.len());
/// ```
pub fn collect_files(dir: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| config.matches_extension(p))
        .collect())
}

/// All regular files directly inside `dir`, sorted by lowercase name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_key(|e| e.file_name().to_string_lossy().to_lowercase())
    {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable entry: {e}"),
        }
    }
    Ok(files)
}

/// Read the metadata of one file and work out where it goes.
///
/// Never fails: validation and metadata problems are recorded on the returned item.
pub async fn analyze_file(
    path: &Path,
    reader: &dyn MetadataReader,
    planner: &Planner<'_>,
) -> FileItem {
    let mut item = FileItem::new(path);
    if !item.validate() {
        log::debug!("{}: {}", item.name, item.error.as_deref().unwrap_or_default());
        return item;
    }

    let metadata = reader.read(&item.source).await;
    if let Err(ref e) = metadata {
        log::debug!("{} failed on {}: {e:#}", reader.name(), item.name);
    }
    planner.plan(&mut item, metadata);
    item
}

/// Analyze `paths` one after another.
pub async fn analyze_files(
    paths: &[PathBuf],
    reader: &dyn MetadataReader,
    planner: &Planner<'_>,
) -> Vec<FileItem> {
    analyze_files_with(paths, reader, planner, |_, _| {}).await
}

/// Like [`analyze_files`], calling `on_item` with the index and result of each file
/// as soon as it has been analyzed.
pub async fn analyze_files_with<F>(
    paths: &[PathBuf],
    reader: &dyn MetadataReader,
    planner: &Planner<'_>,
    mut on_item: F,
) -> Vec<FileItem>
where
    F: FnMut(usize, &FileItem),
{
    let mut items = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        let item = analyze_file(path, reader, planner).await;
        on_item(i, &item);
        items.push(item);
    }
    items
}

/// Outcome of [`execute`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Files that would be moved (dry run only).
    pub planned: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Directories created (or, in a dry run, that would be created).
    pub created_dirs: Vec<PathBuf>,
}

/// Move every pending item to its target, in order.
///
/// Collisions are checked against the filesystem and against targets claimed earlier
/// in the same run, so a dry run reports the same outcome a real run would produce.
/// In a dry run nothing on disk is touched and planned items stay
/// [`FileStatus::Pending`]. A failed move marks only that item; the run continues.
pub fn execute(items: &mut [FileItem], config: &Config) -> RunSummary {
    let dry_run = config.output.dry_run;
    let policy = config.files.on_conflict;

    let mut summary = RunSummary {
        dry_run,
        ..Default::default()
    };
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut vacated: HashSet<PathBuf> = HashSet::new();
    let mut known_dirs: HashSet<PathBuf> = HashSet::new();

    for item in items.iter_mut() {
        if !item.is_pending() {
            if item.status == FileStatus::Skipped {
                summary.skipped += 1;
            }
            continue;
        }

        let Some(mut target) = item.target.clone() else {
            item.skip("No destination could be computed.");
            summary.skipped += 1;
            continue;
        };

        if target == item.source {
            item.skip("Already in place.");
            summary.skipped += 1;
            continue;
        }

        let occupied =
            |p: &Path| claimed.contains(p) || (p.exists() && !vacated.contains(p));

        let mut overwrite = false;
        if occupied(&target) {
            match policy {
                ConflictPolicy::Skip => {
                    item.skip("Target file already exists.");
                    summary.skipped += 1;
                    continue;
                }
                ConflictPolicy::Overwrite if claimed.contains(&target) => {
                    item.skip("Another file in this run has the same target.");
                    summary.skipped += 1;
                    continue;
                }
                ConflictPolicy::Overwrite => {
                    log::debug!("Overwriting {}", target.display());
                    overwrite = true;
                }
                ConflictPolicy::Unique => match unique_target(&target, occupied) {
                    Some(free) => {
                        log::debug!("{} exists, using {}", target.display(), free.display());
                        target = free;
                        item.new_name = target
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        item.target = Some(target.clone());
                    }
                    None => {
                        item.skip("No free file name found for target.");
                        summary.skipped += 1;
                        continue;
                    }
                },
            }
        }

        if let Some(dir) = target.parent() {
            if !dir.exists() && known_dirs.insert(dir.to_path_buf()) {
                if !dry_run {
                    if let Err(e) = std::fs::create_dir_all(dir) {
                        item.fail(format!("Error creating directory {}: {e}", dir.display()));
                        summary.failed += 1;
                        known_dirs.remove(dir);
                        continue;
                    }
                    log::debug!("Created directory {}", dir.display());
                }
                summary.created_dirs.push(dir.to_path_buf());
            }
        }

        if dry_run {
            summary.planned += 1;
        } else {
            if let Err(e) = move_file(&item.source, &target, overwrite) {
                item.fail(format!("Error moving file: {e}"));
                summary.failed += 1;
                continue;
            }
            item.status = FileStatus::Moved;
            summary.moved += 1;
        }

        vacated.insert(item.source.clone());
        claimed.insert(target);
    }

    summary
}

/// The first `stem_N.ext` next to `target` for which `occupied` is false.
fn unique_target(target: &Path, occupied: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    let parent = target.parent()?;
    let stem = target.file_stem()?.to_string_lossy();
    let ext = target.extension().map(|e| e.to_string_lossy());

    (1..=MAX_UNIQUE_SUFFIX)
        .map(|n| match &ext {
            Some(ext) => parent.join(format!("{stem}_{n}.{ext}")),
            None => parent.join(format!("{stem}_{n}")),
        })
        .find(|candidate| !occupied(candidate))
}

fn move_file(from: &Path, to: &Path, overwrite: bool) -> std::io::Result<()> {
    // rename() replaces the destination on Unix but not on Windows.
    if overwrite && cfg!(windows) && to.exists() {
        std::fs::remove_file(to)?;
    }
    std::fs::rename(from, to)
}
