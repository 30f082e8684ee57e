use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use exifsort::config::{Config, ConflictPolicy};
use exifsort::item::{FileItem, FileStatus, Planner};
use exifsort::metadata::ExifTool;
use exifsort::pipeline::{self, FolderInfo, RunSummary};
use exifsort::template::{TEMPLATE_CATALOG, Template, TemplateKind};

#[derive(Parser, Debug)]
#[command(
    name = "exifsort",
    version,
    about = "Organize media files into date-based folders by reading their EXIF creation date",
    long_about = "Organize media files into date-based folders by reading their EXIF creation date.\n\
                  Requires the ExifTool command-line tool (https://exiftool.org/).",
    after_help = "Example: exifsort -o 3600 --fallback-folder UNSORTED ~/Pictures/import"
)]
struct Cli {
    /// Directory to organize (default: current working directory)
    #[arg(value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short = 'C', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Template for directory names, e.g. YYYYMMDD or YYYY/MM
    #[arg(short = 'd', long, value_name = "TEMPLATE")]
    directory_template: Option<String>,

    /// Template for the file name prefix, e.g. YYYYMMDD-HHMMSS
    #[arg(short = 'f', long, value_name = "TEMPLATE")]
    file_template: Option<String>,

    /// Text to insert between timestamp prefix and original filename
    #[arg(short = 'i', long, value_name = "TEXT")]
    interfix: Option<String>,

    /// File extensions to process
    #[arg(short = 'e', long, value_name = "EXT", num_args = 1.., value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Folder name for files without EXIF date
    #[arg(short = 'F', long, value_name = "FOLDER")]
    fallback_folder: Option<String>,

    /// Do not move files without date to the fallback folder
    #[arg(short = 's', long)]
    skip_fallback: bool,

    /// Time offset in seconds to apply to EXIF dates
    #[arg(short = 'o', long, value_name = "SECONDS", allow_hyphen_values = true)]
    offset: Option<i64>,

    /// Time when the new day starts; earlier files go to the previous day's folder
    #[arg(short = 'n', long = "new-day", value_name = "HH:MM:SS")]
    new_day: Option<String>,

    /// Keep extensions as they are: no lowercasing and no mapping such as jpeg -> jpg
    #[arg(short = 'N', long)]
    no_normalize: bool,

    /// Do not add timestamp prefix to filenames
    #[arg(short = 'p', long)]
    no_prefix: bool,

    /// Rename in place (do not move files into subdirectories)
    #[arg(short = 'r', long)]
    rename: bool,

    /// Overwrite existing files during move/rename
    #[arg(short = 'O', long, conflicts_with = "unique")]
    overwrite: bool,

    /// Add a numeric suffix instead of skipping when the target exists
    #[arg(short = 'u', long)]
    unique: bool,

    /// Test mode: show what would be done without making changes
    #[arg(short = 't', long = "test", visible_alias = "dry-run")]
    test: bool,

    /// Check mode: validate files and report issues without moving them
    #[arg(short = 'c', long)]
    check: bool,

    /// Show available directory and file templates and exit
    #[arg(short = 'T', long)]
    templates: bool,

    /// Show the effective settings
    #[arg(short = 'S', long)]
    settings: bool,

    /// Show detailed information about each file
    #[arg(short = 'D', long)]
    files_details: bool,

    /// Show files with errors
    #[arg(short = 'E', long)]
    show_errors: bool,

    /// Quiet mode (suppress non-error messages)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Assume 'yes' to all prompts
    #[arg(short, long)]
    yes: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// ExifTool executable to use
    #[arg(long, value_name = "PATH")]
    exiftool: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Handle --templates
    if cli.templates {
        print_templates();
        return Ok(());
    }

    // Load config and apply CLI overrides
    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.normalize_extensions();
    config.validate()?;
    let config = config;

    // ExifTool is required for everything below
    let reader = ExifTool::new(&config.metadata.exiftool, &config.metadata.date_tags);
    let exiftool_version = reader.version().await.with_context(|| {
        format!(
            "ExifTool command-line tool is not installed or not in PATH ('{}'). \
             Download it from https://exiftool.org/",
            reader.binary()
        )
    })?;
    log::debug!("Using ExifTool {exiftool_version}");

    let source_dir = resolve_source_dir(cli.directory.as_deref())?;

    // With --json, stdout is reserved for the report
    let console = show_console(&cli);

    if console {
        print_header(&config, &cli);
    }
    if cli.settings && !cli.json {
        print_settings(&config, &source_dir)?;
    }

    let folder = FolderInfo::scan(&source_dir, &config)?;
    if console {
        print_folder_info(&folder, cli.verbose);
    }

    let files = pipeline::collect_files(&source_dir, &config)?;
    if files.is_empty() {
        log::info!("No matching media files found. Exiting.");
        return finish(&cli, &[], None);
    }

    // Analyze every file, one ExifTool call at a time
    let planner = Planner::new(&config, &source_dir)?;
    let total = files.len();

    log::info!("Analyzing {total} file(s)...");
    let mut items = pipeline::analyze_files_with(&files, &reader, &planner, |i, item| {
        log::info!(
            "[{}/{}] {} ({}%)",
            i + 1,
            total,
            item.name,
            (i + 1) * 100 / total
        );
        if cli.files_details && console {
            print_file_details(item);
        }
    })
    .await;

    let valid = items.iter().filter(|i| i.is_pending()).count();
    if console {
        print_files_summary(&items, valid);
    }
    if console
        && (cli.verbose || cli.show_errors || cli.check)
        && items.iter().any(FileItem::has_issue)
    {
        print_file_errors(&items);
    }

    if valid == 0 {
        log::info!("No valid media files to process. Exiting.");
        return finish(&cli, &items, None);
    }

    // Check mode predicts conflicts with a dry run and stops there
    if cli.check {
        let summary = pipeline::execute(&mut items, &config);
        if console {
            print_check_report(&items, &summary);
        }
        return finish(&cli, &items, Some(&summary));
    }

    if !config.output.dry_run && !cli.yes && !confirm(valid)? {
        log::info!("Operation cancelled by user.");
        return finish(&cli, &items, None);
    }

    let summary = pipeline::execute(&mut items, &config);

    if console {
        print_results(&items, &config, cli.verbose);
        print_summary(&summary, start);
        if cli.verbose || cli.show_errors {
            print_run_issues(&items);
        }
    }
    for item in items.iter().filter(|i| i.status == FileStatus::Error) {
        log::error!(
            "{}: {}",
            item.name,
            item.error.as_deref().unwrap_or("unknown error")
        );
    }

    finish(&cli, &items, Some(&summary))
}

/// Apply command line flags on top of the loaded config.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(ref t) = cli.directory_template {
        config.naming.directory_template = t.clone();
    }
    if let Some(ref t) = cli.file_template {
        config.naming.file_template = t.clone();
    }
    if let Some(ref interfix) = cli.interfix {
        config.naming.interfix = interfix.clone();
    }
    if let Some(ref extensions) = cli.extensions {
        config.files.extensions = extensions.clone();
    }
    if let Some(ref folder) = cli.fallback_folder {
        config.files.fallback_folder = folder.clone();
    }
    if cli.skip_fallback {
        config.files.use_fallback_folder = false;
    }
    if let Some(offset) = cli.offset {
        config.dates.offset_seconds = offset;
    }
    if let Some(ref new_day) = cli.new_day {
        config.dates.day_starts = new_day.clone();
    }
    if cli.no_normalize {
        config.naming.normalize_ext = false;
    }
    if cli.no_prefix {
        config.naming.use_prefix = false;
    }
    if cli.rename {
        config.naming.use_subdirs = false;
    }
    if cli.overwrite {
        config.files.on_conflict = ConflictPolicy::Overwrite;
    }
    if cli.unique {
        config.files.on_conflict = ConflictPolicy::Unique;
    }
    if cli.test || cli.check {
        config.output.dry_run = true;
    }
    if let Some(ref exiftool) = cli.exiftool {
        config.metadata.exiftool = exiftool.clone();
    }
}

fn resolve_source_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let dir = std::path::absolute(&dir)
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    if !dir.is_dir() {
        bail!(
            "The specified directory '{}' does not exist or is not a directory.",
            dir.display()
        );
    }
    let meta = std::fs::metadata(&dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    if meta.permissions().readonly() {
        bail!("The specified directory '{}' is not writable.", dir.display());
    }
    Ok(dir)
}

/// Ask before touching any files. EOF on stdin counts as "no".
///
/// The prompt goes to stderr so it never mixes with a JSON report on stdout.
fn confirm(count: usize) -> Result<bool> {
    eprint!("{YELLOW}Do you want to continue with {count} files? (yes/No): {RESET}");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Human-readable sections go to stdout unless `--quiet` or `--json`.
fn show_console(cli: &Cli) -> bool {
    !cli.quiet && !cli.json
}

fn report(items: &[FileItem], summary: Option<&RunSummary>) -> serde_json::Value {
    serde_json::json!({
        "files": items,
        "summary": summary,
    })
}

/// Emit the JSON report if requested.
fn finish(cli: &Cli, items: &[FileItem], summary: Option<&RunSummary>) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report(items, summary))?);
    }
    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

const INDENT: &str = "    ";

fn status(on: bool) -> String {
    if on {
        format!("{GREEN}ON{RESET}")
    } else {
        format!("{RED}OFF{RESET}")
    }
}

/// `FileName.Ext → YYYYMMDD/YYYYMMDD-HHMMSS-filename.ext`
fn schema(config: &Config) -> String {
    let original = "FileName.Ext";
    let folder = if config.naming.use_subdirs {
        format!("{CYAN}{}{RESET}/", config.naming.directory_template)
    } else {
        String::new()
    };
    let mut file = if config.naming.normalize_ext {
        original.to_lowercase()
    } else {
        original.to_string()
    };
    if config.naming.use_prefix {
        let sep = if config.naming.interfix.is_empty() {
            "-".to_string()
        } else {
            format!("-{}-", config.naming.interfix)
        };
        file = format!("{CYAN}{}{RESET}{sep}{file}", config.naming.file_template);
    } else if !config.naming.interfix.is_empty() {
        file = format!("{}-{file}", config.naming.interfix);
    }
    format!("{original} {YELLOW}→{RESET} {folder}{file}")
}

fn print_header(config: &Config, cli: &Cli) {
    let verbose = cli.verbose;
    println!(
        "{GREEN}{BOLD}exifsort{RESET} v{}",
        env!("CARGO_PKG_VERSION")
    );
    println!("{YELLOW}Schema:{RESET}");
    println!("{INDENT}{}", schema(config));

    println!("{YELLOW}Settings:{RESET}");
    if verbose || config.output.dry_run {
        println!("{INDENT}Test mode: {}", status(config.output.dry_run));
    }
    if cli.check {
        println!("{INDENT}Check mode: {}", status(true));
    }
    println!(
        "{INDENT}Include extensions: {CYAN}{}{RESET}",
        config.files.extensions.join(", ")
    );
    if verbose || !config.naming.use_subdirs {
        println!(
            "{INDENT}Process to subdirectories: {}",
            status(config.naming.use_subdirs)
        );
    }
    if verbose || config.dates.day_starts != "00:00:00" {
        println!(
            "{INDENT}Day starts at: {CYAN}{}{RESET}",
            config.dates.day_starts
        );
    }
    if verbose || config.files.on_conflict != ConflictPolicy::Skip {
        println!(
            "{INDENT}Existing files: {CYAN}{}{RESET}",
            config.files.on_conflict
        );
    }
    if verbose || !config.naming.normalize_ext {
        println!(
            "{INDENT}Normalize extensions: {}",
            status(config.naming.normalize_ext)
        );
    }
    if verbose || !config.naming.use_prefix {
        println!(
            "{INDENT}Add prefix to filenames: {}",
            status(config.naming.use_prefix)
        );
    }
    if verbose || !config.files.use_fallback_folder {
        println!(
            "{INDENT}Use fallback folder: {}",
            status(config.files.use_fallback_folder)
        );
    }
    if config.files.use_fallback_folder {
        println!(
            "{INDENT}Fallback folder: {CYAN}{}{RESET}",
            config.files.fallback_folder
        );
    }
    if verbose || config.dates.offset_seconds != 0 {
        println!(
            "{INDENT}Time offset: {CYAN}{} seconds{RESET}",
            config.dates.offset_seconds
        );
    }
}

fn print_settings(config: &Config, source_dir: &Path) -> Result<()> {
    println!("{YELLOW}Raw settings:{RESET}");
    println!("{INDENT}source_dir: {CYAN}{}{RESET}", source_dir.display());
    let json = serde_json::to_string_pretty(config)?;
    for line in json.lines() {
        println!("{INDENT}{line}");
    }
    Ok(())
}

fn print_templates() {
    let sample = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(14, 30, 45));
    let Some(sample) = sample else {
        return;
    };

    println!(
        "Tokens: YYYY year, YY short year, MM month (minutes after HH), DD day, HH hour, SS seconds"
    );
    println!("Sample date: {CYAN}{sample}{RESET}");

    for (kind, title) in [
        (TemplateKind::Directory, "Directory templates (-d):"),
        (TemplateKind::File, "File templates (-f):"),
    ] {
        println!();
        println!("{YELLOW}{title}{RESET}");
        for entry in TEMPLATE_CATALOG.iter().filter(|e| e.kind == kind) {
            let rendered = Template::parse(entry.template, kind)
                .map(|t| t.render(&sample))
                .unwrap_or_default();
            println!(
                "{INDENT}{:<22} {DIM}→{RESET} {CYAN}{:<22}{RESET} {DIM}{}{RESET}",
                entry.template, rendered, entry.description
            );
        }
    }
}

fn print_folder_info(info: &FolderInfo, verbose: bool) {
    println!("{YELLOW}Folder info:{RESET}");
    println!("{INDENT}Path: {CYAN}{}{RESET}", info.path.display());
    println!("{INDENT}Total files: {CYAN}{}{RESET}", info.file_count);
    if verbose {
        let types = info
            .media_types
            .iter()
            .map(|(ext, count)| format!("{CYAN}{count}{RESET} x {CYAN}{}{RESET}", ext.to_uppercase()))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{INDENT}Matching files: {CYAN}{}{RESET} ({types})", info.media_count);
        if let Some(created) = info.created {
            println!("{INDENT}Created: {CYAN}{}{RESET}", created.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(modified) = info.modified {
            println!("{INDENT}Modified: {CYAN}{}{RESET}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
    } else {
        println!("{INDENT}Matching files: {CYAN}{}{RESET}", info.media_count);
    }
}

fn print_file_details(item: &FileItem) {
    println!("{YELLOW}File:{RESET} {CYAN}{}{RESET}", item.name);
    let rows: Vec<(&str, Option<String>)> = vec![
        ("source", Some(item.source.display().to_string())),
        ("size", Some(item.size.to_string())),
        ("exif_date", item.exif_date.map(|d| d.to_string())),
        ("date_time", item.date_time.map(|d| d.to_string())),
        ("mime_type", item.mime_type.clone()),
        ("media_type", Some(item.media_type.clone())),
        ("subdir", item.subdir.as_ref().map(|s| s.display().to_string())),
        ("new_name", Some(item.new_name.clone()).filter(|s| !s.is_empty())),
        ("target", item.target.as_ref().map(|t| t.display().to_string())),
        ("status", Some(item.status.to_string())),
    ];
    for (key, value) in rows {
        if let Some(v) = value {
            println!("{INDENT}{:<12} {CYAN}{v}{RESET}", format!("{key}:"));
        }
    }
    if let Some(ref err) = item.error {
        println!("{INDENT}{:<12} {RED}{err}{RESET}", "error:");
    }
}

fn print_files_summary(items: &[FileItem], valid: usize) {
    println!("{YELLOW}Files summary:{RESET}");
    println!("{INDENT}Total files analyzed: {CYAN}{}{RESET}", items.len());
    println!("{INDENT}Valid files: {CYAN}{valid}{RESET}");
    println!("{INDENT}Invalid files: {CYAN}{}{RESET}", items.len() - valid);
}

fn print_file_errors(items: &[FileItem]) {
    let invalid: Vec<&FileItem> = items
        .iter()
        .filter(|i| matches!(i.status, FileStatus::Skipped | FileStatus::Error))
        .collect();
    if !invalid.is_empty() {
        println!("{YELLOW}Files not processed:{RESET}");
        for item in invalid {
            print_issue(item);
        }
    }

    let notes: Vec<&FileItem> = items
        .iter()
        .filter(|i| matches!(i.status, FileStatus::Pending | FileStatus::Moved) && i.error.is_some())
        .collect();
    if !notes.is_empty() {
        println!("{YELLOW}Files with errors:{RESET}");
        for item in notes {
            print_issue(item);
        }
    }
}

/// Items skipped or failed while moving (they all had a target).
fn print_run_issues(items: &[FileItem]) {
    let issues: Vec<&FileItem> = items
        .iter()
        .filter(|i| matches!(i.status, FileStatus::Skipped | FileStatus::Error))
        .filter(|i| i.target.is_some())
        .collect();
    if !issues.is_empty() {
        println!("{YELLOW}Files skipped or failed:{RESET}");
        for item in issues {
            print_issue(item);
        }
    }
}

fn print_issue(item: &FileItem) {
    println!(
        "{INDENT}{CYAN}{}{RESET}: {RED}{}{RESET}",
        item.name,
        item.error.as_deref().unwrap_or_default()
    );
}

fn print_check_report(items: &[FileItem], summary: &RunSummary) {
    let conflicts: Vec<&FileItem> = items
        .iter()
        .filter(|i| i.status == FileStatus::Skipped && i.target.is_some())
        .collect();

    println!("{YELLOW}Check:{RESET}");
    println!("{INDENT}Ready to move: {CYAN}{}{RESET}", summary.planned);
    println!("{INDENT}Would be skipped: {CYAN}{}{RESET}", summary.skipped);
    if !summary.created_dirs.is_empty() {
        println!(
            "{INDENT}Directories to create: {CYAN}{}{RESET}",
            summary.created_dirs.len()
        );
    }
    if !conflicts.is_empty() {
        println!("{YELLOW}Conflicts:{RESET}");
        for item in conflicts {
            print_issue(item);
        }
    }
    if summary.skipped == 0 && items.iter().all(|i| i.error.is_none()) {
        println!("{INDENT}{GREEN}No issues found.{RESET}");
    }
}

fn print_results(items: &[FileItem], config: &Config, verbose: bool) {
    let action = match (config.output.dry_run, config.naming.use_subdirs) {
        (true, true) => "Would move",
        (true, false) => "Would rename",
        (false, true) => "Moved",
        (false, false) => "Renamed",
    };
    println!("{YELLOW}{action}:{RESET}");

    let mut any = false;
    for item in items {
        let done = match item.status {
            FileStatus::Moved => true,
            FileStatus::Pending => config.output.dry_run,
            _ => false,
        };
        if !done {
            continue;
        }
        any = true;
        if !verbose && !config.output.dry_run {
            continue;
        }
        let date = match item.exif_date {
            Some(d) => format!("{CYAN}{d}{RESET}"),
            None => format!("{RED}EXIF data not found{RESET}"),
        };
        let subdir = item
            .subdir
            .as_ref()
            .map(|s| format!("{CYAN}{}{RESET}/", s.display()))
            .unwrap_or_default();
        println!(
            "{INDENT}{CYAN}{:<13}{RESET} ({date}) {YELLOW}→{RESET} {subdir}{CYAN}{}{RESET}",
            item.name, item.new_name
        );
    }

    if !any {
        println!("{INDENT}No files were processed.");
    } else if !verbose && !config.output.dry_run {
        println!("{INDENT}Done.");
    }
}

fn print_summary(summary: &RunSummary, start: Instant) {
    println!("{YELLOW}Summary:{RESET}");
    if summary.dry_run {
        println!("{INDENT}Test mode (no changes made).");
        println!("{INDENT}Files to process: {CYAN}{}{RESET}", summary.planned);
        println!("{INDENT}Files to skip: {CYAN}{}{RESET}", summary.skipped);
        println!(
            "{INDENT}Directories to create: {CYAN}{}{RESET}",
            summary.created_dirs.len()
        );
    } else {
        println!("{INDENT}Processed files: {CYAN}{}{RESET}", summary.moved);
        println!("{INDENT}Skipped files: {CYAN}{}{RESET}", summary.skipped);
        if summary.failed > 0 {
            println!("{INDENT}Failed files: {RED}{}{RESET}", summary.failed);
        }
        println!(
            "{INDENT}Directories created: {CYAN}{}{RESET}",
            summary.created_dirs.len()
        );
    }

    let elapsed = start.elapsed();
    let (value, unit) = if elapsed.as_millis() < 1000 {
        (elapsed.as_secs_f64() * 1000.0, "ms")
    } else {
        (elapsed.as_secs_f64(), "s")
    };
    println!("{INDENT}Completed in: {CYAN}{value:.2}{RESET} {unit}.");
}
