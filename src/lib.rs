//! # exifsort
//!
//! Sort photos and videos into date-based folders using the creation date stored in
//! their EXIF/XMP/QuickTime metadata, read with [ExifTool](https://exiftool.org/).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exifsort::config::Config;
//! use exifsort::item::Planner;
//! use exifsort::metadata::ExifTool;
//! use exifsort::pipeline::{analyze_files, collect_files, execute};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.output.dry_run = true;
//!     config.validate()?;
//!
//!     let dir = Path::new("./DCIM");
//!     let reader = ExifTool::new(&config.metadata.exiftool, &config.metadata.date_tags);
//!     reader.version().await?; // fails if exiftool is not installed
//!
//!     let planner = Planner::new(&config, dir)?;
//!     let files = collect_files(dir, &config)?;
//!     let mut items = analyze_files(&files, &reader, &planner).await;
//!
//!     let summary = execute(&mut items, &config);
//!     for item in &items {
//!         println!("{} -> {:?} ({})", item.name, item.target, item.status);
//!     }
//!     println!("{} file(s) would be moved", summary.planned);
//!     Ok(())
//! }
//! ```
//!
//! ## Default layout
//!
//! | Input | Creation date | Result |
//! |-------|---------------|--------|
//! | `IMG_0001.JPEG` | 2024-01-15 14:30:45 | `20240115/20240115-143045-IMG_0001.jpg` |
//! | `IMG_0002.jpg` | 2024-01-16 02:10:00 | `20240115/20240116-021000-IMG_0002.jpg` (before the 04:00 day start) |
//! | `scan.jpg` | (none) | `_UNKNOWN/scan.jpg` |
//!
//! ## Modules
//!
//! - [`config`]: Configuration types and loading/saving
//! - [`template`]: Date templates for folder and file names
//! - [`metadata`]: Metadata reader trait and the ExifTool implementation
//! - [`item`]: Per-file record and destination planning
//! - [`pipeline`]: File collection, analysis and move execution

pub mod config;
pub mod item;
pub mod metadata;
pub mod pipeline;
pub mod template;
