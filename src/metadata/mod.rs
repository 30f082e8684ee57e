//! Creation-date metadata, read through an external tool.
//!
//! - [`MetadataReader`]: the seam between the pipeline and whatever produces metadata
//! - [`ExifTool`]: the production reader, one `exiftool` subprocess per file
//! - [`Metadata`]: the group-qualified tag map returned by a reader

mod exiftool;
mod record;

pub use exiftool::{ExifTool, parse_exiftool_json};
pub use record::{Metadata, parse_exif_date};

use anyhow::Result;
use std::path::Path;

/// Source of per-file metadata.
///
/// [`ExifTool`] is the only implementation shipped with the crate; tests plug in
/// canned readers to exercise the pipeline without the external binary.
///
/// # Example
///
/// ```rust,no_run
/// use exifsort::metadata::{ExifTool, MetadataReader};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let reader = ExifTool::new("exiftool", &["EXIF:DateTimeOriginal".to_string()]);
/// let metadata = reader.read(Path::new("IMG_0001.jpg")).await?;
/// println!("MIME type: {:?}", metadata.mime_type());
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait MetadataReader: Send + Sync {
    /// Display name of the reader (e.g. "ExifTool").
    fn name(&self) -> &str;
    /// Read the metadata of a single file.
    async fn read(&self, path: &Path) -> Result<Metadata>;
}
