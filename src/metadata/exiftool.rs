use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{Metadata, MetadataReader};

/// Tag holding ExifTool's per-file error message when run with `-G`.
const ERROR_TAG: &str = "ExifTool:Error";
const WARNING_TAG: &str = "ExifTool:Warning";

/// Reads metadata by running the `exiftool` command-line tool, once per file.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: String,
    tag_args: Vec<String>,
}

impl ExifTool {
    /// `binary` is the executable name or path; `date_tags` are the group-qualified tags
    /// to request (`File:MIMEType` is always added).
    pub fn new(binary: impl Into<String>, date_tags: &[String]) -> Self {
        let mut tag_args: Vec<String> = date_tags.iter().map(|t| format!("-{t}")).collect();
        tag_args.push("-File:MIMEType".to_string());
        Self {
            binary: binary.into(),
            tag_args,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run `exiftool -ver`. An error here means the tool is missing or broken.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-ver")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run '{}'", self.binary))?;

        if !output.status.success() {
            bail!(
                "'{} -ver' exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait::async_trait]
impl MetadataReader for ExifTool {
    fn name(&self) -> &str {
        "ExifTool"
    }

    async fn read(&self, path: &Path) -> Result<Metadata> {
        let output = Command::new(&self.binary)
            .arg("-json")
            .arg("-G")
            .args(&self.tag_args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run '{}'", self.binary))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(Metadata::default());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ExifTool failed ({}): {}", output.status, stderr.trim());
        }

        parse_exiftool_json(&stdout)
    }
}

/// Parse the output of `exiftool -json -G` for a single file.
///
/// ExifTool reports per-file problems inside the JSON object rather than through the
/// exit status, so an `ExifTool:Error` entry is turned into an error here.
pub fn parse_exiftool_json(json: &str) -> Result<Metadata> {
    let value: Value = serde_json::from_str(json).context("Failed to parse ExifTool output")?;

    let object = match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => bail!("ExifTool returned no data"),
        other => other,
    };

    let Value::Object(tags) = object else {
        bail!("Unexpected ExifTool output: expected a JSON object");
    };

    if let Some(err) = tags.get(ERROR_TAG).and_then(Value::as_str) {
        bail!("ExifTool: {err}");
    }
    if let Some(warning) = tags.get(WARNING_TAG).and_then(Value::as_str) {
        log::debug!("ExifTool warning: {warning}");
    }

    Ok(Metadata::new(tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_args_include_mime_type() {
        let tool = ExifTool::new("exiftool", &["EXIF:DateTimeOriginal".to_string()]);
        assert_eq!(tool.tag_args, vec!["-EXIF:DateTimeOriginal", "-File:MIMEType"]);
        assert_eq!(tool.binary(), "exiftool");
    }

    #[test]
    fn parse_typical_output() {
        let json = r#"[{
            "SourceFile": "/photos/IMG_0001.JPG",
            "EXIF:DateTimeOriginal": "2024:01:15 14:30:45",
            "File:MIMEType": "image/jpeg"
        }]"#;
        let md = parse_exiftool_json(json).unwrap();
        assert_eq!(md.mime_type(), Some("image/jpeg"));
        assert!(md.get("EXIF:DateTimeOriginal").is_some());
    }

    #[test]
    fn parse_error_entry() {
        let json = r#"[{
            "SourceFile": "broken.jpg",
            "ExifTool:Error": "File format error"
        }]"#;
        let err = parse_exiftool_json(json).unwrap_err();
        assert!(err.to_string().contains("File format error"));
    }

    #[test]
    fn parse_warning_is_not_fatal() {
        let json = r#"[{
            "SourceFile": "odd.mov",
            "ExifTool:Warning": "Truncated atom",
            "QuickTime:CreateDate": "2021:07:04 20:15:00"
        }]"#;
        assert!(parse_exiftool_json(json).is_ok());
    }

    #[test]
    fn parse_rejects_empty_array_and_garbage() {
        assert!(parse_exiftool_json("[]").is_err());
        assert!(parse_exiftool_json("not json").is_err());
        assert!(parse_exiftool_json("[42]").is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let _guard = SPAWN_LOCK.lock().await;
        let tool = ExifTool::new("exiftool-does-not-exist-1b7f", &[]);
        assert!(tool.version().await.is_err());
    }

    // ── subprocess ───────────────────────────────────────────────────

    /// Writing an executable while another test forks can fail the exec with
    /// "text file busy", so tests that spawn processes take turns.
    static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    /// Write an executable shell script standing in for `exiftool`.
    #[cfg(unix)]
    fn fake_exiftool(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("exiftool");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_reports_tool_output() {
        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_exiftool(&dir, r#"[ "$1" = "-ver" ] && echo 12.76 && exit 0; exit 2"#);

        let tool = ExifTool::new(bin, &[]);
        assert_eq!(tool.version().await.unwrap(), "12.76");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn read_passes_tags_and_path() {
        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        // Echo the argument vector back as a tag so it can be inspected.
        let bin = fake_exiftool(
            &dir,
            r#"printf '[{"SourceFile":"x","Test:Args":"%s","File:MIMEType":"image/jpeg"}]\n' "$*""#,
        );

        let tool = ExifTool::new(bin, &["EXIF:DateTimeOriginal".to_string()]);
        let md = tool.read(Path::new("/photos/a.jpg")).await.unwrap();
        assert_eq!(md.mime_type(), Some("image/jpeg"));
        assert_eq!(
            md.get("Test:Args").and_then(Value::as_str),
            Some("-json -G -EXIF:DateTimeOriginal -File:MIMEType /photos/a.jpg")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn read_failure_without_output_is_an_error() {
        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_exiftool(&dir, "echo 'File not found' >&2; exit 1");

        let tool = ExifTool::new(bin, &[]);
        let err = tool.read(Path::new("missing.jpg")).await.unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn read_success_without_output_is_empty() {
        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_exiftool(&dir, "exit 0");

        let tool = ExifTool::new(bin, &[]);
        let md = tool.read(Path::new("empty.jpg")).await.unwrap();
        assert!(md.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn read_error_entry_is_an_error() {
        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        let bin = fake_exiftool(
            &dir,
            r#"echo '[{"SourceFile":"x","ExifTool:Error":"Unknown file type"}]'; exit 1"#,
        );

        let tool = ExifTool::new(bin, &[]);
        let err = tool.read(Path::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("Unknown file type"));
    }
}
