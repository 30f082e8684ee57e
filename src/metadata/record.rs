use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Metadata of one file, keyed by group-qualified tag name (`EXIF:DateTimeOriginal`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    tags: Map<String, Value>,
}

impl Metadata {
    pub fn new(tags: Map<String, Value>) -> Self {
        Self { tags }
    }

    /// Build from `(tag, value)` string pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let tags = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self { tags }
    }

    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The first valid creation date among `date_tags`, in priority order.
    ///
    /// Tags holding something that is not a date (ExifTool reports missing QuickTime
    /// dates as `0000:00:00 00:00:00`) are skipped. Returns `Ok(None)` when none of the
    /// tags is present and an error when tags were present but none could be parsed.
    pub fn creation_date(&self, date_tags: &[String]) -> Result<Option<NaiveDateTime>> {
        let mut rejected = Vec::new();

        for tag in date_tags {
            let Some(Value::String(raw)) = self.tags.get(tag) else {
                continue;
            };
            match parse_exif_date(raw) {
                Some(dt) => {
                    log::trace!("Using {tag} = {raw}");
                    return Ok(Some(dt));
                }
                None => rejected.push(format!("{tag}='{raw}'")),
            }
        }

        if rejected.is_empty() {
            Ok(None)
        } else {
            bail!("Unparsable EXIF date: {}", rejected.join(", "))
        }
    }

    /// `File:MIMEType`, e.g. `image/jpeg` or `video/mp4`.
    pub fn mime_type(&self) -> Option<&str> {
        self.tags.get("File:MIMEType").and_then(Value::as_str)
    }
}

/// Parse an EXIF-style timestamp.
///
/// Accepts `YYYY:MM:DD HH:MM:SS` and `YYYY-MM-DD HH:MM:SS`; anything after the
/// seconds (sub-seconds, timezone offset) is ignored.
pub fn parse_exif_date(raw: &str) -> Option<NaiveDateTime> {
    let head = raw.trim().get(..19)?;
    NaiveDateTime::parse_from_str(head, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tags() -> Vec<String> {
        vec![
            "EXIF:DateTimeOriginal".to_string(),
            "EXIF:CreateDate".to_string(),
            "QuickTime:CreateDate".to_string(),
        ]
    }

    fn ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parse_exif_colon_format() {
        assert_eq!(
            parse_exif_date("2023:12:24 18:00:00"),
            Some(ymd_hms(2023, 12, 24, 18, 0, 0))
        );
    }

    #[test]
    fn parse_dashed_format() {
        assert_eq!(
            parse_exif_date("2020-01-01 09:30:15"),
            Some(ymd_hms(2020, 1, 1, 9, 30, 15))
        );
    }

    #[test]
    fn parse_ignores_subseconds_and_timezone() {
        assert_eq!(
            parse_exif_date("2024:01:15 14:30:45.123+02:00"),
            Some(ymd_hms(2024, 1, 15, 14, 30, 45))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_exif_date("0000:00:00 00:00:00"), None);
        assert_eq!(parse_exif_date("2024:01:15"), None);
        assert_eq!(parse_exif_date(""), None);
        assert_eq!(parse_exif_date("not a date at all!!"), None);
    }

    #[test]
    fn creation_date_priority() {
        let md = Metadata::from_pairs([
            ("EXIF:CreateDate", "2020:01:01 00:00:00"),
            ("EXIF:DateTimeOriginal", "2023:12:24 18:00:00"),
        ]);
        assert_eq!(
            md.creation_date(&tags()).unwrap(),
            Some(ymd_hms(2023, 12, 24, 18, 0, 0))
        );
    }

    #[test]
    fn creation_date_skips_zero_date() {
        let md = Metadata::from_pairs([
            ("EXIF:DateTimeOriginal", "0000:00:00 00:00:00"),
            ("QuickTime:CreateDate", "2022:06:01 10:00:00"),
        ]);
        assert_eq!(
            md.creation_date(&tags()).unwrap(),
            Some(ymd_hms(2022, 6, 1, 10, 0, 0))
        );
    }

    #[test]
    fn creation_date_missing() {
        let md = Metadata::from_pairs([("File:MIMEType", "image/jpeg")]);
        assert_eq!(md.creation_date(&tags()).unwrap(), None);
    }

    #[test]
    fn creation_date_unparsable_is_error() {
        let md = Metadata::from_pairs([("EXIF:DateTimeOriginal", "yesterday")]);
        let err = md.creation_date(&tags()).unwrap_err();
        assert!(err.to_string().contains("EXIF:DateTimeOriginal"));
    }

    #[test]
    fn mime_type() {
        let md = Metadata::from_pairs([("File:MIMEType", "video/mp4")]);
        assert_eq!(md.mime_type(), Some("video/mp4"));
        assert_eq!(Metadata::default().mime_type(), None);
    }
}
