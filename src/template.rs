use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::fmt;

/// A single piece of a parsed date template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `YYYY`: four-digit year
    Year,
    /// `YY`: two-digit year
    ShortYear,
    /// `MM` before any hour token
    Month,
    /// `DD`
    Day,
    /// `HH`: 24-hour clock
    Hour,
    /// `MM` after an hour token
    Minute,
    /// `SS`
    Second,
    Literal(String),
}

/// Where a template is used. File templates must not produce path separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Directory,
    File,
}

/// A parsed date template such as `YYYY/MM` or `YYYYMMDD-HHMMSS`.
///
/// `MM` is ambiguous in these templates: it means month until an `HH` token has
/// appeared to its left, and minutes afterwards.
///
/// ```rust
/// use exifsort::template::{Template, TemplateKind};
/// use chrono::NaiveDate;
///
/// let dt = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(14, 30, 45).unwrap();
/// let t = Template::parse("YYYY-MM-DD_HH-MM-SS", TemplateKind::File).unwrap();
/// assert_eq!(t.render(&dt), "2024-01-15_14-30-45");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str, kind: TemplateKind) -> Result<Self> {
        if source.trim().is_empty() {
            bail!("Template must not be empty");
        }
        if kind == TemplateKind::File && source.contains(['/', '\\']) {
            bail!("File template '{source}' must not contain path separators");
        }
        if source.split(['/', '\\']).any(|part| part == ".." || part == ".") {
            bail!("Template '{source}' must not contain '.' or '..' components");
        }
        if source.starts_with(['/', '\\']) {
            bail!("Template '{source}' must be relative");
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut seen_hour = false;
        let mut rest = source;

        while !rest.is_empty() {
            let token = if rest.starts_with("YYYY") {
                Some((Segment::Year, 4))
            } else if rest.starts_with("YY") {
                Some((Segment::ShortYear, 2))
            } else if rest.starts_with("MM") {
                if seen_hour {
                    Some((Segment::Minute, 2))
                } else {
                    Some((Segment::Month, 2))
                }
            } else if rest.starts_with("DD") {
                Some((Segment::Day, 2))
            } else if rest.starts_with("HH") {
                seen_hour = true;
                Some((Segment::Hour, 2))
            } else if rest.starts_with("SS") {
                Some((Segment::Second, 2))
            } else {
                None
            };

            match token {
                Some((segment, len)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = &rest[len..];
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if segments.iter().all(|s| matches!(s, Segment::Literal(_))) {
            bail!("Template '{source}' contains no date tokens (YYYY, YY, MM, DD, HH, SS)");
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Substitute the date/time tokens for `dt`.
    pub fn render(&self, dt: &NaiveDateTime) -> String {
        let mut out = String::with_capacity(self.source.len() + 4);
        for segment in &self.segments {
            match segment {
                Segment::Year => out.push_str(&format!("{:04}", dt.year())),
                Segment::ShortYear => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
                Segment::Month => out.push_str(&format!("{:02}", dt.month())),
                Segment::Day => out.push_str(&format!("{:02}", dt.day())),
                Segment::Hour => out.push_str(&format!("{:02}", dt.hour())),
                Segment::Minute => out.push_str(&format!("{:02}", dt.minute())),
                Segment::Second => out.push_str(&format!("{:02}", dt.second())),
                Segment::Literal(s) => out.push_str(s),
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A named template shown by `exifsort --templates`.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub kind: TemplateKind,
    pub template: &'static str,
    pub description: &'static str,
}

/// Commonly used templates. Any combination of tokens is accepted; these are just examples.
pub const TEMPLATE_CATALOG: &[CatalogEntry] = &[
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYYMMDD", description: "one folder per day (default)" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY-MM-DD", description: "one folder per day, dashed" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY.MM.DD", description: "one folder per day, dotted" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY_MM_DD", description: "one folder per day, underscored" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY-MM", description: "one folder per month" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY/MM", description: "nested year / month" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY/MM/DD", description: "nested year / month / day" },
    CatalogEntry { kind: TemplateKind::Directory, template: "YYYY/YYYY-MM-DD", description: "year folder with dated day folders" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYYMMDD-HHMMSS", description: "date and time (default)" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYYMMDD_HHMMSS", description: "date and time, underscored" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYY-MM-DD-HH-MM-SS", description: "fully dashed" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYY-MM-DD_HH-MM-SS", description: "dashed date, dashed time" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYY.MM.DD.HH.MM.SS", description: "fully dotted" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYYMMDDHHMM", description: "no seconds" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYYMMDD", description: "date only" },
    CatalogEntry { kind: TemplateKind::File, template: "YYYY-MM-DD", description: "date only, dashed" },
    CatalogEntry { kind: TemplateKind::File, template: "HHMMSS", description: "time only" },
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 45)
            .unwrap()
    }

    fn render(template: &str, kind: TemplateKind) -> String {
        Template::parse(template, kind).unwrap().render(&dt())
    }

    // ── file prefixes ────────────────────────────────────────────────

    #[test]
    fn file_default() {
        assert_eq!(render("YYYYMMDD-HHMMSS", TemplateKind::File), "20240115-143045");
    }

    #[test]
    fn file_separators() {
        assert_eq!(render("YYYY-MM-DD-HH-MM-SS", TemplateKind::File), "2024-01-15-14-30-45");
        assert_eq!(render("YYYY.MM.DD.HH.MM.SS", TemplateKind::File), "2024.01.15.14.30.45");
        assert_eq!(render("YYYYMMDD_HHMMSS", TemplateKind::File), "20240115_143045");
        assert_eq!(render("YYYY-MM-DD_HH-MM-SS", TemplateKind::File), "2024-01-15_14-30-45");
    }

    #[test]
    fn file_partial() {
        assert_eq!(render("YYYYMMDD", TemplateKind::File), "20240115");
        assert_eq!(render("YYYY-MM-DD", TemplateKind::File), "2024-01-15");
        assert_eq!(render("HHMMSS", TemplateKind::File), "143045");
        assert_eq!(render("YYYYMMDDHHMM", TemplateKind::File), "202401151430");
    }

    #[test]
    fn short_year() {
        assert_eq!(render("YYMMDD", TemplateKind::File), "240115");
    }

    #[test]
    fn literal_text_kept() {
        assert_eq!(render("IMG YYYY", TemplateKind::File), "IMG 2024");
    }

    // ── directories ──────────────────────────────────────────────────

    #[test]
    fn directory_flat() {
        assert_eq!(render("YYYYMMDD", TemplateKind::Directory), "20240115");
        assert_eq!(render("YYYY-MM-DD", TemplateKind::Directory), "2024-01-15");
        assert_eq!(render("YYYY.MM.DD", TemplateKind::Directory), "2024.01.15");
        assert_eq!(render("YYYY_MM_DD", TemplateKind::Directory), "2024_01_15");
        assert_eq!(render("YYYY-MM", TemplateKind::Directory), "2024-01");
    }

    #[test]
    fn directory_nested() {
        assert_eq!(render("YYYY/MM/DD", TemplateKind::Directory), "2024/01/15");
        assert_eq!(render("YYYY/MM", TemplateKind::Directory), "2024/01");
    }

    // ── parse errors ─────────────────────────────────────────────────

    #[test]
    fn rejects_empty() {
        assert!(Template::parse("", TemplateKind::File).is_err());
        assert!(Template::parse("   ", TemplateKind::Directory).is_err());
    }

    #[test]
    fn rejects_no_tokens() {
        assert!(Template::parse("photos", TemplateKind::Directory).is_err());
    }

    #[test]
    fn rejects_separator_in_file_template() {
        assert!(Template::parse("YYYY/MM", TemplateKind::File).is_err());
        assert!(Template::parse("YYYY\\MM", TemplateKind::File).is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(Template::parse("../YYYY", TemplateKind::Directory).is_err());
        assert!(Template::parse("/YYYY", TemplateKind::Directory).is_err());
    }

    #[test]
    fn catalog_entries_parse() {
        for entry in TEMPLATE_CATALOG {
            assert!(
                Template::parse(entry.template, entry.kind).is_ok(),
                "catalog template {} should parse",
                entry.template
            );
        }
    }
}
