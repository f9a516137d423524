//! Typed view over the YAML metadata block of an article.
//!
//! Authors write metadata by hand, so every accessor here is forgiving: a
//! malformed value resolves to a documented default and reports a warning for
//! the caller to log. The one exception is the draft flag, which must be
//! present so that an article never goes public by accident.

use std::collections::BTreeMap;

use serde_yaml::Value as YamlValue;
use thiserror::Error;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, format_description::FormatItem,
    macros::format_description,
};

pub const KEY_TITLE: &str = "Title";
pub const KEY_AUTHOR: &str = "Author";
pub const KEY_SUMMARY: &str = "Summary";
pub const KEY_TAGS: &str = "Tags";
pub const KEY_DATE: &str = "Date";
pub const KEY_IMAGE: &str = "Image";
pub const KEY_LAYOUT: &str = "Layout";
pub const KEY_DRAFT: &str = "Draft";
pub const KEY_NOSTR_URL: &str = "NostrUrl";

const DATE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata block is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("metadata block must be a mapping of keys to values")]
    NotAMapping,
    #[error("metadata has no `Draft` entry")]
    MissingDraft,
}

/// A metadata value with the YAML scalar types preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// Scalar rendering used by the plain text fields. Collections have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            MetaValue::Text(text) => Some(text.clone()),
            MetaValue::Bool(flag) => Some(flag.to_string()),
            MetaValue::Integer(number) => Some(number.to_string()),
            MetaValue::Float(number) => Some(number.to_string()),
            MetaValue::Null | MetaValue::List(_) | MetaValue::Map(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "boolean",
            MetaValue::Integer(_) => "integer",
            MetaValue::Float(_) => "float",
            MetaValue::Text(_) => "string",
            MetaValue::List(_) => "list",
            MetaValue::Map(_) => "map",
        }
    }
}

impl From<YamlValue> for MetaValue {
    fn from(value: YamlValue) -> Self {
        match value {
            YamlValue::Null => MetaValue::Null,
            YamlValue::Bool(flag) => MetaValue::Bool(flag),
            YamlValue::Number(number) => match number.as_i64() {
                Some(integer) => MetaValue::Integer(integer),
                None => MetaValue::Float(number.as_f64().unwrap_or_default()),
            },
            YamlValue::String(text) => MetaValue::Text(text),
            YamlValue::Sequence(items) => {
                MetaValue::List(items.into_iter().map(MetaValue::from).collect())
            }
            YamlValue::Mapping(mapping) => MetaValue::Map(
                mapping
                    .into_iter()
                    .filter_map(|(key, value)| yaml_key(key).map(|key| (key, value.into())))
                    .collect(),
            ),
            YamlValue::Tagged(tagged) => MetaValue::from(tagged.value),
        }
    }
}

fn yaml_key(key: YamlValue) -> Option<String> {
    match key {
        YamlValue::String(text) => Some(text),
        YamlValue::Bool(flag) => Some(flag.to_string()),
        YamlValue::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// A value resolved with a fallback, plus the reason when the fallback was used.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Resolved<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    fn fallback(value: T, warning: impl Into<String>) -> Self {
        Self {
            value,
            warning: Some(warning.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, MetaValue>,
}

impl Metadata {
    /// Parse a YAML metadata block. An empty block yields empty metadata.
    pub fn parse(yaml: &str) -> Result<Self, MetadataError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        match MetaValue::from(serde_yaml::from_str::<YamlValue>(yaml)?) {
            MetaValue::Map(entries) => Ok(Self { entries }),
            MetaValue::Null => Ok(Self::default()),
            _ => Err(MetadataError::NotAMapping),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// Textual value of a field; missing or structured values read as empty.
    pub fn text(&self, key: &str) -> String {
        self.get(key)
            .and_then(MetaValue::as_text)
            .unwrap_or_default()
    }

    /// Resolve the draft flag. Anything that is not a clear boolean counts as a draft.
    pub fn draft(&self) -> Result<Resolved<bool>, MetadataError> {
        match self.get(KEY_DRAFT) {
            None => Err(MetadataError::MissingDraft),
            Some(MetaValue::Bool(flag)) => Ok(Resolved::clean(*flag)),
            Some(MetaValue::Text(text)) => match parse_bool(text.trim()) {
                Some(flag) => Ok(Resolved::clean(flag)),
                None => Ok(Resolved::fallback(
                    true,
                    format!("draft value `{text}` is not a boolean, treating article as draft"),
                )),
            },
            Some(other) => Ok(Resolved::fallback(
                true,
                format!(
                    "draft value has unsupported type {}, treating article as draft",
                    other.kind()
                ),
            )),
        }
    }

    /// Resolve the publication date, falling back to `now` when absent or unparsable.
    pub fn publish_date(&self, now: OffsetDateTime) -> Resolved<OffsetDateTime> {
        let raw = self.text(KEY_DATE);
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Resolved::fallback(now, "no publication date, using current time");
        }
        match parse_publish_date(trimmed) {
            Some(date) => Resolved::clean(date),
            None => Resolved::fallback(
                now,
                format!(
                    "publication date `{trimmed}` is not `YYYY-MM-DD [HH:MM]`, using current time"
                ),
            ),
        }
    }

    /// Resolve the tag list, keeping only string entries in their original order.
    pub fn tags(&self) -> Resolved<Vec<String>> {
        match self.get(KEY_TAGS) {
            None | Some(MetaValue::Null) => Resolved::clean(Vec::new()),
            Some(MetaValue::List(items)) => {
                let mut tags = Vec::with_capacity(items.len());
                let mut skipped = Vec::new();
                for item in items {
                    match item {
                        MetaValue::Text(tag) => tags.push(tag.clone()),
                        other => skipped.push(other.kind()),
                    }
                }
                if skipped.is_empty() {
                    Resolved::clean(tags)
                } else {
                    Resolved::fallback(
                        tags,
                        format!("skipped non-string tags: {}", skipped.join(", ")),
                    )
                }
            }
            Some(other) => Resolved::fallback(
                Vec::new(),
                format!("tags must be a list, found {}", other.kind()),
            ),
        }
    }

    /// Image reference with site-relative paths made absolute.
    pub fn image(&self, site_url: &str) -> String {
        let image = self.text(KEY_IMAGE);
        if image.starts_with('/') {
            format!("{}{image}", site_url.trim_end_matches('/'))
        } else {
            image
        }
    }
}

/// Boolean literal rules shared by the draft flag and the publish marker.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`, both read as UTC.
pub fn parse_publish_date(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(moment) = PrimitiveDateTime::parse(raw, DATE_TIME_FORMAT) {
        return Some(moment.assume_utc());
    }
    Date::parse(raw, DATE_FORMAT)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Render `value` as a YAML scalar for a `Key: value` line.
///
/// Plain text, booleans and numbers are written verbatim so hand edits stay
/// readable; anything YAML would read differently is emitted quoted.
pub fn render_scalar(value: &str) -> String {
    let verbatim = !value.contains('\n')
        && match serde_yaml::from_str::<YamlValue>(value) {
            Ok(YamlValue::Bool(_)) | Ok(YamlValue::Number(_)) => true,
            Ok(YamlValue::String(parsed)) => parsed == value,
            _ => false,
        };
    if verbatim {
        return value.to_string();
    }
    serde_json::to_string(value).unwrap_or_else(|_| format!("'{}'", value.replace('\'', "''")))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2030-06-15 12:00 UTC);

    #[test]
    fn parses_typed_fields() {
        let meta = Metadata::parse(
            "Title: Hello\nAuthor: ana\nDraft: false\nDate: 2024-01-01\nTags:\n  - a\n  - b\n",
        )
        .expect("metadata");

        assert_eq!(meta.text(KEY_TITLE), "Hello");
        assert_eq!(meta.text(KEY_AUTHOR), "ana");
        assert!(!meta.draft().expect("draft").value);
        assert_eq!(
            meta.publish_date(NOW).value,
            datetime!(2024-01-01 0:00 UTC)
        );
        assert_eq!(meta.tags().value, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_draft_is_an_error() {
        let meta = Metadata::parse("Title: Hello\n").expect("metadata");
        assert!(matches!(meta.draft(), Err(MetadataError::MissingDraft)));
    }

    #[test]
    fn string_drafts_follow_boolean_literals() {
        for (raw, expected) in [("\"false\"", false), ("\"F\"", false), ("\"1\"", true)] {
            let meta = Metadata::parse(&format!("Draft: {raw}\n")).expect("metadata");
            let draft = meta.draft().expect("draft");
            assert_eq!(draft.value, expected, "literal {raw}");
            assert!(draft.warning.is_none());
        }
    }

    #[test]
    fn ambiguous_drafts_stay_private() {
        let meta = Metadata::parse("Draft: maybe\n").expect("metadata");
        let draft = meta.draft().expect("draft");
        assert!(draft.value);
        assert!(draft.warning.is_some());

        let meta = Metadata::parse("Draft: 3\n").expect("metadata");
        assert!(meta.draft().expect("draft").value);

        let meta = Metadata::parse("Draft: [false]\n").expect("metadata");
        assert!(meta.draft().expect("draft").value);
    }

    #[test]
    fn date_accepts_time_of_day() {
        let meta = Metadata::parse("Date: 2024-03-09 17:45\n").expect("metadata");
        let date = meta.publish_date(NOW);
        assert_eq!(date.value, datetime!(2024-03-09 17:45 UTC));
        assert!(date.warning.is_none());
    }

    #[test]
    fn bad_or_missing_dates_fall_back_to_now() {
        let meta = Metadata::parse("Date: next tuesday\n").expect("metadata");
        let date = meta.publish_date(NOW);
        assert_eq!(date.value, NOW);
        assert!(date.warning.is_some());

        let empty = Metadata::default().publish_date(NOW);
        assert_eq!(empty.value, NOW);
        assert!(empty.warning.is_some());
    }

    #[test]
    fn non_string_tags_are_skipped_in_order() {
        let meta = Metadata::parse("Tags: [rust, 7, web, true, rust]\n").expect("metadata");
        let tags = meta.tags();
        assert_eq!(tags.value, vec!["rust", "web", "rust"]);
        assert!(tags.warning.is_some());
    }

    #[test]
    fn text_fields_stringify_scalars() {
        let meta = Metadata::parse("Title: 2024\nSummary: true\nLayout: [x]\n").expect("metadata");
        assert_eq!(meta.text(KEY_TITLE), "2024");
        assert_eq!(meta.text(KEY_SUMMARY), "true");
        assert_eq!(meta.text(KEY_LAYOUT), "");
        assert_eq!(meta.text(KEY_NOSTR_URL), "");
    }

    #[test]
    fn rooted_images_get_the_site_prefix() {
        let meta = Metadata::parse("Image: /static/cover.png\n").expect("metadata");
        assert_eq!(
            meta.image("https://blog.example/"),
            "https://blog.example/static/cover.png"
        );

        let meta = Metadata::parse("Image: https://cdn.example/cover.png\n").expect("metadata");
        assert_eq!(
            meta.image("https://blog.example"),
            "https://cdn.example/cover.png"
        );
    }

    #[test]
    fn non_mapping_blocks_are_rejected() {
        assert!(matches!(
            Metadata::parse("- one\n- two\n"),
            Err(MetadataError::NotAMapping)
        ));
        assert!(Metadata::parse("").expect("empty").get(KEY_DRAFT).is_none());
    }

    #[test]
    fn scalars_are_quoted_only_when_needed() {
        assert_eq!(render_scalar("false"), "false");
        assert_eq!(render_scalar("42"), "42");
        assert_eq!(
            render_scalar("https://habla.news/a/naddr1xyz"),
            "https://habla.news/a/naddr1xyz"
        );
        assert_eq!(render_scalar("a: b"), "\"a: b\"");
        assert_eq!(render_scalar("tagged #here"), "\"tagged #here\"");
        assert_eq!(render_scalar(""), "\"\"");

        let parsed =
            Metadata::parse(&format!("Title: {}\n", render_scalar("a: b"))).expect("yaml");
        assert_eq!(parsed.text(KEY_TITLE), "a: b");
    }
}
