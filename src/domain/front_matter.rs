//! Locating and editing the `---` delimited metadata block at the top of a source file.

const DELIMITER: &str = "---";

/// Source text split into its metadata block and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSource<'a> {
    /// Raw YAML between the delimiters, when the file opens with a complete block.
    pub metadata: Option<&'a str>,
    pub body: &'a str,
}

/// Split a source file. Without an opening and closing delimiter the whole text is body.
pub fn split(raw: &str) -> SplitSource<'_> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(after_open) = strip_delimiter_line(text) else {
        return SplitSource {
            metadata: None,
            body: raw,
        };
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return SplitSource {
                metadata: Some(&after_open[..offset]),
                body: &after_open[offset + line.len()..],
            };
        }
        offset += line.len();
    }

    SplitSource {
        metadata: None,
        body: raw,
    }
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    let line_end = rest.find('\n').map(|idx| idx + 1).unwrap_or(rest.len());
    if rest[..line_end].trim().is_empty() {
        Some(&rest[line_end..])
    } else {
        None
    }
}

/// Set a top-level key in the metadata block, leaving every other line untouched.
///
/// `rendered_value` must already be valid YAML for a single scalar. An existing
/// entry is replaced together with any indented continuation lines; a missing
/// entry is appended at the end of the block. A file without a block gains one.
pub fn set_field(raw: &str, key: &str, rendered_value: &str) -> String {
    let entry = format!("{key}: {rendered_value}\n");
    let source = split(raw);
    let Some(metadata) = source.metadata else {
        return format!("{DELIMITER}\n{entry}{DELIMITER}\n{raw}");
    };

    let mut block = String::with_capacity(metadata.len() + entry.len());
    let mut replaced = false;
    let mut skipping_continuation = false;

    for line in metadata.split_inclusive('\n') {
        if skipping_continuation {
            if is_continuation(line) {
                continue;
            }
            skipping_continuation = false;
        }
        if !replaced && is_key_line(line, key) {
            block.push_str(&entry);
            replaced = true;
            skipping_continuation = true;
            continue;
        }
        block.push_str(line);
        if !line.ends_with('\n') {
            block.push('\n');
        }
    }

    if !replaced {
        block.push_str(&entry);
    }

    format!("{DELIMITER}\n{block}{DELIMITER}\n{}", source.body)
}

fn is_key_line(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .map(str::trim_start)
        .is_some_and(|rest| rest.starts_with(':'))
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t') || line.starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_metadata_from_body() {
        let raw = "---\nTitle: Hi\nDraft: false\n---\n# Heading\n\nText\n";
        let source = split(raw);
        assert_eq!(source.metadata, Some("Title: Hi\nDraft: false\n"));
        assert_eq!(source.body, "# Heading\n\nText\n");
    }

    #[test]
    fn files_without_a_block_are_all_body() {
        let raw = "# Just text\n---\nmore\n";
        let source = split(raw);
        assert_eq!(source.metadata, None);
        assert_eq!(source.body, raw);
    }

    #[test]
    fn unterminated_blocks_are_all_body() {
        let raw = "---\nTitle: Hi\n";
        assert_eq!(split(raw).metadata, None);
    }

    #[test]
    fn body_may_contain_thematic_breaks() {
        let raw = "---\nDraft: true\n---\nbefore\n\n---\n\nafter\n";
        let source = split(raw);
        assert_eq!(source.metadata, Some("Draft: true\n"));
        assert_eq!(source.body, "before\n\n---\n\nafter\n");
    }

    #[test]
    fn set_field_replaces_existing_entry() {
        let raw = "---\nTitle: Hi\nNostrUrl: \nDraft: false\n---\nBody\n";
        let updated = set_field(raw, "NostrUrl", "https://reader/a/naddr1");
        assert_eq!(
            updated,
            "---\nTitle: Hi\nNostrUrl: https://reader/a/naddr1\nDraft: false\n---\nBody\n"
        );
    }

    #[test]
    fn set_field_drops_continuation_lines() {
        let raw = "---\nTags:\n  - a\n  - b\nDraft: true\n---\nBody\n";
        let updated = set_field(raw, "Tags", "[]");
        assert_eq!(updated, "---\nTags: []\nDraft: true\n---\nBody\n");
    }

    #[test]
    fn set_field_appends_missing_entry() {
        let raw = "---\nTitle: Hi\n---\nBody\n";
        let updated = set_field(raw, "Draft", "false");
        assert_eq!(updated, "---\nTitle: Hi\nDraft: false\n---\nBody\n");
    }

    #[test]
    fn set_field_does_not_match_key_prefixes() {
        let raw = "---\nDrafted: yes\n---\n";
        let updated = set_field(raw, "Draft", "true");
        assert_eq!(updated, "---\nDrafted: yes\nDraft: true\n---\n");
    }

    #[test]
    fn set_field_creates_a_block() {
        let updated = set_field("Body\n", "Draft", "true");
        assert_eq!(updated, "---\nDraft: true\n---\nBody\n");
    }
}
