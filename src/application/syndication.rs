//! RSS, Atom and JSON Feed serialization of the persisted feed document.
//!
//! Rendering is a pure function of the document so handlers can build any
//! format from the one blob stored in the content index.

use serde::Serialize;
use thiserror::Error;
use time::{
    OffsetDateTime,
    format_description::well_known::{Rfc2822, Rfc3339},
};

use crate::application::feed::FeedDocument;

const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error("failed to encode JSON feed: {0}")]
    Json(#[from] serde_json::Error),
}

/// RSS 2.0 channel.
pub fn rss(feed: &FeedDocument) -> String {
    let mut items = String::new();
    for item in &feed.items {
        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description><![CDATA[{}]]></description>\n    </item>\n",
            xml_escape(&item.title),
            xml_escape(&item.link),
            xml_escape(&item.link),
            format_rfc2822(item.created),
            cdata_safe(&item.description),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    <managingEditor>{}</managingEditor>\n    <pubDate>{}</pubDate>\n{}  </channel>\n</rss>\n",
        xml_escape(&feed.title),
        xml_escape(&feed.link),
        xml_escape(&feed.description),
        xml_escape(&feed.author),
        format_rfc2822(feed.created),
        items
    )
}

/// Atom 1.0 feed.
pub fn atom(feed: &FeedDocument) -> String {
    let mut entries = String::new();
    for item in &feed.items {
        let updated = format_rfc3339(item.created);
        entries.push_str(&format!(
            "  <entry>\n    <title>{}</title>\n    <link href=\"{}\"/>\n    <id>{}</id>\n    <updated>{}</updated>\n    <published>{}</published>\n    <summary><![CDATA[{}]]></summary>\n  </entry>\n",
            xml_escape(&item.title),
            xml_escape(&item.link),
            xml_escape(&item.link),
            updated,
            updated,
            cdata_safe(&item.description),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n  <title>{}</title>\n  <id>{}</id>\n  <updated>{}</updated>\n  <subtitle>{}</subtitle>\n  <link href=\"{}\"/>\n  <author>\n    <name>{}</name>\n  </author>\n{}</feed>\n",
        xml_escape(&feed.title),
        xml_escape(&feed.link),
        format_rfc3339(feed.created),
        xml_escape(&feed.description),
        xml_escape(&feed.link),
        xml_escape(&feed.author),
        entries
    )
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    authors: Vec<JsonAuthor<'a>>,
    items: Vec<JsonItem<'a>>,
}

#[derive(Serialize)]
struct JsonAuthor<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct JsonItem<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    summary: &'a str,
    content_text: &'a str,
    date_published: String,
}

/// JSON Feed 1.1.
pub fn json_feed(feed: &FeedDocument) -> Result<String, SyndicationError> {
    let document = JsonFeed {
        version: JSON_FEED_VERSION,
        title: &feed.title,
        home_page_url: &feed.link,
        description: Some(feed.description.as_str()).filter(|text| !text.is_empty()),
        authors: vec![JsonAuthor { name: &feed.author }],
        items: feed
            .items
            .iter()
            .map(|item| JsonItem {
                id: &item.link,
                url: &item.link,
                title: &item.title,
                summary: &item.description,
                content_text: &item.description,
                date_published: format_rfc3339(item.created),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

fn format_rfc2822(moment: OffsetDateTime) -> String {
    moment
        .format(&Rfc2822)
        .unwrap_or_else(|_| moment.to_string())
}

fn format_rfc3339(moment: OffsetDateTime) -> String {
    moment
        .format(&Rfc3339)
        .unwrap_or_else(|_| moment.to_string())
}

fn cdata_safe(input: &str) -> String {
    input.replace("]]>", "]]]]><![CDATA[>")
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::feed::FeedItem;

    fn feed() -> FeedDocument {
        FeedDocument {
            title: "Tom & Jerry".to_string(),
            link: "https://blog.example/rss".to_string(),
            description: "Notes".to_string(),
            author: "Tom & Jerry".to_string(),
            created: datetime!(2024-01-02 0:00 UTC),
            items: vec![FeedItem {
                slug: "hello".to_string(),
                title: "Hello <World>".to_string(),
                link: "https://blog.example/p/hello".to_string(),
                description: "first post".to_string(),
                created: datetime!(2024-01-02 0:00 UTC),
            }],
        }
    }

    #[test]
    fn rss_escapes_titles_and_lists_items() {
        let xml = rss(&feed());
        assert!(xml.contains("<rss version=\"2.0\">"));
        assert!(xml.contains("<title>Tom &amp; Jerry</title>"));
        assert!(xml.contains("<title>Hello &lt;World&gt;</title>"));
        assert!(xml.contains("<link>https://blog.example/p/hello</link>"));
        assert!(xml.contains("<pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>"));
    }

    #[test]
    fn atom_uses_rfc3339_dates() {
        let xml = atom(&feed());
        assert!(xml.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(xml.contains("<updated>2024-01-02T00:00:00Z</updated>"));
        assert!(xml.contains("<link href=\"https://blog.example/p/hello\"/>"));
    }

    #[test]
    fn json_feed_declares_its_version() {
        let body = json_feed(&feed()).expect("json feed");
        let value: serde_json::Value = serde_json::from_str(&body).expect("valid json");
        assert_eq!(value["version"], JSON_FEED_VERSION);
        assert_eq!(value["items"][0]["url"], "https://blog.example/p/hello");
        assert_eq!(value["items"][0]["date_published"], "2024-01-02T00:00:00Z");
    }

    #[test]
    fn cdata_terminators_are_split() {
        let mut doc = feed();
        doc.items[0].description = "a ]]> b".to_string();
        let xml = rss(&doc);
        assert!(xml.contains("a ]]]]><![CDATA[> b"));
    }
}
