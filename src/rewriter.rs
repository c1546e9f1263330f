//! Rewrites a status's text for display: every entity span becomes an anchor, everything around the
//! spans is kept byte for byte.
pub mod markup;
pub mod payload;
pub mod splice;

use crate::datastore::structs::{NewPost, ParsedPost};
use crate::metrics;
use crate::twoface::{DescribeErr, Fallible, TfError};
use anyhow::anyhow;
use chrono::{DateTime, FixedOffset};
use markup::{Markup, TwitterMarkup};
use payload::{RawStatus, CREATED_AT_FORMAT};
use serde_json::Value;
use std::cell::OnceCell;
use tracing::debug;

/// Identifies the markup generation logic. Stored display text rendered by any other version is stale.
pub const VERSION: &str = "1.1.0";

/// Kinds of entity span, in the order they are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Link,
    Hashtag,
    /// Recognized, never replaced.
    Symbol,
    Mention,
    /// Recognized, never replaced.
    Media,
}

/// A region of the original text slated for replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    /// What the text is expected to contain at `[start, end)`.
    pub search: String,
    pub replacement: String,
    /// Character index into the original text.
    pub start: usize,
    /// Character index into the original text, exclusive.
    pub end: usize,
}

/// The status whose text, entities and author are rendered.
#[derive(Debug, Clone, Copy)]
pub struct TextSource<'a> {
    pub status: &'a RawStatus,
    /// The wrapper's own flag, whichever status supplies the text.
    pub is_retweet: bool,
}

/// Retweets are rendered from the embedded original.
pub fn resolve_source(payload: &RawStatus) -> TextSource<'_> {
    match &payload.retweeted_status {
        Some(original) => TextSource {
            status: original,
            is_retweet: true,
        },
        None => TextSource {
            status: payload,
            is_retweet: false,
        },
    }
}

/// Every hashtag of the source, lower-cased, in source order. Duplicates are kept.
pub fn extract_tags(source: &TextSource<'_>) -> Vec<String> {
    source
        .status
        .entities
        .hashtags
        .iter()
        .map(|h| h.text.to_lowercase())
        .collect()
}

/// Collect the replaceable spans of the source, sorted by `(start, end)`.
pub fn collect_spans<M: Markup>(source: &TextSource<'_>, markup: &M) -> Vec<Span> {
    let entities = &source.status.entities;
    let mut spans = Vec::new();
    for url in &entities.urls {
        spans.push(Span {
            kind: SpanKind::Link,
            search: url.url.clone(),
            replacement: markup.link(url),
            start: url.indices[0],
            end: url.indices[1],
        });
    }
    for hashtag in &entities.hashtags {
        spans.push(Span {
            kind: SpanKind::Hashtag,
            search: format!("#{}", hashtag.text),
            replacement: markup.hashtag(hashtag),
            start: hashtag.indices[0],
            end: hashtag.indices[1],
        });
    }
    // Symbols are skipped: their text stays as it is.
    for mention in &entities.user_mentions {
        spans.push(Span {
            kind: SpanKind::Mention,
            search: format!("@{}", mention.screen_name),
            replacement: markup.mention(mention),
            start: mention.indices[0],
            end: mention.indices[1],
        });
    }
    // Media is skipped too.
    spans.sort_by_key(|span| (span.start, span.end));
    spans
}

/// Render the display text of the source.
///
/// Spans are applied from the last one to the first, so the indices of every span still waiting to
/// be applied point into text that has not been touched yet.
pub fn render_display<M: Markup>(source: &TextSource<'_>, markup: &M) -> String {
    let original = &source.status.text;
    let spans = collect_spans(source, markup);
    let mut text = original.clone();
    for span in spans.iter().rev() {
        let found = splice::slice(original, span.start, span.end);
        if found != span.search {
            debug!(
                external_id = source.status.id,
                expected = &span.search[..],
                found,
                "entity text doesn't match its indices"
            );
        }
        text = splice::splice(&text, span.start, span.end, &span.replacement);
    }
    text
}

/// Processes exactly one post. Tags and display text are computed on first use, then cached.
pub struct Rewriter<M: Markup = TwitterMarkup> {
    payload: RawStatus,
    raw_payload: String,
    markup: M,
    tags: OnceCell<Vec<String>>,
    display: OnceCell<String>,
}

impl Rewriter<TwitterMarkup> {
    pub fn from_json(raw_payload: &str) -> Fallible<Self> {
        Self::with_markup(raw_payload, TwitterMarkup::default())
    }
}

impl<M: Markup> Rewriter<M> {
    /// `raw_payload` is kept verbatim for [`ParsedPost`].
    pub fn with_markup(raw_payload: &str, markup: M) -> Fallible<Self> {
        let payload = RawStatus::from_json(raw_payload)?;
        Ok(Self {
            payload,
            raw_payload: raw_payload.to_owned(),
            markup,
            tags: OnceCell::new(),
            display: OnceCell::new(),
        })
    }

    pub fn from_value(value: &Value, markup: M) -> Fallible<Self> {
        let payload = RawStatus::from_value(value)?;
        let raw_payload = serde_json::to_string(value)?;
        Ok(Self {
            payload,
            raw_payload,
            markup,
            tags: OnceCell::new(),
            display: OnceCell::new(),
        })
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn source(&self) -> TextSource<'_> {
        resolve_source(&self.payload)
    }

    pub fn is_retweet(&self) -> bool {
        self.payload.is_retweet()
    }

    pub fn text(&self) -> &str {
        &self.source().status.text
    }

    pub fn tags(&self) -> &[String] {
        self.tags.get_or_init(|| extract_tags(&self.source()))
    }

    pub fn display(&self) -> &str {
        self.display.get_or_init(|| {
            metrics::REWRITES.with_label_values(&["rendered"]).inc();
            render_display(&self.source(), &self.markup)
        })
    }

    /// Everything needed to store this post.
    ///
    /// Identity and authorship come from the text source, the timestamp and the reply flag from the
    /// wrapper. The timestamp is converted to `display_offset`.
    pub fn parsed_row(
        &self,
        display_offset: FixedOffset,
        verified_at: Option<DateTime<FixedOffset>>,
    ) -> Fallible<ParsedPost> {
        let source = self.source();
        let created_at = self
            .payload
            .created_at
            .as_deref()
            .ok_or_else(|| TfError::contract(anyhow!("no created_at"), "Malformed status payload"))?;
        let created_at = DateTime::parse_from_str(created_at, CREATED_AT_FORMAT)
            .contract_err("Malformed status timestamp")?
            .with_timezone(&display_offset);
        let author = source
            .status
            .user
            .as_ref()
            .ok_or_else(|| TfError::contract(anyhow!("no user"), "Malformed status payload"))?;

        Ok(ParsedPost {
            post: NewPost {
                external_id: source.status.id,
                created_at,
                last_verified_at: verified_at,
                is_retweet: source.is_retweet,
                is_reply: self.payload.is_reply(),
                has_media: !source.status.entities.media.is_empty(),
                author_id: author.id,
                author_handle: author.screen_name.clone(),
                rewriter_version: self.version().to_owned(),
                text: source.status.text.clone(),
                display_text: self.display().to_owned(),
                raw_payload: self.raw_payload.clone(),
            },
            tags: self.tags().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewriter::payload::{HashtagEntity, MentionEntity, UrlEntity};
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::Cell;

    /// Wraps every entity in brackets and counts how often it is asked to.
    #[derive(Default)]
    struct CountingMarkup {
        calls: Cell<usize>,
    }

    impl Markup for CountingMarkup {
        fn link(&self, url: &UrlEntity) -> String {
            self.calls.set(self.calls.get() + 1);
            format!("[{}]", url.display_url)
        }
        fn hashtag(&self, hashtag: &HashtagEntity) -> String {
            self.calls.set(self.calls.get() + 1);
            format!("[#{}]", hashtag.text)
        }
        fn mention(&self, mention: &MentionEntity) -> String {
            self.calls.set(self.calls.get() + 1);
            format!("[@{}]", mention.screen_name)
        }
    }

    fn status(text: &str, entities: Value) -> Value {
        json!({
            "id": 42,
            "text": text,
            "created_at": "Wed Aug 27 13:08:45 +0000 2008",
            "user": {"id": 7, "screen_name": "wrapper", "name": "Wrapper"},
            "entities": entities,
        })
    }

    fn rewriter(value: Value) -> Rewriter<CountingMarkup> {
        Rewriter::from_value(&value, CountingMarkup::default()).unwrap()
    }

    #[test]
    fn test_no_entities_keeps_text() {
        let r = rewriter(status("plain <text> & more", json!({})));
        assert_eq!(r.display(), "plain <text> & more");
        assert!(r.tags().is_empty());
    }

    #[test]
    fn test_example_end_to_end() {
        let r = Rewriter::from_value(
            &status(
                "Check #wow at http://x.co",
                json!({
                    "hashtags": [{"text": "wow", "indices": [6, 10]}],
                    "urls": [{
                        "url": "http://x.co",
                        "expanded_url": "http://x.co",
                        "display_url": "x.co",
                        "indices": [14, 26],
                    }],
                }),
            ),
            TwitterMarkup::default(),
        )
        .unwrap();
        let display = r.display();
        assert!(display.starts_with("Check <a "));
        let tag_at = display.find(">#wow</a>").unwrap();
        let link_at = display.find(">x.co</a>").unwrap();
        assert!(tag_at < link_at);
        assert!(display[tag_at..link_at].contains("</a> at <a "));
        assert!(display.ends_with(">x.co</a>"));
    }

    #[test]
    fn test_back_to_front_matches_simultaneous_splice() {
        let text = "abcd efghijklmno pq";
        let r = rewriter(status(
            text,
            json!({
                "hashtags": [{"text": "bcd", "indices": [0, 4]}],
                "user_mentions": [{"screen_name": "jklmn", "indices": [10, 15]}],
            }),
        ));
        // Splice both spans at once against the untouched text.
        let simultaneous = format!("[#bcd]{}[@jklmn]{}", &text[4..10], &text[15..]);
        assert_eq!(r.display(), simultaneous);
    }

    #[test]
    fn test_unimplemented_kinds_are_left_alone() {
        let r = rewriter(status(
            "$AAPL up http://t.co/pic",
            json!({
                "symbols": [{"text": "AAPL", "indices": [0, 5]}],
                "media": [{"url": "http://t.co/pic", "indices": [9, 24]}],
            }),
        ));
        assert_eq!(r.display(), "$AAPL up http://t.co/pic");
    }

    #[test]
    fn test_multibyte_text() {
        let r = rewriter(status(
            "héllo 🌍 #Ünï @bob",
            json!({
                "hashtags": [{"text": "Ünï", "indices": [8, 12]}],
                "user_mentions": [{"screen_name": "bob", "indices": [13, 17]}],
            }),
        ));
        assert_eq!(r.display(), "héllo 🌍 [#Ünï] [@bob]");
        assert_eq!(r.tags(), &["ünï".to_owned()][..]);
    }

    #[test]
    fn test_tags_are_lowercase_with_duplicates() {
        let r = rewriter(status(
            "#Rust #rust #Go",
            json!({
                "hashtags": [
                    {"text": "Rust", "indices": [0, 5]},
                    {"text": "rust", "indices": [6, 11]},
                    {"text": "Go", "indices": [12, 15]},
                ],
            }),
        ));
        assert_eq!(r.tags(), &["rust", "rust", "go"]);
    }

    #[test]
    fn test_retweet_uses_embedded_original() {
        let mut wrapper = status(
            "RT @orig: #inner text",
            json!({"hashtags": [{"text": "wrapper", "indices": [0, 2]}]}),
        );
        wrapper["retweeted_status"] = json!({
            "id": 99,
            "text": "#inner text",
            "user": {"id": 8, "screen_name": "orig", "name": "Original"},
            "entities": {"hashtags": [{"text": "Inner", "indices": [0, 6]}]},
        });
        let r = rewriter(wrapper);
        assert!(r.is_retweet());
        assert!(r.source().is_retweet);
        assert_eq!(r.text(), "#inner text");
        assert_eq!(r.tags(), &["inner"]);
        assert_eq!(r.display(), "[#Inner] text");

        let row = r.parsed_row(FixedOffset::east_opt(0).unwrap(), None).unwrap();
        assert!(row.post.is_retweet);
        assert_eq!(row.post.external_id, 99);
        assert_eq!(row.post.author_handle, "orig");
    }

    #[test]
    fn test_display_is_computed_once() {
        let r = rewriter(status(
            "#a #b",
            json!({"hashtags": [
                {"text": "a", "indices": [0, 2]},
                {"text": "b", "indices": [3, 5]},
            ]}),
        ));
        let first = r.display().to_owned();
        assert_eq!(r.markup.calls.get(), 2);
        assert_eq!(r.display(), first);
        assert_eq!(r.markup.calls.get(), 2);
    }

    #[test]
    fn test_parsed_row() {
        let mut value = status(
            "#Tag pic",
            json!({
                "hashtags": [{"text": "Tag", "indices": [0, 4]}],
                "media": [{"url": "http://t.co/p", "indices": [5, 8]}],
            }),
        );
        value["in_reply_to_status_id"] = json!(123);
        let r = rewriter(value);
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let row = r.parsed_row(offset, None).unwrap();
        assert_eq!(row.tags, vec!["tag".to_owned()]);
        assert_eq!(row.post.external_id, 42);
        assert_eq!(row.post.author_id, 7);
        assert!(row.post.is_reply);
        assert!(!row.post.is_retweet);
        assert!(row.post.has_media);
        assert_eq!(row.post.rewriter_version, VERSION);
        assert_eq!(row.post.display_text, "[#Tag] pic");
        assert_eq!(
            row.post.created_at.to_rfc3339(),
            "2008-08-27T15:08:45+02:00"
        );
        let raw: Value = serde_json::from_str(&row.post.raw_payload).unwrap();
        assert_eq!(raw["in_reply_to_status_id"], json!(123));
    }

    #[test]
    fn test_parsed_row_needs_timestamp() {
        let mut value = status("hi", json!({}));
        value["created_at"] = json!("yesterday");
        let err = rewriter(value)
            .parsed_row(FixedOffset::east_opt(0).unwrap(), None)
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_malformed_payload_fails_fast() {
        let err = Rewriter::from_json(r#"{"id": 1, "text": "no entities"}"#)
            .err()
            .unwrap();
        assert!(err.is_contract_violation());
    }

    proptest! {
        #[test]
        fn span_order_does_not_matter(order in (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())) {
            let n = order.len();
            let words: Vec<String> = (0..n).map(|i| format!("#t{}", i)).collect();
            let text = words.join(" ");
            let entity = |i: usize| {
                // Every word is 3 characters plus a separating space.
                json!({"text": format!("t{}", i), "indices": [i * 4, i * 4 + 3]})
            };
            let sorted: Vec<Value> = (0..n).map(entity).collect();
            let shuffled: Vec<Value> = order.iter().map(|&i| entity(i)).collect();

            let a = rewriter(status(&text, json!({"hashtags": sorted})));
            let b = rewriter(status(&text, json!({"hashtags": shuffled})));
            prop_assert_eq!(a.display(), b.display());
            let expected: Vec<String> = (0..n).map(|i| format!("[#t{}]", i)).collect();
            prop_assert_eq!(a.display(), expected.join(" "));
        }
    }
}
