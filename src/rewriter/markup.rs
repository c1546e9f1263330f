//! Turns entities into anchor markup.
use crate::rewriter::payload::{HashtagEntity, MentionEntity, UrlEntity};
use crate::twoface::{DescribeErr, Fallible};
use anyhow::anyhow;
use url::Url;

/// Synthesizes the replacement markup for each kind of entity that gets replaced.
pub trait Markup {
    fn link(&self, url: &UrlEntity) -> String;
    fn hashtag(&self, hashtag: &HashtagEntity) -> String;
    fn mention(&self, mention: &MentionEntity) -> String;
}

/// Anchors pointing at the source network's canonical destinations.
#[derive(Clone, Debug)]
pub struct TwitterMarkup {
    base: Url,
}

impl TwitterMarkup {
    pub fn new(base: &str) -> Fallible<Self> {
        let base = Url::parse(base).contract_err("Invalid profile base URL")?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("{} cannot be a base URL", base)).contract_err("Invalid profile base URL");
        }
        Ok(Self { base })
    }

    fn profile_url(&self, screen_name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(screen_name);
        }
        url
    }

    fn search_url(&self, tag: &str) -> Url {
        let mut url = self.profile_url("search");
        url.query_pairs_mut()
            .append_pair("q", &format!("#{}", tag))
            .append_pair("src", "hash");
        url
    }
}

impl Default for TwitterMarkup {
    fn default() -> Self {
        Self {
            base: Url::parse("https://twitter.com/").expect("static URL is valid"),
        }
    }
}

impl Markup for TwitterMarkup {
    fn link(&self, url: &UrlEntity) -> String {
        anchor(
            &url.expanded_url,
            &url.display_url,
            "link",
            Some(&url.expanded_url),
        )
    }

    fn hashtag(&self, hashtag: &HashtagEntity) -> String {
        anchor(
            self.search_url(&hashtag.text).as_str(),
            &format!("#{}", hashtag.text),
            "hashtag",
            None,
        )
    }

    fn mention(&self, mention: &MentionEntity) -> String {
        anchor(
            self.profile_url(&mention.screen_name).as_str(),
            &format!("@{}", mention.screen_name),
            "mention",
            Some(&mention.name),
        )
    }
}

fn anchor(href: &str, label: &str, class: &str, title: Option<&str>) -> String {
    let title = title
        .map(|t| format!(" title=\"{}\"", escape(t)))
        .unwrap_or_default();
    format!(
        "<a target=\"_blank\" class=\"{}\" href=\"{}\"{}>{}</a>",
        class,
        escape(href),
        title,
        escape(label)
    )
}

/// HTML-escape text for use in attribute values and element content.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}
