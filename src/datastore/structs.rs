use crate::twoface::{DescribeErr, Fallible};
use anyhow::anyhow;
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One result row from the persistence executor: column name to value.
pub type Row = Map<String, Value>;

/// A stored post. Field names map onto the columns of the posts table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: i64,
    #[serde(rename = "twitter_id")]
    pub external_id: u64,
    #[serde(rename = "time")]
    pub created_at: DateTime<FixedOffset>,
    /// `None` means the post is not confirmed to still exist, i.e. it is soft-hidden.
    #[serde(rename = "last_checked", default)]
    pub last_verified_at: Option<DateTime<FixedOffset>>,
    #[serde(rename = "rt", deserialize_with = "flag")]
    pub is_retweet: bool,
    #[serde(rename = "reply", deserialize_with = "flag")]
    pub is_reply: bool,
    #[serde(deserialize_with = "flag")]
    pub has_media: bool,
    pub author_id: u64,
    #[serde(rename = "author")]
    pub author_handle: String,
    #[serde(rename = "parser_version")]
    pub rewriter_version: String,
    pub text: String,
    #[serde(rename = "display")]
    pub display_text: String,
    #[serde(rename = "raw_data")]
    pub raw_payload: String,
}

impl Post {
    /// Convert an executor row. Rows without the post columns are a contract violation.
    pub fn from_row(row: Row) -> Fallible<Self> {
        serde_json::from_value(Value::Object(row)).contract_err("Row is not a post")
    }

    pub fn to_row(&self) -> Fallible<Row> {
        match serde_json::to_value(self)? {
            Value::Object(row) => Ok(row),
            other => Err(anyhow!("post serialized to {}", other).into()),
        }
    }

    /// Has this post been soft-hidden?
    pub fn is_hidden(&self) -> bool {
        self.last_verified_at.is_none()
    }

    /// Was the display text rendered by a different rewriter version?
    pub fn is_stale(&self, current_version: &str) -> bool {
        self.rewriter_version != current_version
    }

    /// Should the post's existence be checked again before it is shown?
    pub fn needs_recheck(&self, now: DateTime<FixedOffset>, after: Duration) -> bool {
        match self.last_verified_at {
            Some(verified) => verified + after < now,
            None => false,
        }
    }
}

/// Accept both `true`/`false` and the `0`/`1` integers SQL stores flags as.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// Parameters for the statement which inserts new posts.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewPost {
    #[serde(rename = "twitter_id")]
    pub external_id: u64,
    #[serde(rename = "time")]
    pub created_at: DateTime<FixedOffset>,
    #[serde(rename = "last_checked")]
    pub last_verified_at: Option<DateTime<FixedOffset>>,
    #[serde(rename = "rt")]
    pub is_retweet: bool,
    #[serde(rename = "reply")]
    pub is_reply: bool,
    pub has_media: bool,
    pub author_id: u64,
    #[serde(rename = "author")]
    pub author_handle: String,
    #[serde(rename = "parser_version")]
    pub rewriter_version: String,
    pub text: String,
    #[serde(rename = "display")]
    pub display_text: String,
    #[serde(rename = "raw_data")]
    pub raw_payload: String,
}

impl NewPost {
    pub fn into_post(self, id: i64) -> Post {
        Post {
            id,
            external_id: self.external_id,
            created_at: self.created_at,
            last_verified_at: self.last_verified_at,
            is_retweet: self.is_retweet,
            is_reply: self.is_reply,
            has_media: self.has_media,
            author_id: self.author_id,
            author_handle: self.author_handle,
            rewriter_version: self.rewriter_version,
            text: self.text,
            display_text: self.display_text,
            raw_payload: self.raw_payload,
        }
    }
}

/// A new post plus the tags found in it.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedPost {
    pub post: NewPost,
    /// Lower-cased, in source order, possibly repeated.
    pub tags: Vec<String>,
}

/// A topic tag.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagRow {
    pub id: i64,
    #[serde(rename = "hashtag")]
    pub text: String,
}

/// Freshly computed display text for a stored post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub post_id: i64,
    pub display_text: String,
    pub rewriter_version: String,
}
