//! Typed view over the decoded status payload handed over by the raw-record provider.
use crate::twoface::{DescribeErr, Fallible};
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

/// Source timestamp format, e.g. `Wed Aug 27 13:08:45 +0000 2008`.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A status as delivered by the source API.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct RawStatus {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user: Option<Author>,
    #[serde(default)]
    pub in_reply_to_status_id: Option<u64>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_user_id: Option<u64>,
    #[serde(default)]
    pub in_reply_to_user_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
    pub entities: Entities,
    /// The wrapped original, present only on retweets. `null` and `{}` both count as absent.
    #[serde(default, deserialize_with = "non_empty_status")]
    pub retweeted_status: Option<Box<RawStatus>>,
}

impl RawStatus {
    /// Decode a payload. A payload without text or entity container is a caller contract violation.
    pub fn from_value(value: &Value) -> Fallible<Self> {
        RawStatus::deserialize(value).contract_err("Malformed status payload")
    }

    pub fn from_json(json: &str) -> Fallible<Self> {
        serde_json::from_str(json).contract_err("Malformed status payload")
    }

    pub fn is_retweet(&self) -> bool {
        self.retweeted_status.is_some()
    }

    pub fn is_reply(&self) -> bool {
        self.in_reply_to_status_id.unwrap_or(0) != 0
            || non_empty(&self.in_reply_to_status_id_str)
            || self.in_reply_to_user_id.unwrap_or(0) != 0
            || non_empty(&self.in_reply_to_user_id_str)
            || non_empty(&self.in_reply_to_screen_name)
    }
}

fn non_empty(s: &Option<String>) -> bool {
    s.as_deref().map_or(false, |s| !s.is_empty() && s != "0")
}

fn non_empty_status<'de, D>(deserializer: D) -> Result<Option<Box<RawStatus>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(ref map)) if map.is_empty() => Ok(None),
        Some(v) => RawStatus::deserialize(v)
            .map(|status| Some(Box::new(status)))
            .map_err(D::Error::custom),
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Author {
    pub id: u64,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
}

/// Entity containers, one list per kind. Missing lists are empty.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Entities {
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    #[serde(default)]
    pub hashtags: Vec<HashtagEntity>,
    #[serde(default)]
    pub symbols: Vec<SymbolEntity>,
    #[serde(default)]
    pub user_mentions: Vec<MentionEntity>,
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

/// `[start, end)` in characters of the original text.
pub type Indices = [usize; 2];

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct UrlEntity {
    /// The shortened form as it appears in the text.
    pub url: String,
    pub expanded_url: String,
    pub display_url: String,
    pub indices: Indices,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct HashtagEntity {
    /// Tag text without the leading `#`.
    pub text: String,
    pub indices: Indices,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SymbolEntity {
    pub text: String,
    pub indices: Indices,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct MentionEntity {
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    pub indices: Indices,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct MediaEntity {
    pub url: String,
    #[serde(default)]
    pub media_url_https: Option<String>,
    #[serde(default)]
    pub display_url: Option<String>,
    pub indices: Indices,
}
