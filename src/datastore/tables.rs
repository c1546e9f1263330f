//! Table and column names. Table names carry a configurable prefix, so they are passed around as a
//! `Tables` value instead of living in globals.

/// Names of the three tables posts are stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub posts: String,
    pub tags: String,
    /// Association table linking posts to tags.
    pub post_tags: String,
}

impl Tables {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            posts: format!("{}wts_tweets", prefix),
            tags: format!("{}wts_hashtags", prefix),
            post_tags: format!("{}wts_tweet_to_hashtag", prefix),
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

pub mod posts {
    pub const ID: &str = "id";
    pub const TIME: &str = "time";
    pub const LAST_CHECKED: &str = "last_checked";
    pub const HAS_MEDIA: &str = "has_media";
}

pub mod post_tags {
    pub const POST_ID: &str = "tid";
    pub const TAG_ID: &str = "hid";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix() {
        let tables = Tables::with_prefix("wp_");
        assert_eq!(tables.posts, "wp_wts_tweets");
        assert_eq!(tables.tags, "wp_wts_hashtags");
        assert_eq!(tables.post_tags, "wp_wts_tweet_to_hashtag");
        assert_eq!(Tables::default().posts, "wts_tweets");
    }
}
