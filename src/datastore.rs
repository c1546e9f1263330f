#[cfg(test)]
pub mod mock;
pub mod postfilters;
pub mod structs;
pub mod tables;

use crate::datastore::structs::{DisplayUpdate, NewPost, Post, Row, TagRow};
use crate::query::RenderedQuery;
use crate::twoface::Fallible;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

// The persistence layer lives outside this crate. These are the seams it plugs into; every error
// they return is passed through to the caller unchanged.

#[async_trait]
/// Reads stored posts and their tags.
pub trait RowLoader: Send + Sync {
    async fn load_post(&self, post_id: i64) -> Fallible<Option<Post>>;
    async fn load_tags(&self, post_id: i64) -> Fallible<Vec<TagRow>>;
}

#[async_trait]
/// Updates stored posts.
pub trait RowWriter: Send + Sync {
    async fn write_display(&self, update: DisplayUpdate) -> Fallible<()>;
    /// Set when the post was last confirmed to exist. `None` soft-hides it.
    async fn set_verified(&self, post_id: i64, at: Option<DateTime<FixedOffset>>) -> Fallible<()>;
}

#[async_trait]
/// Maps tag texts to tag rows, creating the ones that don't exist yet.
pub trait TagResolver: Send + Sync {
    /// One row per distinct tag, compared case-insensitively.
    async fn resolve_tags(&self, texts: &[String]) -> Fallible<Vec<TagRow>>;
}

#[async_trait]
/// Inserts new posts.
pub trait PostStore: Send + Sync {
    /// Returns the id of the new post.
    async fn insert_post(&self, post: NewPost) -> Fallible<i64>;
    async fn link_tags(&self, post_id: i64, tag_ids: &[i64]) -> Fallible<()>;
}

#[async_trait]
/// Runs rendered queries.
pub trait Executor: Send + Sync {
    async fn fetch(&self, query: &RenderedQuery) -> Fallible<Vec<Row>>;
}

#[async_trait]
/// Asks the source platform whether a post still exists.
pub trait ExistenceCheck: Send + Sync {
    async fn still_exists(&self, external_id: u64) -> Fallible<bool>;
}
