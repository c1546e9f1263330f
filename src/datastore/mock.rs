use crate::datastore::structs::{DisplayUpdate, NewPost, Post, Row, TagRow};
use crate::query::RenderedQuery;
use crate::twoface::{Fallible, TfError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Store<T> = Arc<Mutex<Vec<T>>>;

/// An in-memory implementation of every persistence collaborator.
///
/// The executor doesn't interpret SQL: it records it, then returns the visible posts newest first,
/// up to the query's limit.
#[derive(Clone, Default, Debug)]
pub struct Client {
    posts: Store<Post>,
    tags: Store<TagRow>,
    post_tags: Store<(i64, i64)>,
    /// External ids the source platform no longer has.
    gone: Store<u64>,
    queries: Store<String>,
    display_writes: Arc<AtomicUsize>,
    existence_checks: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
    existence_check_down: Arc<AtomicBool>,
}

impl Client {
    pub fn set_posts(&mut self, posts: Vec<Post>) {
        self.posts = Arc::new(Mutex::new(posts));
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn post(&self, post_id: i64) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
    }

    pub fn tags(&self) -> Vec<TagRow> {
        self.tags.lock().unwrap().clone()
    }

    pub fn mark_gone(&self, external_id: u64) {
        self.gone.lock().unwrap().push(external_id);
    }

    /// Every SQL string the executor was asked to run.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn display_writes(&self) -> usize {
        self.display_writes.load(Ordering::SeqCst)
    }

    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(Ordering::SeqCst)
    }

    /// Make every following call fail, as if the database went away.
    pub fn break_persistence(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Make existence checks fail while everything else keeps working.
    pub fn break_existence_checks(&self) {
        self.existence_check_down.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Fallible<()> {
        if self.broken.load(Ordering::SeqCst) {
            let e = io::Error::new(io::ErrorKind::ConnectionRefused, "database is down");
            return Err(TfError::persistence(e));
        }
        Ok(())
    }
}

#[async_trait]
impl super::RowLoader for Client {
    async fn load_post(&self, post_id: i64) -> Fallible<Option<Post>> {
        self.check()?;
        Ok(self.post(post_id))
    }

    async fn load_tags(&self, post_id: i64) -> Fallible<Vec<TagRow>> {
        self.check()?;
        let tag_ids: Vec<i64> = self
            .post_tags
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == post_id)
            .map(|(_, t)| *t)
            .collect();
        let mut tags: Vec<TagRow> = self
            .tags
            .lock()
            .unwrap()
            .iter()
            .filter(|t| tag_ids.contains(&t.id))
            .cloned()
            .collect();
        tags.sort_by_key(|t| t.id);
        Ok(tags)
    }
}

#[async_trait]
impl super::RowWriter for Client {
    async fn write_display(&self, update: DisplayUpdate) -> Fallible<()> {
        self.check()?;
        self.display_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(post) = self
            .posts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == update.post_id)
        {
            post.display_text = update.display_text;
            post.rewriter_version = update.rewriter_version;
        }
        Ok(())
    }

    async fn set_verified(&self, post_id: i64, at: Option<DateTime<FixedOffset>>) -> Fallible<()> {
        self.check()?;
        if let Some(post) = self
            .posts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == post_id)
        {
            post.last_verified_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl super::TagResolver for Client {
    async fn resolve_tags(&self, texts: &[String]) -> Fallible<Vec<TagRow>> {
        self.check()?;
        let mut tags = self.tags.lock().unwrap();
        let mut resolved: Vec<TagRow> = Vec::new();
        for text in texts {
            let text = text.to_lowercase();
            if resolved.iter().any(|t| t.text == text) {
                continue;
            }
            let tag = match tags.iter().find(|t| t.text.to_lowercase() == text) {
                Some(tag) => tag.clone(),
                None => {
                    let tag = TagRow {
                        id: tags.len() as i64 + 1,
                        text,
                    };
                    tags.push(tag.clone());
                    tag
                }
            };
            resolved.push(tag);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl super::PostStore for Client {
    async fn insert_post(&self, new_post: NewPost) -> Fallible<i64> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        if posts.iter().any(|p| p.external_id == new_post.external_id) {
            let e = io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("duplicate entry {} for key twitter_id", new_post.external_id),
            );
            return Err(TfError::persistence(e));
        }
        let id = posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        posts.push(new_post.into_post(id));
        Ok(id)
    }

    async fn link_tags(&self, post_id: i64, tag_ids: &[i64]) -> Fallible<()> {
        self.check()?;
        let mut links = self.post_tags.lock().unwrap();
        for tag_id in tag_ids {
            if !links.contains(&(post_id, *tag_id)) {
                links.push((post_id, *tag_id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl super::Executor for Client {
    async fn fetch(&self, query: &RenderedQuery) -> Fallible<Vec<Row>> {
        self.check()?;
        self.queries.lock().unwrap().push(query.sql.clone());
        let mut visible: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.is_hidden())
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible
            .iter()
            .take(query.limit as usize)
            .map(Post::to_row)
            .collect()
    }
}

#[async_trait]
impl super::ExistenceCheck for Client {
    async fn still_exists(&self, external_id: u64) -> Fallible<bool> {
        self.check()?;
        self.existence_checks.fetch_add(1, Ordering::SeqCst);
        if self.existence_check_down.load(Ordering::SeqCst) {
            let e = io::Error::new(io::ErrorKind::TimedOut, "platform didn't answer");
            return Err(TfError::persistence(e));
        }
        Ok(!self.gone.lock().unwrap().contains(&external_id))
    }
}
