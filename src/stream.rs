//! Reads the posts of a stream. Posts found to be gone while reading are soft-hidden, so the query
//! is re-run a bounded number of times to fill the requested count.
use crate::datastore::postfilters::PostFilters;
use crate::datastore::structs::Post;
use crate::datastore::tables::Tables;
use crate::datastore::{ExistenceCheck, Executor, RowWriter};
use crate::display::display_post;
use crate::metrics;
use crate::query::PostQuery;
use crate::rewriter::markup::Markup;
use crate::twoface::{Fallible, TfError};
use chrono::{DateTime, Duration, FixedOffset};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// How many times the query is run to fill the stream.
pub const MAX_READS: usize = 3;

/// A post ready to be shown.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub post: Post,
    pub display_text: String,
}

/// Recheck the post's existence if it was last verified longer than `after` ago.
/// Gone posts are soft-hidden, posts still there are stamped with `now`.
///
/// Returns whether the post may be shown. If the platform can't be asked, the post is assumed to
/// still exist and is checked again next time.
pub async fn verify_post<S>(
    store: &S,
    post: &mut Post,
    now: DateTime<FixedOffset>,
    after: Duration,
) -> Fallible<bool>
where
    S: ExistenceCheck + RowWriter + ?Sized,
{
    if post.is_hidden() {
        return Ok(false);
    }
    if !post.needs_recheck(now, after) {
        return Ok(true);
    }
    let exists = match store.still_exists(post.external_id).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(
                post_id = post.id,
                external_id = post.external_id,
                error = %e,
                internal = %e.internal,
                "couldn't check whether post still exists"
            );
            metrics::STREAM_POST_ERRORS
                .with_label_values(&["existence_check"])
                .inc();
            return Ok(true);
        }
    };
    if exists {
        store.set_verified(post.id, Some(now)).await?;
        post.last_verified_at = Some(now);
        Ok(true)
    } else {
        info!(
            post_id = post.id,
            external_id = post.external_id,
            "post is gone, hiding it"
        );
        store.set_verified(post.id, None).await?;
        post.last_verified_at = None;
        Ok(false)
    }
}

/// Up to `filters.count` posts matching `filters`, newest first.
pub async fn read_stream<S, M>(
    store: &S,
    markup: &M,
    tables: &Tables,
    filters: &PostFilters,
    now: DateTime<FixedOffset>,
    recheck_after: Duration,
) -> Fallible<Vec<StreamItem>>
where
    S: Executor + ExistenceCheck + RowWriter + ?Sized,
    M: Markup + Clone,
{
    metrics::observe("read_stream", || async {
        let mut query = PostQuery::new(tables);
        query.apply(filters);
        let query = query.build()?;
        let wanted = query.limit as usize;

        let mut items: Vec<StreamItem> = Vec::with_capacity(wanted);
        let mut seen = HashSet::new();
        for read in 1..=MAX_READS {
            let rows = store.fetch(&query).await?;
            let returned = rows.len();
            let mut hidden = 0;
            for row in rows {
                // A bad post is left out, the rest of the stream is still shown.
                let mut post = match Post::from_row(row) {
                    Ok(post) => post,
                    Err(e) => {
                        skip_post(None, &e);
                        continue;
                    }
                };
                if !seen.insert(post.id) {
                    continue;
                }
                if query.recheck_existence {
                    match verify_post(store, &mut post, now, recheck_after).await {
                        Ok(true) => {}
                        Ok(false) => {
                            hidden += 1;
                            continue;
                        }
                        Err(e) => {
                            skip_post(Some(post.id), &e);
                            continue;
                        }
                    }
                }
                match display_post(store, markup, &mut post, false).await {
                    Ok(Some(display_text)) => items.push(StreamItem { post, display_text }),
                    Ok(None) => {}
                    Err(e) => skip_post(Some(post.id), &e),
                }
            }
            debug!(read, returned, hidden, collected = items.len(), "read stream");
            // Re-running only helps if rows dropped out of the result since the last read.
            if items.len() >= wanted || hidden == 0 || returned < wanted {
                break;
            }
        }
        items.truncate(wanted);
        Ok(items)
    })
    .await
}

fn skip_post(post_id: Option<i64>, e: &TfError) {
    metrics::STREAM_POST_ERRORS
        .with_label_values(&[e.cause().label()])
        .inc();
    warn!(?post_id, error = %e, internal = %e.internal, "skipping post");
}
