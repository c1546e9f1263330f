//! Stored display text is only valid for the rewriter version that rendered it. Anything else is
//! recomputed from the stored raw payload and written back.
use crate::datastore::structs::{DisplayUpdate, Post};
use crate::datastore::{RowLoader, RowWriter};
use crate::metrics;
use crate::rewriter::{markup::Markup, Rewriter, VERSION};
use crate::twoface::{Fallible, TfError};
use anyhow::anyhow;
use tracing::{debug, info};

/// The display text of `post`, recomputing it if it is stale or `force` is set.
///
/// Soft-hidden posts have no display text. Concurrent callers may both recompute a stale post;
/// the last write wins.
pub async fn display_post<W, M>(
    writer: &W,
    markup: &M,
    post: &mut Post,
    force: bool,
) -> Fallible<Option<String>>
where
    W: RowWriter + ?Sized,
    M: Markup + Clone,
{
    if post.is_hidden() {
        debug!(post_id = post.id, "post is hidden");
        return Ok(None);
    }
    if !force && !post.is_stale(VERSION) {
        metrics::DISPLAY_CACHE.with_label_values(&["hit"]).inc();
        return Ok(Some(post.display_text.clone()));
    }

    let outcome = if force { "forced" } else { "stale" };
    metrics::DISPLAY_CACHE.with_label_values(&[outcome]).inc();
    info!(
        post_id = post.id,
        stored_version = &post.rewriter_version[..],
        version = VERSION,
        "recomputing display text"
    );
    let display_text = {
        let rewriter = Rewriter::with_markup(&post.raw_payload, markup.clone())?;
        rewriter.display().to_owned()
    };
    writer
        .write_display(DisplayUpdate {
            post_id: post.id,
            display_text: display_text.clone(),
            rewriter_version: VERSION.to_owned(),
        })
        .await?;
    post.display_text = display_text.clone();
    post.rewriter_version = VERSION.to_owned();
    Ok(Some(display_text))
}

/// Load a post by its local id, then display it as [`display_post`] does.
pub async fn display_by_id<S, M>(
    store: &S,
    markup: &M,
    post_id: i64,
    force: bool,
) -> Fallible<Option<String>>
where
    S: RowLoader + RowWriter + ?Sized,
    M: Markup + Clone,
{
    guard!(let Some(mut post) = store.load_post(post_id).await? else {
        return Err(TfError::not_found(
            anyhow!("no post with id {}", post_id),
            "No such post",
        ));
    });
    display_post(store, markup, &mut post, force).await
}
