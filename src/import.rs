use crate::datastore::{PostStore, TagResolver};
use crate::metrics;
use crate::rewriter::{markup::Markup, Rewriter};
use crate::twoface::{Fallible, TfError};
use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

/// What happened to a batch of payloads.
#[derive(Debug, Default)]
pub struct ImportSummary {
    /// Local ids of the new posts, in payload order.
    pub imported: Vec<i64>,
    /// Index of each payload that couldn't be imported, and why.
    pub failures: Vec<(usize, TfError)>,
}

/// Store every payload as a new post, then link it to its tags.
///
/// A payload that fails (malformed, already stored, rejected by the store) is logged and skipped;
/// the rest of the batch is still imported. New posts count as verified at `now`.
pub async fn import_statuses<S, M>(
    store: &S,
    markup: &M,
    payloads: &[String],
    display_offset: FixedOffset,
    now: DateTime<FixedOffset>,
) -> ImportSummary
where
    S: PostStore + TagResolver + ?Sized,
    M: Markup + Clone,
{
    let mut summary = ImportSummary::default();
    for (index, payload) in payloads.iter().enumerate() {
        match import_one(store, markup, payload, display_offset, now).await {
            Ok(post_id) => {
                metrics::IMPORTS.with_label_values(&["ok"]).inc();
                summary.imported.push(post_id);
            }
            Err(e) => {
                metrics::IMPORTS.with_label_values(&[e.cause().label()]).inc();
                warn!(index, error = %e, internal = %e.internal, "couldn't import post");
                summary.failures.push((index, e));
            }
        }
    }
    info!(
        imported = summary.imported.len(),
        failed = summary.failures.len(),
        "imported posts"
    );
    summary
}

async fn import_one<S, M>(
    store: &S,
    markup: &M,
    payload: &str,
    display_offset: FixedOffset,
    now: DateTime<FixedOffset>,
) -> Fallible<i64>
where
    S: PostStore + TagResolver + ?Sized,
    M: Markup + Clone,
{
    let parsed = {
        let rewriter = Rewriter::with_markup(payload, markup.clone())?;
        rewriter.parsed_row(display_offset, Some(now))?
    };
    let external_id = parsed.post.external_id;
    let post_id = store.insert_post(parsed.post).await?;
    // Only now, so a rejected post doesn't leave tags behind.
    let tags = if parsed.tags.is_empty() {
        Vec::new()
    } else {
        store.resolve_tags(&parsed.tags).await?
    };

    let mut tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
    tag_ids.sort_unstable();
    tag_ids.dedup();
    if !tag_ids.is_empty() {
        store.link_tags(post_id, &tag_ids).await?;
    }
    info!(post_id, external_id, tags = tag_ids.len(), "imported post");
    Ok(post_id)
}
