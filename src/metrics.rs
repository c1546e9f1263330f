use crate::twoface::Fallible;
use prometheus::Encoder;
use std::future::Future;
use std::time::Instant;

lazy_static! {

    pub static ref OPERATION_SECS: prometheus::HistogramVec = register_histogram_vec!(
        "tweetstream_operation_secs",
        "Seconds taken by each operation, partitioned by operation name",
        &["operation"],
        vec![0.01, 0.1, 1.0, 4.0] // Prometheus buckets
    )
    .expect("couldn't make OPERATION_SECS");

    pub static ref OPERATIONS: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_operations",
        "How many operations returned Ok/Err, per operation",
        &["operation", "result"]
    )
    .expect("couldn't make OPERATIONS");

    pub static ref REWRITES: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_rewrites",
        "Display texts computed by the rewriter, by outcome",
        &["outcome"]
    )
    .expect("couldn't make REWRITES");

    pub static ref DISPLAY_CACHE: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_display_cache",
        "Stored display texts that were fresh (hit) or had to be recomputed (stale, forced)",
        &["result"]
    )
    .expect("couldn't make DISPLAY_CACHE");

    pub static ref QUERIES: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_queries",
        "Queries rendered, by outcome",
        &["outcome"]
    )
    .expect("couldn't make QUERIES");

    pub static ref STREAM_POST_ERRORS: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_stream_post_errors",
        "Errors on single posts while reading a stream, by kind. The stream read carries on",
        &["kind"]
    )
    .expect("couldn't make STREAM_POST_ERRORS");

    pub static ref IMPORTS: prometheus::IntCounterVec = register_int_counter_vec!(
        "tweetstream_imports",
        "Posts imported, by outcome",
        &["outcome"]
    )
    .expect("couldn't make IMPORTS");
}

/// Execute the closure, then log its operational metrics, e.g. time taken, whether it returned Ok/Err, etc.
pub async fn observe<F, Fut, R>(name: &'static str, f: F) -> Fallible<R>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Fallible<R>>,
{
    let start = Instant::now();
    let return_val = f().await;
    let duration = start.elapsed();
    OPERATION_SECS
        .with_label_values(&[name])
        .observe(duration.as_secs_f64());
    OPERATIONS
        .with_label_values(&[name, variant_name(&return_val)])
        .inc();
    return_val
}

fn variant_name<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "err"
    }
}

/// Every registered metric, in the Prometheus text format.
pub fn gather() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
