#[macro_use]
extern crate guard;

use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn, Level};
use tweetstream::config::Config;
use tweetstream::query::PostQuery;
use tweetstream::rewriter::{markup::TwitterMarkup, Rewriter};

/// Previews what the crate does with a batch of statuses: the display text and tags of each, and
/// the query the configured stream reads posts with.
fn main() {
    let args: Vec<_> = std::env::args().collect();
    guard!(let [_, config_file_path, payloads_path, ..] = &args[..] else {
        eprintln!("Usage: tweetstream <config file> <JSON file with an array of statuses>");
        return
    });

    let config = match Config::from_file(config_file_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };

    // Set up logger output
    let subscriber_builder = tracing_subscriber::fmt().with_max_level(Level::DEBUG);
    if config.human_logs {
        subscriber_builder.init();
    } else {
        subscriber_builder.json().init();
    }

    if let Err(e) = preview(&config, payloads_path) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn preview(config: &Config, payloads_path: &str) -> anyhow::Result<()> {
    let display_offset = config.display_offset()?;
    let markup = TwitterMarkup::new(&config.profile_base_url)
        .map_err(|e| e.internal)
        .context("couldn't build markup")?;

    let contents = std::fs::read_to_string(payloads_path)
        .with_context(|| format!("couldn't read payloads file {}", payloads_path))?;
    let payloads: Vec<Value> =
        serde_json::from_str(&contents).context("payloads file must hold a JSON array")?;
    info!(payloads = payloads.len(), "previewing statuses");

    for (index, payload) in payloads.iter().enumerate() {
        let parsed = Rewriter::from_value(payload, markup.clone())
            .and_then(|rewriter| rewriter.parsed_row(display_offset, None));
        match parsed {
            Ok(parsed) => {
                println!("{} ({})", parsed.post.external_id, parsed.post.created_at);
                println!("  {}", parsed.post.display_text);
                if !parsed.tags.is_empty() {
                    println!("  tags: {}", parsed.tags.join(", "));
                }
            }
            Err(e) => warn!(index, error = %e, internal = %e.internal, "skipping status"),
        }
    }

    let mut query = PostQuery::new(&config.tables());
    query.apply(&config.stream);
    let query = query
        .build()
        .map_err(|e| e.internal)
        .context("couldn't build stream query")?;
    println!("\n{};", query.sql);
    Ok(())
}
