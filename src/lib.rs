pub mod config;
pub mod datastore;
pub mod display;
pub mod import;
pub mod metrics;
pub mod query;
pub mod rewriter;
pub mod stream;
pub mod twoface;

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate guard;
