//! # vigil
//!
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use pnet;
pub use serde_json;
pub use tokio;
pub use tracing;

pub use crate::capture::Capture;

pub mod capture;
pub mod clock;
pub mod config;
pub mod detector;
pub mod env;
pub mod event;
pub mod metrics;
pub mod packet;
pub mod prelude;
pub mod store;
pub mod thresholds;
