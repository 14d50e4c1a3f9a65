#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod logging;
pub mod markdown;
pub mod mode;
pub mod podcast;
pub mod session;
pub mod sse;
pub mod suggestions;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
pub use error::Error;
