#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod backend;
pub mod comment;
pub mod config;
pub mod data;
pub mod feed;
pub mod session;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
