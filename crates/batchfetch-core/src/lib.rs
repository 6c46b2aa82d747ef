//! batchfetch core - concurrent batch downloader
//!
//! This crate downloads single files, memory buffers and batches of
//! files through a pluggable transfer engine. Files are written to a
//! `.temp` sibling and renamed once complete; every notification is
//! delivered on the host application's thread.

mod config;
mod downloader;
mod engine;
mod error;
mod host;
mod paths;
mod tracker;
mod unit;

pub use config::{load_settings, save_settings};
pub use downloader::*;
pub use engine::*;
pub use error::*;
pub use host::*;
pub use paths::*;
pub use tracker::*;
pub use unit::*;
