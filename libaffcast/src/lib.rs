//! Affcast - scheduled social posting for affiliate content
//!
//! This library provides the queue, dispatcher and platform publishers used
//! by the affcast command line tools.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod platforms;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatch::{CycleReport, DeliveryOutcome, Dispatcher};
pub use error::{AffcastError, Result};
pub use platforms::{Publisher, Publishers};
pub use types::{
    NewPost, NewQueueEntry, Platform, Post, QueueEntry, QueuePlatform, QueueRow, QueueStatus,
};
