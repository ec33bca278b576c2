// src/queue/mod.rs

//! Shared job queue.
//!
//! - [`store`] holds the pending / running / history partitions behind one
//!   mutex and condvar.
//! - [`notify`] defines the change-notification seam.

pub mod notify;
pub mod store;

pub use notify::{ChannelSink, NotificationSink, QueueEvent};
pub use store::{QueueCounts, QueueStore};
