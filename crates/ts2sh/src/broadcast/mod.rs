//! Push-style job notifications.
//!
//! The store stays the source of truth; these events only mirror writes that
//! landed, for callers that would rather wait than poll.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
