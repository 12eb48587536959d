//! Client-side tracking of asynchronous server jobs.
//!
//! A job moves `Unknown -> Polling -> {Succeeded, Failed, TimedOut}` from the
//! client's point of view; [`JobPoller`] implements that walk over any
//! [`JobSource`].

mod cancel;
mod poller;
mod status;

pub use cancel::CancelHandle;
pub use poller::{Backoff, DEFAULT_MAX_ATTEMPTS, JobPoller, JobSource};
pub use status::{Job, JobStatus};
