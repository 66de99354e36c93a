//! Live state probing.
//!
//! The prober asks the cloud provider whether each catalog resource exists.
//! Each provider call has a deadline; transient failures are retried with
//! exponential backoff and then reported per resource, so one unreachable
//! resource never stops the others from being probed.

mod live;
mod prober;
mod retry;

pub use live::{LiveObservations, LiveResourceState, ProbeOutcome};
pub use prober::Prober;
pub use retry::RetryPolicy;
