//! Admission control for EventDesk.
//!
//! Decides, before a query enters the dispatch queue, whether the asking
//! user may proceed now or must wait. Denial is a deferral signal carrying a
//! wait estimate, never an error.

pub mod rate_limit;

pub use rate_limit::{Admission, RateLimitPolicy, RateLimiter};
