//! In-process rate limiting.
//!
//! Counters live in a [`DashMap`](dashmap::DashMap) owned by each limiter, so
//! limits are not shared across processes.
//!
//! # When to Use
//!
//! - Single-process services
//! - Tests and development, where no shared store is available
//! - Limits that may reset when the process restarts
//!
//! For limits shared by several service instances use the
//! [`distributed`](crate::distributed) engine instead.

mod local_rate_limiter;
pub use local_rate_limiter::*;

mod local_rate_limiter_factory;
pub use local_rate_limiter_factory::*;
