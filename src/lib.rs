#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rule;
pub use rule::*;

mod clock;
pub use clock::*;

mod common;
pub use common::LimitResult;

mod error;
pub use error::*;

mod factory;

mod rate_limiter;
pub use rate_limiter::*;

pub mod local;
pub use local::*;

pub mod distributed;
pub use distributed::*;

#[cfg(feature = "redis-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
pub mod redis;
#[cfg(feature = "redis-tokio")]
pub use crate::redis::*;

#[cfg(test)]
mod tests;
