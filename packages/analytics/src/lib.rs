#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure computation for the risk pipeline.
//!
//! Two synchronous, lock-free functions: [`events::analyze`] derives an
//! hourly incident histogram and trend from raw events, and
//! [`score::score`] combines incident count, police presence, and
//! time-of-day context into a bounded numeric score. The aggregator
//! calls both directly once their inputs are available.

pub mod events;
pub mod score;

pub use score::DEFAULT_SAFE_WINDOW;
