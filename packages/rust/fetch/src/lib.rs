//! Courteous, fault-tolerant HTTP fetching.
//!
//! This crate provides:
//! - [`DomainGate`]: per-domain rate pacing and a robots.txt decision cache
//! - [`RobotsRules`]: robots.txt parsing and path evaluation
//! - [`Fetcher`]: timeout, retry-with-backoff and failure classification

pub mod fetcher;
pub mod gate;
pub mod outcome;
pub mod robots;

pub use fetcher::{FetchConfig, Fetcher};
pub use gate::{DomainGate, ROBOTS_TTL, domain_key};
pub use outcome::{FailureKind, FetchFailure, FetchOutcome, FetchSuccess};
pub use robots::{RobotsRule, RobotsRules};
