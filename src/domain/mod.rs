//! Domain models - core types of the correlation engine
//!
//! This module contains the canonical data types used throughout the system:
//! - `ZoneId` - one physical sensing unit (camera)
//! - `PathId` - a named detection region with boolean occupancy
//! - `PairKey` - a (zone, start, end) correlation hypothesis
//! - `ReleaseReason` - classification of pair releases for observability

pub mod types;

pub use types::{PairKey, PathId, ReleaseReason, ZoneId};
