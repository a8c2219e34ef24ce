//! Frame-timeline bookkeeping shared by the decode, mix and UI threads.
//!
//! [`PositionMap`] records which destination (output) frame each decoded
//! source frame landed on, so "what is audible right now" can be answered
//! while the playback ratio changes underneath. [`SharedPositionMap`] wraps it
//! for one writer and any number of readers.

pub mod constants;
pub mod position_map;
pub mod shared;
pub mod throttle;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use position_map::{FrameRangeMapping, PositionMap};
pub use shared::SharedPositionMap;
pub use throttle::WarnThrottle;
pub use timeline::MappedPosition;
