use std::time::Duration;

/// Frames of mapping history kept by a [`PositionMap`](crate::PositionMap)
/// after cleanup. Older entries are evicted once the newest entries cover at
/// least this many source frames.
pub const BACKLOG_FRAMES: i64 = 200_000;

/// Minimum spacing between two "out of range" diagnostics from one map.
pub const SEARCH_WARN_INTERVAL: Duration = Duration::from_secs(1);
