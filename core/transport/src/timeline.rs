/// Result of resolving a source frame against a [`PositionMap`](crate::PositionMap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPosition {
    /// Frame on the destination (output) timeline.
    pub dest_frame: i64,
    /// `true` when the source frame was outside every recorded range and
    /// `dest_frame` is the nearest known boundary instead of an exact mapping.
    pub approximate: bool,
}

impl MappedPosition {
    pub const fn exact(dest_frame: i64) -> Self {
        Self {
            dest_frame,
            approximate: false,
        }
    }

    pub const fn approximate(dest_frame: i64) -> Self {
        Self {
            dest_frame,
            approximate: true,
        }
    }
}
