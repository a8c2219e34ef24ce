use std::{collections::VecDeque, sync::Arc};

use log::warn;

use crate::{constants::BACKLOG_FRAMES, throttle::WarnThrottle, timeline::MappedPosition};

/// One linear span of the source-to-destination mapping.
///
/// For `source_frame <= x < source_frame + frame_count`:
/// `dest(x) = dest_frame + round((x - source_frame) * ratio)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRangeMapping {
    /// First source-stream frame covered.
    pub source_frame: i64,
    /// Destination frame that `source_frame` maps to.
    pub dest_frame: i64,
    /// Number of source frames covered.
    pub frame_count: i64,
    /// Destination frames produced per source frame.
    pub ratio: f64,
}

impl FrameRangeMapping {
    pub fn source_end(&self) -> i64 {
        self.source_frame + self.frame_count
    }

    pub fn contains(&self, source_frame: i64) -> bool {
        source_frame >= self.source_frame && source_frame < self.source_end()
    }

    pub fn dest_at(&self, source_frame: i64) -> i64 {
        self.dest_frame + scale(source_frame - self.source_frame, self.ratio)
    }

    /// Destination frame one past the end of this span.
    pub fn dest_end(&self) -> i64 {
        self.dest_frame + scale(self.frame_count, self.ratio)
    }
}

fn scale(frames: i64, ratio: f64) -> i64 {
    (frames as f64 * ratio).round() as i64
}

/// Piecewise-linear history of where source frames ended up on the output
/// timeline, bounded to the most recent `backlog` frames.
///
/// Entries are only ever appended at the back, merged into the back entry, or
/// evicted from the front. Cloning copies every entry, so a clone can be
/// searched without any lock while the original keeps growing; the
/// out-of-range warning throttle is shared between clones.
#[derive(Debug, Clone)]
pub struct PositionMap {
    entries: VecDeque<FrameRangeMapping>,
    backlog: i64,
    throttle: Arc<WarnThrottle>,
}

impl PositionMap {
    pub fn new() -> Self {
        Self::with_backlog(BACKLOG_FRAMES)
    }

    pub fn with_backlog(backlog: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            backlog,
            throttle: Arc::new(WarnThrottle::default()),
        }
    }

    /// Record that `frame_count` source frames starting at `source_frame` were
    /// emitted starting at `dest_frame`, at `ratio` destination frames per
    /// source frame.
    ///
    /// Extends the last entry instead when the new block continues it exactly
    /// in source frames, has the same ratio, and lands within one frame of
    /// where the last entry predicts.
    pub fn insert(&mut self, source_frame: i64, frame_count: i64, dest_frame: i64, ratio: f64) {
        debug_assert!(frame_count >= 0, "negative frame count {frame_count}");
        debug_assert!(ratio > 0.0, "non-positive ratio {ratio}");

        match self.entries.back_mut() {
            Some(last)
                if last.source_end() == source_frame
                    && last.ratio == ratio
                    && (last.dest_end() - dest_frame).abs() <= 1 =>
            {
                last.frame_count += frame_count;
            }
            _ => self.entries.push_back(FrameRangeMapping {
                source_frame,
                dest_frame,
                frame_count,
                ratio,
            }),
        }

        self.cleanup();
    }

    /// Drop every entry older than the one at which the newest entries first
    /// cover `backlog` frames.
    fn cleanup(&mut self) {
        let mut total = 0;
        let mut cut = 0;
        for (index, entry) in self.entries.iter().enumerate().rev() {
            total += entry.frame_count;
            if total >= self.backlog {
                cut = index;
                break;
            }
        }

        if cut > 0 {
            self.entries.drain(..cut);
        }
    }

    /// Map `source_frame` onto the destination timeline.
    ///
    /// Falls back to the closest recorded range boundary when the frame was
    /// never inserted (nothing decoded yet, past the end of the stream, or a
    /// decode underflow).
    pub fn search(&self, source_frame: i64) -> MappedPosition {
        if self.entries.is_empty() {
            return MappedPosition::approximate(0);
        }

        let mut closest_dest = 0;
        let mut closest_dist = u64::MAX;
        for entry in &self.entries {
            if entry.contains(source_frame) {
                return MappedPosition::exact(entry.dest_at(source_frame));
            }

            let dist = entry.source_frame.abs_diff(source_frame);
            if dist < closest_dist {
                closest_dist = dist;
                closest_dest = entry.dest_frame;
            }

            let dist = entry.source_end().abs_diff(source_frame);
            if dist < closest_dist {
                closest_dist = dist;
                closest_dest = entry.dest_end();
            }
        }

        if self.throttle.try_acquire() {
            warn!(
                "position map: source frame {source_frame} is outside {} recorded ranges, \
                 approximating with destination frame {closest_dest} ({closest_dist} frames away)",
                self.entries.len()
            );
        }

        MappedPosition::approximate(closest_dest)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn backlog(&self) -> i64 {
        self.backlog
    }

    pub fn entries(&self) -> impl Iterator<Item = &FrameRangeMapping> {
        self.entries.iter()
    }

    /// Source frames covered by every retained entry.
    pub fn total_frames(&self) -> i64 {
        self.entries.iter().map(|e| e.frame_count).sum()
    }
}

impl Default for PositionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::warnings_during;

    fn single_entry(map: &PositionMap) -> FrameRangeMapping {
        assert_eq!(map.len(), 1, "expected exactly one entry: {map:?}");
        *map.entries().next().unwrap()
    }

    #[test]
    fn test_contiguous_inserts_merge_into_one_entry() {
        let mut map = PositionMap::new();
        map.insert(100, 441, 5000, 1.5);
        map.insert(541, 300, 5000 + (441.0f64 * 1.5).round() as i64, 1.5);

        let entry = single_entry(&map);
        assert_eq!(entry.source_frame, 100);
        assert_eq!(entry.frame_count, 741);
        assert_eq!(entry.dest_frame, 5000);
        assert_eq!(entry.ratio, 1.5);
    }

    #[test]
    fn test_merge_tolerates_one_frame_of_drift() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(100, 100, 101, 1.0);
        map.insert(200, 100, 199, 1.0);

        let entry = single_entry(&map);
        assert_eq!(entry.frame_count, 300);
        assert_eq!(entry.dest_frame, 0);
    }

    #[test]
    fn test_merge_rejected_on_ratio_change() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(100, 100, 100, 1.25);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_merge_rejected_on_source_gap() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(101, 100, 100, 1.0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_merge_rejected_on_source_overlap() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(99, 100, 100, 1.0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_merge_rejected_when_dest_drifts_more_than_one_frame() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(100, 100, 102, 1.0);
        map.insert(200, 100, 200, 1.0);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_search_in_range_is_exact() {
        let mut map = PositionMap::new();
        map.insert(1000, 400, 20, 0.5);

        for x in [1000, 1001, 1003, 1200, 1399] {
            let expected = 20 + ((x - 1000) as f64 * 0.5).round() as i64;
            assert_eq!(map.search(x), MappedPosition::exact(expected));
        }
    }

    #[test]
    fn test_search_resolves_each_span_with_its_own_ratio() {
        let mut map = PositionMap::new();
        map.insert(0, 1000, 0, 1.0);
        map.insert(1000, 1000, 1000, 2.0);
        map.insert(2000, 1000, 3000, 0.5);

        assert_eq!(map.search(999), MappedPosition::exact(999));
        assert_eq!(map.search(1500), MappedPosition::exact(2000));
        assert_eq!(map.search(2500), MappedPosition::exact(3250));
    }

    #[test]
    fn test_search_on_empty_map_is_approximate_zero() {
        let map = PositionMap::new();
        assert_eq!(map.search(12345), MappedPosition::approximate(0));
    }

    #[test]
    fn test_search_past_the_end_snaps_to_last_boundary() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 50, 2.0);

        // end boundary: source 100 -> dest 50 + 200
        assert_eq!(map.search(180), MappedPosition::approximate(250));
        assert_eq!(map.search(100), MappedPosition::approximate(250));
    }

    #[test]
    fn test_search_before_the_start_snaps_to_first_boundary() {
        let mut map = PositionMap::new();
        map.insert(500, 100, 7000, 1.0);
        map.insert(600, 100, 9000, 1.0);

        assert_eq!(map.search(10), MappedPosition::approximate(7000));
    }

    #[test]
    fn test_search_in_gap_picks_nearest_boundary() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        map.insert(300, 100, 1000, 1.0);

        // 130 is 30 frames past the first end, 170 frames before the second start
        assert_eq!(map.search(130), MappedPosition::approximate(100));
        // 280 is 20 frames before the second start
        assert_eq!(map.search(280), MappedPosition::approximate(1000));
    }

    #[test]
    fn test_cleanup_keeps_at_least_backlog_frames() {
        let mut map = PositionMap::new();
        let block = 4096;
        let mut total = 0;
        for i in 0..200 {
            // alternate ratios so nothing merges
            let ratio = if i % 2 == 0 { 1.0 } else { 1.001 };
            map.insert(i * block, block, i * block, ratio);
            total += block;
        }

        assert!(total > BACKLOG_FRAMES);
        assert!(map.total_frames() >= BACKLOG_FRAMES);
        assert!(map.total_frames() < total);
        // the retained entries are the newest ones
        let newest = map.entries().last().unwrap();
        assert_eq!(newest.source_frame, 199 * block);
    }

    #[test]
    fn test_cleanup_drops_everything_older_than_cut_point() {
        let mut map = PositionMap::with_backlog(250);
        map.insert(0, 100, 0, 1.0);
        map.insert(200, 100, 200, 1.0);
        map.insert(400, 100, 400, 1.0);
        assert_eq!(map.len(), 3);

        map.insert(600, 100, 600, 1.0);
        let sources: Vec<_> = map.entries().map(|e| e.source_frame).collect();
        assert_eq!(sources, vec![200, 400, 600]);
    }

    #[test]
    fn test_cleanup_never_drops_a_single_large_entry() {
        let mut map = PositionMap::with_backlog(100);
        map.insert(0, 10_000, 0, 1.0);
        assert_eq!(map.len(), 1);
        assert_eq!(map.search(9_999), MappedPosition::exact(9_999));
    }

    #[test]
    fn test_clear_empties_the_map() {
        let mut map = PositionMap::new();
        map.insert(0, 10, 0, 1.0);
        assert!(!map.is_empty());

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.search(5), MappedPosition::approximate(0));
    }

    #[test]
    fn test_clone_is_independent_of_original() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);

        let snapshot = map.clone();
        map.insert(100, 100, 100, 1.0);
        map.insert(500, 100, 900, 1.0);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.total_frames(), 100);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_search_far_outside_the_range_does_not_overflow() {
        let mut map = PositionMap::new();
        map.insert(1_000, 100, 0, 1.0);

        assert_eq!(map.search(i64::MIN), MappedPosition::approximate(0));
        assert_eq!(map.search(i64::MAX), MappedPosition::approximate(100));
    }

    #[test]
    fn test_out_of_range_searches_warn_once_per_interval() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);

        let ((), warnings) = warnings_during(|| {
            for x in 200..1_200 {
                map.search(x);
            }
        });
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("source frame 200"));
    }

    #[test]
    fn test_in_range_searches_do_not_warn() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);

        let ((), warnings) = warnings_during(|| {
            for x in 0..100 {
                map.search(x);
            }
        });
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_clones_share_the_warning_interval() {
        let mut map = PositionMap::new();
        map.insert(0, 100, 0, 1.0);
        let copy = map.clone();

        let (_, first) = warnings_during(|| map.search(500));
        let (_, second) = warnings_during(|| copy.search(500));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
