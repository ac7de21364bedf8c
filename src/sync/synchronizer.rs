//! Approximate-time pairing of color and depth frames.
//!
//! # Policy
//!
//! Frames are examined oldest first. The oldest buffered frame `h` is paired
//! with the closest frame `p` of the other stream when `|h - p| <= tolerance`,
//! but only once the pair is final:
//!
//! ```text
//! other stream newest >= h + gap    (no future frame can be closer to h)
//! own stream newest   >= p + gap    (no future frame can be closer to p)
//! ```
//!
//! If a newer frame of `h`'s own stream is already closer to `p`, `h` loses
//! `p` and is evicted. A frame whose other stream has moved past
//! `capture_time + tolerance` without a partner is aged out. Committing a pair
//! evicts every older frame of both streams, so pair times strictly increase.
//!
//! Drops are normal operation under rate mismatch and are only counted.
//!
//! Within a stream, frames are expected in capture order. A frame not newer
//! than what the stream has already consumed is stale and dropped.

use std::collections::VecDeque;

use tracing::trace;

use crate::io::frame::{Modality, TimestampedFrame};

/// One color and one depth frame representing the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub color: TimestampedFrame,
    pub depth: TimestampedFrame,
    /// Color capture time.
    pub pair_time_ns: u64,
}

impl MatchedPair {
    pub fn gap_ns(&self) -> u64 {
        self.color
            .capture_time_ns
            .abs_diff(self.depth.capture_time_ns)
    }
}

/// Counters for frames that never made it into a pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pairs: u64,
    /// No partner within tolerance before the other stream moved on.
    pub aged_out: u64,
    /// Partner taken by a closer frame of the same stream.
    pub outmatched: u64,
    /// Evicted because a newer pair was committed, or the buffer was full.
    pub evicted: u64,
    /// Arrived after its stream had already moved past it.
    pub stale: u64,
}

impl SyncStats {
    pub fn dropped(&self) -> u64 {
        self.aged_out + self.outmatched + self.evicted + self.stale
    }
}

#[derive(Debug)]
struct StreamQueue {
    /// Sorted by capture time.
    frames: VecDeque<TimestampedFrame>,
    /// Newest capture time ever pushed.
    newest_ns: Option<u64>,
    /// Capture time of the last frame used in a pair or evicted by one.
    consumed_ns: Option<u64>,
}

impl StreamQueue {
    fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            newest_ns: None,
            consumed_ns: None,
        }
    }

    fn insert(&mut self, frame: TimestampedFrame) {
        let t = frame.capture_time_ns;
        let idx = self.frames.partition_point(|f| f.capture_time_ns <= t);
        self.frames.insert(idx, frame);
        self.newest_ns = Some(self.newest_ns.map_or(t, |n| n.max(t)));
    }

    /// Whether this stream has seen a frame at or after `t`.
    fn reached(&self, t: u64, flushing: bool) -> bool {
        flushing || self.newest_ns.is_some_and(|n| n >= t)
    }

    /// Index of the frame closest to `t`; ties go to the older frame.
    fn closest_to(&self, t: u64) -> Option<(usize, u64)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, f)| (i, f.capture_time_ns.abs_diff(t)))
            .min_by_key(|&(i, gap)| (gap, i))
    }
}

/// Approximate-time synchronizer for the color and depth streams.
#[derive(Debug)]
pub struct ApproximateTimeSync {
    tolerance_ns: u64,
    queue_size: usize,
    color: StreamQueue,
    depth: StreamQueue,
    last_pair_ns: Option<u64>,
    stats: SyncStats,
}

impl ApproximateTimeSync {
    /// `queue_size` bounds each stream's buffer; it is clamped to at least 1.
    pub fn new(tolerance_ns: u64, queue_size: usize) -> Self {
        Self {
            tolerance_ns,
            queue_size: queue_size.max(1),
            color: StreamQueue::new(),
            depth: StreamQueue::new(),
            last_pair_ns: None,
            stats: SyncStats::default(),
        }
    }

    pub fn tolerance_ns(&self) -> u64 {
        self.tolerance_ns
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Number of frames currently buffered (color, depth).
    pub fn buffered(&self) -> (usize, usize) {
        (self.color.frames.len(), self.depth.frames.len())
    }

    /// Buffer one frame and return every pair that became final, oldest first.
    pub fn push(&mut self, frame: TimestampedFrame) -> Vec<MatchedPair> {
        let modality = frame.modality;
        let t = frame.capture_time_ns;

        let queue = self.queue_mut(modality);
        if queue.consumed_ns.is_some_and(|c| t <= c) {
            trace!(%modality, t, "stale frame dropped");
            self.stats.stale += 1;
            return Vec::new();
        }
        queue.insert(frame);

        let mut overflow = 0;
        let queue_size = self.queue_size;
        let queue = self.queue_mut(modality);
        while queue.frames.len() > queue_size {
            if let Some(old) = queue.frames.pop_front() {
                queue.consumed_ns = Some(old.capture_time_ns);
                trace!(%modality, t = old.capture_time_ns, "buffer full, oldest frame dropped");
                overflow += 1;
            }
        }
        self.stats.evicted += overflow;

        self.drain(false)
    }

    /// Treat both streams as finished: emit whatever can still pair, then
    /// clear the buffers.
    pub fn flush(&mut self) -> Vec<MatchedPair> {
        let pairs = self.drain(true);
        let leftover = (self.color.frames.len() + self.depth.frames.len()) as u64;
        if leftover > 0 {
            trace!(leftover, "unpaired frames dropped at flush");
            self.stats.aged_out += leftover;
        }
        self.color.frames.clear();
        self.depth.frames.clear();
        pairs
    }

    fn queue(&self, modality: Modality) -> &StreamQueue {
        match modality {
            Modality::Color => &self.color,
            Modality::Depth => &self.depth,
        }
    }

    fn queue_mut(&mut self, modality: Modality) -> &mut StreamQueue {
        match modality {
            Modality::Color => &mut self.color,
            Modality::Depth => &mut self.depth,
        }
    }

    /// Oldest buffered frame across both streams (color wins ties).
    fn oldest(&self) -> Option<(Modality, u64)> {
        let c = self.color.frames.front().map(|f| f.capture_time_ns);
        let d = self.depth.frames.front().map(|f| f.capture_time_ns);
        match (c, d) {
            (Some(c), Some(d)) if d < c => Some((Modality::Depth, d)),
            (Some(c), _) => Some((Modality::Color, c)),
            (None, Some(d)) => Some((Modality::Depth, d)),
            (None, None) => None,
        }
    }

    fn drain(&mut self, flushing: bool) -> Vec<MatchedPair> {
        let mut out = Vec::new();

        while let Some((own, head_t)) = self.oldest() {
            let other = own.other();

            let candidate = self
                .queue(other)
                .closest_to(head_t)
                .filter(|&(_, gap)| gap <= self.tolerance_ns);

            let Some((partner_idx, gap)) = candidate else {
                // Nothing in tolerance yet. Once the other stream is past the
                // window nothing ever will be.
                if self
                    .queue(other)
                    .reached(head_t.saturating_add(self.tolerance_ns).saturating_add(1), flushing)
                {
                    self.queue_mut(own).frames.pop_front();
                    trace!(modality = %own, t = head_t, "no partner within tolerance, aged out");
                    self.stats.aged_out += 1;
                    continue;
                }
                break;
            };

            let partner_t = self.queue(other).frames[partner_idx].capture_time_ns;

            // A newer frame of the head's own stream already sits closer to the partner.
            let outmatched = self
                .queue(own)
                .frames
                .iter()
                .skip(1)
                .any(|f| f.capture_time_ns.abs_diff(partner_t) < gap);
            if outmatched {
                self.queue_mut(own).frames.pop_front();
                trace!(modality = %own, t = head_t, "partner is closer to a newer frame");
                self.stats.outmatched += 1;
                continue;
            }

            let final_for_head = self.queue(other).reached(head_t.saturating_add(gap), flushing);
            let final_for_partner = self.queue(own).reached(partner_t.saturating_add(gap), flushing);
            if !(final_for_head && final_for_partner) {
                break;
            }

            match self.commit(own, other, partner_idx) {
                Some(pair) => out.push(pair),
                None => break,
            }
        }

        out
    }

    /// Remove the head of `own` and `partner_idx` of `other`, evict everything
    /// older, and build the pair.
    fn commit(&mut self, own: Modality, other: Modality, partner_idx: usize) -> Option<MatchedPair> {
        let mut evicted = partner_idx as u64;

        let partner_queue = self.queue_mut(other);
        partner_queue.frames.drain(..partner_idx);
        let partner = partner_queue.frames.pop_front()?;
        partner_queue.consumed_ns = Some(partner.capture_time_ns);

        let head_queue = self.queue_mut(own);
        let head = head_queue.frames.pop_front()?;
        head_queue.consumed_ns = Some(head.capture_time_ns);

        let (color, depth) = match own {
            Modality::Color => (head, partner),
            Modality::Depth => (partner, head),
        };

        // Anything still buffered but older than its stream's committed frame
        // would break pair ordering.
        for modality in [Modality::Color, Modality::Depth] {
            let cutoff = match modality {
                Modality::Color => color.capture_time_ns,
                Modality::Depth => depth.capture_time_ns,
            };
            let queue = self.queue_mut(modality);
            while queue.frames.front().is_some_and(|f| f.capture_time_ns <= cutoff) {
                queue.frames.pop_front();
                evicted += 1;
            }
        }
        if evicted > 0 {
            trace!(evicted, "older frames evicted by committed pair");
        }
        self.stats.evicted += evicted;
        self.stats.pairs += 1;

        let pair_time_ns = color.capture_time_ns;
        debug_assert!(self.last_pair_ns.is_none_or(|last| pair_time_ns > last));
        self.last_pair_ns = Some(pair_time_ns);

        Some(MatchedPair {
            color,
            depth,
            pair_time_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::frame::{PixelBuffer, PixelEncoding};

    const MS: u64 = 1_000_000;

    fn frame(modality: Modality, t_ms: u64) -> TimestampedFrame {
        let encoding = match modality {
            Modality::Color => PixelEncoding::Mono8,
            Modality::Depth => PixelEncoding::Depth16,
        };
        TimestampedFrame {
            capture_time_ns: t_ms * MS,
            modality,
            pixels: PixelBuffer {
                width: 1,
                height: 1,
                encoding,
                data: vec![0; encoding.bytes_per_pixel()],
            },
        }
    }

    fn color(t_ms: u64) -> TimestampedFrame {
        frame(Modality::Color, t_ms)
    }

    fn depth(t_ms: u64) -> TimestampedFrame {
        frame(Modality::Depth, t_ms)
    }

    fn times(pairs: &[MatchedPair]) -> Vec<(u64, u64)> {
        pairs
            .iter()
            .map(|p| (p.color.capture_time_ns / MS, p.depth.capture_time_ns / MS))
            .collect()
    }

    /// Push frames in order and collect every emitted pair, then flush.
    fn run(sync: &mut ApproximateTimeSync, frames: Vec<TimestampedFrame>) -> Vec<MatchedPair> {
        let mut pairs = Vec::new();
        for f in frames {
            pairs.extend(sync.push(f));
        }
        pairs.extend(sync.flush());
        pairs
    }

    #[test]
    fn test_pair_within_tolerance_emitted_once() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);

        assert!(sync.push(color(100)).is_empty());
        assert!(sync.push(depth(105)).is_empty());
        // both streams move past the candidate window
        let mut pairs = sync.push(color(133));
        pairs.extend(sync.push(depth(138)));
        pairs.extend(sync.flush());

        assert_eq!(times(&pairs), vec![(100, 105), (133, 138)]);
        assert_eq!(pairs[0].pair_time_ns, 100 * MS);
        assert_eq!(sync.stats().pairs, 2);
    }

    #[test]
    fn test_pair_waits_until_final() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        assert!(sync.push(color(100)).is_empty());
        assert!(sync.push(depth(110)).is_empty());

        // color stream has not reached 110 + 10, a closer color could still come
        assert!(sync.push(depth(140)).is_empty());
        assert_eq!(sync.buffered(), (1, 2));

        let pairs = sync.push(color(125));
        assert_eq!(times(&pairs), vec![(100, 110)]);
        assert_eq!(sync.buffered(), (1, 1));
    }

    #[test]
    fn test_frames_beyond_tolerance_never_pair() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        let pairs = run(&mut sync, vec![color(100), depth(150), color(200), depth(260)]);

        assert!(pairs.is_empty());
        assert_eq!(sync.stats().pairs, 0);
        assert_eq!(sync.stats().dropped(), 4);
        assert_eq!(sync.buffered(), (0, 0));
    }

    #[test]
    fn test_closest_candidate_wins() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        let pairs = run(&mut sync, vec![depth(90), depth(102), color(100), depth(118), color(130)]);

        // 90 is older and farther; 102 beats it for color 100
        assert_eq!(times(&pairs)[0], (100, 102));
    }

    #[test]
    fn test_older_frame_outmatched_by_newer_same_stream_frame() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        let pairs = run(&mut sync, vec![color(100), color(115), depth(114), depth(150), color(160)]);

        // depth 114 prefers color 115; color 100 loses it
        assert_eq!(times(&pairs), vec![(115, 114), (160, 150)]);
        assert_eq!(sync.stats().outmatched, 1);
    }

    #[test]
    fn test_interleaving_does_not_change_result() {
        let a = run(
            &mut ApproximateTimeSync::new(15 * MS, 10),
            vec![color(0), color(33), color(66), color(100), depth(5), depth(38), depth(71), depth(104)],
        );
        let b = run(
            &mut ApproximateTimeSync::new(15 * MS, 10),
            vec![depth(5), color(0), depth(38), color(33), color(66), depth(71), depth(104), color(100)],
        );

        assert_eq!(times(&a), vec![(0, 5), (33, 38), (66, 71), (100, 104)]);
        assert_eq!(times(&a), times(&b));
    }

    #[test]
    fn test_pair_times_strictly_increase_under_rate_mismatch() {
        let mut sync = ApproximateTimeSync::new(10 * MS, 10);
        let mut frames = Vec::new();
        for i in 0..30 {
            frames.push(color(i * 33));
        }
        for i in 0..50 {
            frames.push(depth(i * 20 + 3));
        }
        frames.sort_by_key(|f| f.capture_time_ns);

        let pairs = run(&mut sync, frames);
        assert!(!pairs.is_empty());
        for w in pairs.windows(2) {
            assert!(w[1].pair_time_ns > w[0].pair_time_ns);
        }
        for p in &pairs {
            assert!(p.gap_ns() <= 10 * MS);
            assert_eq!(p.pair_time_ns, p.color.capture_time_ns);
        }
    }

    #[test]
    fn test_stale_frame_dropped() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        let pairs = run(&mut sync, vec![color(100), depth(100), color(140), depth(140)]);
        assert_eq!(pairs.len(), 2);

        assert!(sync.push(color(90)).is_empty());
        assert_eq!(sync.stats().stale, 1);
        assert_eq!(sync.buffered(), (0, 0));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut sync = ApproximateTimeSync::new(5 * MS, 3);
        for i in 0..10 {
            sync.push(color(i * 10));
        }

        assert_eq!(sync.buffered(), (3, 0));
        assert_eq!(sync.stats().evicted, 7);
    }

    #[test]
    fn test_single_stream_flush_drops_everything() {
        let mut sync = ApproximateTimeSync::new(5 * MS, 10);
        let pairs = run(&mut sync, vec![color(0), color(10)]);

        assert!(pairs.is_empty());
        assert_eq!(sync.stats().aged_out, 2);
    }

    #[test]
    fn test_exact_tolerance_boundary_pairs() {
        let mut sync = ApproximateTimeSync::new(20 * MS, 10);
        let pairs = run(&mut sync, vec![color(100), depth(120)]);

        assert_eq!(times(&pairs), vec![(100, 120)]);
    }
}
