//! Chunk planning: split a page range into render-sized sub-ranges.
//!
//! One render call per chunk amortises the fixed per-call overhead of the
//! renderer, while the upper bound keeps a single call from producing an
//! unreasonably large batch of images. The size scales with the document so a
//! nominal book needs about twenty calls.

use crate::range::PageRange;
use serde::Serialize;

/// Smallest chunk the planner will produce (except for a short tail).
pub const MIN_CHUNK: usize = 5;

/// Largest chunk the planner will produce.
pub const MAX_CHUNK: usize = 25;

/// Target number of chunks for a nominal document.
const TARGET_CHUNKS: usize = 20;

/// Chunk size for a range: `clamp(floor((span + 1) / 20), 5, 25)` where
/// `span = end − start`.
pub fn chunk_size(range: &PageRange) -> usize {
    ((range.span() + 1) / TARGET_CHUNKS).clamp(MIN_CHUNK, MAX_CHUNK)
}

/// Ordered, gap-free, non-overlapping cover of a [`PageRange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    range: PageRange,
    chunk_size: usize,
    chunks: Vec<PageRange>,
}

impl ChunkPlan {
    /// Plan the chunks for `range`. Pure: the same range always yields the
    /// same plan.
    pub fn for_range(range: PageRange) -> Self {
        let size = chunk_size(&range);
        let mut chunks = Vec::with_capacity(range.page_count().div_ceil(size));

        let mut start = range.start();
        loop {
            let end = (start + size - 1).min(range.end());
            chunks.push(PageRange::from_bounds(start, end));
            if end >= range.end() {
                break;
            }
            start = end + 1;
        }

        Self {
            range,
            chunk_size: size,
            chunks,
        }
    }

    pub fn range(&self) -> PageRange {
        self.range
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[PageRange] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize) -> PageRange {
        PageRange::new(start, end).unwrap()
    }

    fn bounds(plan: &ChunkPlan) -> Vec<(usize, usize)> {
        plan.chunks().iter().map(|c| (c.start(), c.end())).collect()
    }

    #[test]
    fn forty_two_page_document() {
        let plan = ChunkPlan::for_range(range(0, 41));
        assert_eq!(plan.chunk_size(), 5);
        assert_eq!(
            bounds(&plan),
            vec![
                (0, 4),
                (5, 9),
                (10, 14),
                (15, 19),
                (20, 24),
                (25, 29),
                (30, 34),
                (35, 39),
                (40, 41)
            ]
        );
    }

    #[test]
    fn single_page_range_yields_one_chunk() {
        let plan = ChunkPlan::for_range(range(7, 7));
        assert_eq!(bounds(&plan), vec![(7, 7)]);
    }

    #[test]
    fn chunk_size_is_clamped() {
        assert_eq!(chunk_size(&range(0, 0)), MIN_CHUNK);
        assert_eq!(chunk_size(&range(0, 199)), 10);
        assert_eq!(chunk_size(&range(0, 218)), 10); // floor(219 / 20)
        assert_eq!(chunk_size(&range(0, 999)), MAX_CHUNK);
        assert_eq!(chunk_size(&range(100, 5000)), MAX_CHUNK);
    }

    #[test]
    fn chunk_ending_exactly_on_range_end() {
        // span 5 → size 5: the last page must still be covered.
        let plan = ChunkPlan::for_range(range(0, 5));
        assert_eq!(bounds(&plan), vec![(0, 4), (5, 5)]);
        let plan = ChunkPlan::for_range(range(0, 9));
        assert_eq!(bounds(&plan), vec![(0, 4), (5, 9)]);
    }

    #[test]
    fn plans_cover_range_exactly() {
        for start in [0usize, 1, 13] {
            for span in 0..700usize {
                let r = range(start, start + span);
                let plan = ChunkPlan::for_range(r);
                let size = chunk_size(&r);

                let mut next = start;
                for chunk in plan.chunks() {
                    assert_eq!(chunk.start(), next, "gap or overlap in {r:?}");
                    assert!(chunk.page_count() <= size);
                    next = chunk.end() + 1;
                }
                assert_eq!(next, r.end() + 1, "plan for {r:?} stops early");
            }
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let r = range(3, 311);
        assert_eq!(ChunkPlan::for_range(r), ChunkPlan::for_range(r));
    }
}
