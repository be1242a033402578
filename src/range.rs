//! Page ranges: validation of a requested range against document bounds.
//!
//! All ranges inside the library are **zero-indexed and inclusive**. The CLI
//! speaks 1-indexed page numbers; [`PageRange::from_one_indexed`] is the only
//! place that converts between the two conventions.

use crate::error::ScribeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// A contiguous, inclusive, zero-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    start: usize,
    end: usize,
}

impl PageRange {
    /// Build a range from already-known bounds.
    ///
    /// Fails when `end < start`. Bounds are not checked against any document.
    pub fn new(start: usize, end: usize) -> Result<Self, ScribeError> {
        if end < start {
            return Err(ScribeError::InvalidRange {
                start: Some(start as i64),
                end: Some(end as i64),
                total_pages: 0,
                reason: "end is before start".into(),
            });
        }
        Ok(Self { start, end })
    }

    /// Resolve a requested range against a document with `total_pages` pages.
    ///
    /// An absent `start` means the first page; an absent `end` means the last
    /// page. Fails with [`ScribeError::InvalidRange`] when a bound is negative,
    /// when `end < start`, or when `end` falls outside the document.
    pub fn resolve(
        start: Option<i64>,
        end: Option<i64>,
        total_pages: usize,
    ) -> Result<Self, ScribeError> {
        let invalid = |reason: String| ScribeError::InvalidRange {
            start,
            end,
            total_pages,
            reason,
        };

        if total_pages == 0 {
            return Err(invalid("document has no pages".into()));
        }

        let first = start.unwrap_or(0);
        let last = end.unwrap_or(total_pages as i64 - 1);

        if first < 0 {
            return Err(invalid(format!("start page index {first} is negative")));
        }
        if last < 0 {
            return Err(invalid(format!("end page index {last} is negative")));
        }
        if last < first {
            return Err(invalid("end is before start".into()));
        }
        if last as u64 >= total_pages as u64 {
            return Err(invalid(format!(
                "end page index {last} is past the last page index {}",
                total_pages - 1
            )));
        }

        let range = Self {
            start: first as usize,
            end: last as usize,
        };
        info!(
            "Resolved {} of {} ({} pages)",
            range,
            total_pages,
            range.page_count()
        );
        Ok(range)
    }

    /// Resolve 1-indexed inclusive page numbers as typed by a user.
    ///
    /// `Some(0)` is rejected like any other negative zero-indexed bound.
    pub fn from_one_indexed(
        first_page: Option<i64>,
        last_page: Option<i64>,
        total_pages: usize,
    ) -> Result<Self, ScribeError> {
        Self::resolve(
            Self::zero_indexed(first_page),
            Self::zero_indexed(last_page),
            total_pages,
        )
    }

    /// Convert a 1-indexed page bound to the zero-indexed convention.
    ///
    /// Saturates at `i64::MIN`, which [`PageRange::resolve`] then rejects as
    /// negative.
    pub fn zero_indexed(page: Option<i64>) -> Option<i64> {
        page.map(|p| p.saturating_sub(1))
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// `end − start`, the quantity the chunk-size policy is expressed in.
    pub fn span(&self) -> usize {
        self.end - self.start
    }

    /// Number of pages covered (always ≥ 1).
    pub fn page_count(&self) -> usize {
        self.span() + 1
    }

    pub(crate) fn from_bounds(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Zero-indexed page indices in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = usize> {
        self.start..=self.end
    }
}

/// Displays the range as 1-indexed page numbers, e.g. `pages 1-5`.
impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "page {}", self.start + 1)
        } else {
            write!(f, "pages {}-{}", self.start + 1, self.end + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(result: Result<PageRange, ScribeError>) {
        match result {
            Err(ScribeError::InvalidRange { .. }) => {}
            other => panic!("expected InvalidRange, got {other:?}"),
        }
    }

    #[test]
    fn defaults_cover_whole_document() {
        let r = PageRange::resolve(None, None, 42).unwrap();
        assert_eq!((r.start(), r.end()), (0, 41));
        assert_eq!(r.page_count(), 42);
    }

    #[test]
    fn valid_bounds_are_returned_unchanged() {
        for total in 1..12usize {
            for start in 0..total {
                for end in start..total {
                    let r = PageRange::resolve(Some(start as i64), Some(end as i64), total)
                        .unwrap();
                    assert_eq!((r.start(), r.end()), (start, end));
                }
            }
        }
    }

    #[test]
    fn everything_else_is_rejected() {
        for total in 0..8i64 {
            for start in -2..10i64 {
                for end in -2..10i64 {
                    let valid = start >= 0 && start <= end && end < total;
                    let result = PageRange::resolve(Some(start), Some(end), total as usize);
                    assert_eq!(result.is_ok(), valid, "start={start} end={end} total={total}");
                }
            }
        }
    }

    #[test]
    fn empty_document_is_rejected() {
        assert_invalid(PageRange::resolve(None, None, 0));
    }

    #[test]
    fn open_end_with_start_past_last_page() {
        assert_invalid(PageRange::resolve(Some(10), None, 5));
    }

    #[test]
    fn one_indexed_conversion() {
        let r = PageRange::from_one_indexed(Some(3), Some(7), 10).unwrap();
        assert_eq!((r.start(), r.end()), (2, 6));
        assert_invalid(PageRange::from_one_indexed(Some(0), None, 10));
        assert_invalid(PageRange::from_one_indexed(None, Some(11), 10));
    }

    #[test]
    fn one_indexed_extremes_are_rejected_not_wrapped() {
        assert_invalid(PageRange::from_one_indexed(Some(i64::MIN), None, 10));
        assert_invalid(PageRange::from_one_indexed(None, Some(i64::MIN), 10));
        assert_invalid(PageRange::from_one_indexed(Some(1), Some(i64::MAX), 10));
        assert_eq!(PageRange::zero_indexed(Some(i64::MIN)), Some(i64::MIN));
        assert_eq!(PageRange::zero_indexed(None), None);
    }

    #[test]
    fn new_rejects_reversed_bounds() {
        assert!(PageRange::new(3, 3).is_ok());
        assert_invalid(PageRange::new(4, 3));
    }

    #[test]
    fn display_is_one_indexed() {
        assert_eq!(PageRange::new(0, 4).unwrap().to_string(), "pages 1-5");
        assert_eq!(PageRange::new(9, 9).unwrap().to_string(), "page 10");
    }
}
