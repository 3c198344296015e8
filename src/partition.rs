use std::fmt;

use crate::assembler::{AssemblyError, AssemblyResult};

/// Default upper bound on the width of one scanned sub-interval, in bp.
pub const MAX_BLOCK_SIZE: u64 = 100_000;

/// A genomic interval with a start and end position (0-based, half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// 0-based start.
    pub start: u64,
    /// Exclusive end.
    pub end: u64,
}

impl Interval {
    /// Creates `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns the width of the interval.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the interval is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns true if `[start, end)` reaches outside this interval.
    #[inline]
    pub fn spills(&self, start: u64, end: u64) -> bool {
        start < self.start || end > self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A requested region of one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    /// Chromosome name.
    pub chrom: String,
    /// 0-based start.
    pub start: u64,
    /// Exclusive end.
    pub end: u64,
}

impl Region {
    /// Creates a region of `chrom` spanning `[start, end)`.
    pub fn new<S: Into<String>>(chrom: S, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Returns the coordinates of the region.
    #[inline]
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// Splits `[start, end)` into contiguous sub-intervals for parallel scanning.
///
/// Every sub-interval is `max_block_size` wide except the last, which ends
/// at `end`. The count is capped at `max_workers`; when the cap applies the
/// last sub-interval absorbs the remainder. A zero-length interval yields a
/// single empty sub-interval.
///
/// # Errors
///
/// Fails when `start > end`, or when `max_workers` or `max_block_size` is
/// zero.
///
/// # Example
///
/// ```
/// use genetrack::partition::{partition, Interval};
///
/// let parts = partition(Interval::new(0, 250), 8, 100).unwrap();
/// assert_eq!(
///     parts,
///     vec![Interval::new(0, 100), Interval::new(100, 200), Interval::new(200, 250)]
/// );
/// ```
pub fn partition(
    interval: Interval,
    max_workers: usize,
    max_block_size: u64,
) -> AssemblyResult<Vec<Interval>> {
    if interval.start > interval.end {
        return Err(AssemblyError::InvalidRegion {
            start: interval.start,
            end: interval.end,
        });
    }
    if max_workers == 0 {
        return Err(AssemblyError::InvalidInput(
            "ERROR: at least one worker is required".into(),
        ));
    }
    if max_block_size == 0 {
        return Err(AssemblyError::InvalidInput(
            "ERROR: block size must be greater than 0".into(),
        ));
    }

    let blocks = interval.len().div_ceil(max_block_size).max(1);
    let count = blocks.min(max_workers as u64);

    let mut parts = Vec::with_capacity(count as usize);
    for idx in 0..count {
        let start = interval.start + idx * max_block_size;
        let end = if idx + 1 == count {
            interval.end
        } else {
            start + max_block_size
        };
        parts.push(Interval::new(start, end));
    }

    Ok(parts)
}
