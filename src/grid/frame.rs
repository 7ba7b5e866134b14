//! Frame - one complete grid of raw samples
//!
//! Samples are stored row-major: the sample for (row, col) lives at
//! `row * cols + col`. Frames are only built from scans that wrote every
//! cell; an aborted scan surfaces as `GridError::PartialFrame` instead.
//! Cells written with the timeout sentinel are counted in
//! [`Frame::substituted`] so they can be told apart from real readings.

use std::time::Duration;

use serde::Serialize;

use super::Sample;

/// Complete row-major grid of samples from one scan cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    rows: usize,
    cols: usize,
    /// Per-engine counter, 1 for the first complete frame
    sequence: u64,
    /// Wall time spent scanning
    elapsed: Duration,
    /// Cells holding the timeout sentinel instead of a conversion
    substituted: usize,
    samples: Vec<Sample>,
}

impl Frame {
    pub(crate) fn new(
        rows: usize,
        cols: usize,
        samples: Vec<Sample>,
        summary: &ScanSummary,
    ) -> Self {
        debug_assert_eq!(samples.len(), rows * cols);
        Self {
            rows,
            cols,
            sequence: summary.sequence,
            elapsed: summary.elapsed,
            substituted: summary.substituted,
            samples,
        }
    }

    /// Number of rows
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of samples, `rows * cols`
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a scanned frame
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-engine sequence number, starting at 1
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wall time the sweep took
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Cells filled with the timeout sentinel, `0` when every cell is a
    /// real conversion
    #[must_use]
    pub fn substituted(&self) -> usize {
        self.substituted
    }

    /// Row-major index of (`row`, `col`)
    #[must_use]
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then_some(row * self.cols + col)
    }

    /// Sample at (`row`, `col`)
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Sample> {
        self.index_of(row, col).map(|index| self.samples[index])
    }

    /// All samples of one row
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[Sample]> {
        let start = self.index_of(row, 0)?;
        Some(&self.samples[start..start + self.cols])
    }

    /// Rows in order, each `cols` samples long
    pub fn rows_iter(&self) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks_exact(self.cols.max(1))
    }

    /// Samples in row-major order
    #[must_use]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Take the row-major sample buffer
    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Highest sample in the frame
    #[must_use]
    pub fn max(&self) -> Sample {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Number of cells with a raw count strictly above `threshold`
    #[must_use]
    pub fn cells_above(&self, threshold: Sample) -> usize {
        self.samples.iter().filter(|&&s| s > threshold).count()
    }
}

/// Outcome of a successful scan into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Sequence number the frame was given
    pub sequence: u64,
    /// Cells written, `rows * cols`
    pub cells: usize,
    /// Cells filled with the timeout sentinel instead of a conversion
    pub substituted: usize,
    /// Wall time the sweep took
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rows: usize, cols: usize) -> Frame {
        frame_with_substitutions(rows, cols, 0)
    }

    fn frame_with_substitutions(rows: usize, cols: usize, substituted: usize) -> Frame {
        let samples = (0..(rows * cols) as Sample).collect();
        let summary = ScanSummary {
            sequence: 1,
            cells: rows * cols,
            substituted,
            elapsed: Duration::from_millis(3),
        };
        Frame::new(rows, cols, samples, &summary)
    }

    #[test]
    fn test_row_major_indexing() {
        let f = frame(3, 4);
        assert_eq!(f.index_of(0, 0), Some(0));
        assert_eq!(f.index_of(1, 0), Some(4));
        assert_eq!(f.index_of(2, 3), Some(11));
        assert_eq!(f.index_of(3, 0), None);
        assert_eq!(f.index_of(0, 4), None);
        assert_eq!(f.get(1, 2), Some(6));
        assert_eq!(f.row(2), Some(&[8, 9, 10, 11][..]));
        assert_eq!(f.rows_iter().count(), 3);
    }

    #[test]
    fn test_statistics() {
        let f = frame(2, 2);
        assert_eq!(f.max(), 3);
        assert_eq!(f.cells_above(1), 2);
        assert_eq!(f.len(), 4);
        assert_eq!(f.sequence(), 1);
    }

    #[test]
    fn test_serializes_row_major() {
        let json = serde_json::to_value(frame(1, 2)).unwrap();
        assert_eq!(json["rows"], 1);
        assert_eq!(json["samples"], serde_json::json!([0, 1]));
        assert_eq!(json["substituted"], 0);
    }

    #[test]
    fn test_substituted_cells_carried() {
        let f = frame_with_substitutions(2, 2, 3);
        assert_eq!(f.substituted(), 3);
        assert_eq!(serde_json::to_value(&f).unwrap()["substituted"], 3);
        assert_ne!(f, frame(2, 2));
    }
}
