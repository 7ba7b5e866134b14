//! Row driver for the 16-bit shift register
//!
//! Two cascaded serial-in/parallel-out registers drive the 16 row lines.
//! A pattern is shifted in most significant bit first on the data line, one
//! clock pulse per bit, then a latch pulse moves it to the outputs. Row 0 is
//! bit 15.

use std::time::Duration;

use crate::error::{GridError, GridResult};
use crate::hardware::{Delay, OutputLine};

/// Number of row outputs on the shift register chain
pub const MAX_ROWS: usize = 16;

/// One-hot row selection pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowPattern(u16);

/// Canonical pattern for every row, `ROW_PATTERNS[r]` has only bit `15 - r` set
pub const ROW_PATTERNS: [RowPattern; MAX_ROWS] = build_patterns();

const fn build_patterns() -> [RowPattern; MAX_ROWS] {
    let mut table = [RowPattern(0); MAX_ROWS];
    let mut row = 0;
    while row < MAX_ROWS {
        table[row] = RowPattern(1 << (MAX_ROWS - 1 - row));
        row += 1;
    }
    table
}

impl RowPattern {
    /// All rows released
    pub const NONE: RowPattern = RowPattern(0);

    /// Pattern selecting `row`, rejecting rows past the register chain
    pub fn for_row(row: usize) -> GridResult<Self> {
        ROW_PATTERNS
            .get(row)
            .copied()
            .ok_or(GridError::OutOfRange {
                what: "row",
                value: row,
                max: MAX_ROWS - 1,
            })
    }

    /// Raw 16-bit pattern as shifted out
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Row selected by this pattern, `None` for [`RowPattern::NONE`]
    #[must_use]
    pub const fn row(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.leading_zeros() as usize)
        }
    }
}

/// Shift register driver owning the data, shift clock and latch lines
#[derive(Debug)]
pub struct RowDriver<L> {
    data: L,
    clock: L,
    latch: L,
    pulse_width: Duration,
}

impl<L: OutputLine> RowDriver<L> {
    /// Driver over the three lines; `pulse_width` is held high and low
    #[must_use]
    pub fn new(data: L, clock: L, latch: L, pulse_width: Duration) -> Self {
        Self {
            data,
            clock,
            latch,
            pulse_width,
        }
    }

    /// Shift `pattern` in and latch it onto the row outputs
    pub fn select_row<D: Delay>(&mut self, pattern: RowPattern, delay: &mut D) -> GridResult<()> {
        for bit in (0..MAX_ROWS).rev() {
            let high = (pattern.bits() >> bit) & 1 == 1;
            drive(&mut self.data, "data", high)?;
            pulse(&mut self.clock, "shift clock", self.pulse_width, delay)?;
        }
        pulse(&mut self.latch, "latch clock", self.pulse_width, delay)
    }

    /// Release every row
    pub fn deassert<D: Delay>(&mut self, delay: &mut D) -> GridResult<()> {
        self.select_row(RowPattern::NONE, delay)?;
        drive(&mut self.data, "data", false)
    }
}

fn drive<L: OutputLine>(line: &mut L, name: &'static str, high: bool) -> GridResult<()> {
    line.set_level(high).map_err(|e| GridError::Line {
        line: name,
        reason: e.to_string(),
    })
}

/// High, hold, low, hold
fn pulse<L: OutputLine, D: Delay>(
    line: &mut L,
    name: &'static str,
    width: Duration,
    delay: &mut D,
) -> GridResult<()> {
    drive(line, name, true)?;
    delay.delay(width);
    drive(line, name, false)?;
    delay.delay(width);
    Ok(())
}
