//! Source location tracking for instructions and error reporting.
//!
//! Provides [`SrcLocation`] to record the source range each instruction was
//! generated from, so the interpreter can map a failing instruction back to
//! the offending code.

use std::fmt;

/// A source range: start and end positions, both inclusive of the line and
/// column where a construct begins and ends.
///
/// Lines are 1-indexed, columns 0-indexed. Synthetic instructions that have
/// no source counterpart carry [`NO_LOCATION`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SrcLocation {
    /// Starting line (1-indexed).
    pub start_line: i32,
    /// Starting column (0-indexed, byte-based).
    pub start_col: i32,
    /// Ending line.
    pub end_line: i32,
    /// Ending column.
    pub end_col: i32,
}

/// The sentinel location for synthetic instructions.
pub const NO_LOCATION: SrcLocation = SrcLocation {
    start_line: -1,
    start_col: -1,
    end_line: -1,
    end_col: -1,
};

impl SrcLocation {
    /// Create a location covering a range.
    #[inline]
    pub fn new(start_line: i32, start_col: i32, end_line: i32, end_col: i32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a location covering a single line starting at a column.
    #[inline]
    pub fn line(line: i32, col: i32) -> Self {
        Self {
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }

    /// Whether this is the synthetic no-location sentinel.
    #[inline]
    pub fn is_none(&self) -> bool {
        *self == NO_LOCATION
    }
}

impl Default for SrcLocation {
    fn default() -> Self {
        NO_LOCATION
    }
}

impl fmt::Debug for SrcLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "<none>")
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_col, self.end_line, self.end_col
            )
        }
    }
}

impl fmt::Display for SrcLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "<unknown location>")
        } else {
            write!(f, "{}:{}", self.start_line, self.start_col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_location_sentinel() {
        assert!(NO_LOCATION.is_none());
        assert_eq!(NO_LOCATION.start_line, -1);
        assert_eq!(SrcLocation::default(), NO_LOCATION);
    }

    #[test]
    fn real_location_is_some() {
        let loc = SrcLocation::new(3, 0, 3, 10);
        assert!(!loc.is_none());
        assert_eq!(format!("{loc}"), "3:0");
    }

    #[test]
    fn single_line_constructor() {
        let loc = SrcLocation::line(7, 4);
        assert_eq!(loc.start_line, 7);
        assert_eq!(loc.end_line, 7);
        assert_eq!(loc.start_col, 4);
    }
}
