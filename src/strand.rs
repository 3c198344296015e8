use std::fmt;

use crate::reader::{ReaderError, ReaderResult};

/// Represents the strand of a genomic feature.
///
/// # Example
///
/// ```
/// use genetrack::strand::Strand;
///
/// let strand = Strand::Forward;
/// assert_eq!(strand.to_string(), "+");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    /// Positive strand (`+`).
    Forward,
    /// Negative strand (`-`).
    Reverse,
    /// Unknown strand (`.` or `?`).
    Unknown,
}

impl Strand {
    /// Parses the strand column of a GXF line.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::InvalidField`] if the value is not one of
    /// `+`, `-`, `.` or `?`.
    pub(crate) fn parse(raw: &str, line: usize) -> ReaderResult<Self> {
        match raw {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." | "?" => Ok(Strand::Unknown),
            other => Err(ReaderError::invalid_field(
                line,
                "strand",
                format!("ERROR: expected '+', '-', '.', or '?', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => f.write_str("+"),
            Strand::Reverse => f.write_str("-"),
            Strand::Unknown => f.write_str("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_strands() {
        assert_eq!(Strand::parse("+", 1).unwrap(), Strand::Forward);
        assert_eq!(Strand::parse("-", 1).unwrap(), Strand::Reverse);
        assert_eq!(Strand::parse(".", 1).unwrap(), Strand::Unknown);
        assert_eq!(Strand::parse("?", 1).unwrap(), Strand::Unknown);
    }

    #[test]
    fn parse_rejects_garbage() {
        match Strand::parse("x", 7) {
            Err(ReaderError::InvalidField { line, field, .. }) => {
                assert_eq!(line, 7);
                assert_eq!(field, "strand");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
