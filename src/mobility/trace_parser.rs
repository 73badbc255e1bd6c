//! Parse individual waypoint lines of a mobility trace.
//!
//! Supported line format, whitespace separated:
//!
//! ```text
//! <node_id> <time_seconds> <x> <y> <z>
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Anything else that
//! does not parse is a `TraceParseError` naming the offending line.

use crate::simulation::types::{NodeId, Point3};

/// One parsed waypoint: at `time_secs`, the node jumps to `position`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub node: NodeId,
    pub time_secs: f64,
    pub position: Point3,
    /// 1-based source line, kept for error reporting.
    pub line: usize,
}

/// Error describing a malformed trace line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceParseError {
    /// 1-based line number of the offending line.
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for TraceParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Malformed trace line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for TraceParseError {}

/// Parse a single trace line.
///
/// Returns `Ok(None)` for blank lines and comments, `Ok(Some(waypoint))` for
/// a valid record, and an error identifying the line otherwise.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<Waypoint>, TraceParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(TraceParseError {
            line: line_number,
            reason: format!("expected 5 fields (node_id time x y z), found {}", fields.len()),
        });
    }

    let node: NodeId = fields[0].parse().map_err(|_| TraceParseError {
        line: line_number,
        reason: format!("invalid node id '{}'", fields[0]),
    })?;
    let time_secs: f64 = fields[1].parse().map_err(|_| TraceParseError {
        line: line_number,
        reason: format!("invalid time '{}'", fields[1]),
    })?;
    if !time_secs.is_finite() || time_secs < 0.0 {
        return Err(TraceParseError {
            line: line_number,
            reason: format!("time must be finite and non-negative, found {time_secs}"),
        });
    }

    let mut coords = [0.0_f64; 3];
    for (slot, field) in coords.iter_mut().zip(&fields[2..5]) {
        *slot = field.parse().map_err(|_| TraceParseError {
            line: line_number,
            reason: format!("invalid coordinate '{field}'"),
        })?;
    }

    Ok(Some(Waypoint {
        node,
        time_secs,
        position: Point3::new(coords[0], coords[1], coords[2]),
        line: line_number,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_waypoint_line() {
        let wp = parse_line("3 12.5 100.0 -20.5 1.5", 1).unwrap().unwrap();
        assert_eq!(wp.node, 3);
        assert_eq!(wp.time_secs, 12.5);
        assert_eq!(wp.position, Point3::new(100.0, -20.5, 1.5));
        assert_eq!(wp.line, 1);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        assert_eq!(parse_line("# gateway stays put", 1).unwrap(), None);
        assert_eq!(parse_line("", 2).unwrap(), None);
        assert_eq!(parse_line("   \t ", 3).unwrap(), None);
    }

    #[test]
    fn wrong_field_count_names_the_line() {
        let err = parse_line("3 12.5 100.0", 7).unwrap_err();
        assert_eq!(err.line, 7);
        assert!(err.reason.contains("5 fields"));
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        assert!(parse_line("abc 1.0 0 0 0", 1).is_err());
        assert!(parse_line("1 soon 0 0 0", 2).is_err());
        assert!(parse_line("1 1.0 0 north 0", 3).is_err());
    }

    #[test]
    fn negative_time_is_rejected() {
        let err = parse_line("1 -2.0 0 0 0", 4).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.reason.contains("non-negative"));
    }
}
