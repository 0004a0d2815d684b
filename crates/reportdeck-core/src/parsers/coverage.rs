//! lcov tracefile summary.
//!
//! Only the `LF:` (lines found) and `LH:` (lines hit) records are read. They are
//! summed over the whole input, ignoring `SF:`/`end_of_record` section
//! boundaries, so the result is one aggregate for the entire archive.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub line_coverage_pct: f64,
    pub lines_found: u64,
    pub lines_hit: u64,
}

pub fn parse_lcov(content: &str) -> CoverageSummary {
    let mut lines_found: u64 = 0;
    let mut lines_hit: u64 = 0;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("LF:") {
            lines_found = lines_found.saturating_add(leading_count(rest));
        } else if let Some(rest) = trimmed.strip_prefix("LH:") {
            lines_hit = lines_hit.saturating_add(leading_count(rest));
        }
    }

    let pct = if lines_found > 0 {
        (lines_hit as f64 / lines_found as f64) * 100.0
    } else {
        0.0
    };

    CoverageSummary {
        line_coverage_pct: round2(pct),
        lines_found,
        lines_hit,
    }
}

/// Leading decimal digits of the record payload; anything unreadable counts as 0.
fn leading_count(payload: &str) -> u64 {
    let payload = payload.trim_start();
    let end = payload
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(payload.len());
    payload[..end].parse().unwrap_or(0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_across_file_sections() {
        let lcov = "TN:\nSF:src/a.ts\nLF:60\nLH:45\nend_of_record\nSF:src/b.ts\nLF:40\nLH:30\nend_of_record\n";
        let cov = parse_lcov(lcov);
        assert_eq!(cov.lines_found, 100);
        assert_eq!(cov.lines_hit, 75);
        assert_eq!(cov.line_coverage_pct, 75.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let cov = parse_lcov("LF:3\nLH:1\n");
        assert_eq!(cov.line_coverage_pct, 33.33);

        let cov = parse_lcov("LF:3\nLH:2\n");
        assert_eq!(cov.line_coverage_pct, 66.67);
    }

    #[test]
    fn zero_found_is_zero_percent() {
        let cov = parse_lcov("SF:x\nend_of_record\n");
        assert_eq!(cov.lines_found, 0);
        assert_eq!(cov.line_coverage_pct, 0.0);
    }

    #[test]
    fn malformed_counters_count_as_zero() {
        let cov = parse_lcov("LF:abc\nLH:\nLF:10\nLH:5x\n  LH:2  \nDA:1,1\n");
        assert_eq!(cov.lines_found, 10);
        assert_eq!(cov.lines_hit, 7);
        assert_eq!(cov.line_coverage_pct, 70.0);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let cov = parse_lcov("LF:4\r\nLH:1\r\n");
        assert_eq!(cov.line_coverage_pct, 25.0);
    }
}
