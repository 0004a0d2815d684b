pub mod coverage;
pub mod junit;

pub use coverage::{parse_lcov, CoverageSummary};
pub use junit::{parse_junit, JunitCase, JunitError, JunitReport};
