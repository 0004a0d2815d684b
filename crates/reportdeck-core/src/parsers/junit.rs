//! JUnit XML reader.
//!
//! Accepts either a `<testsuites>` root holding any number of `<testsuite>`
//! elements or a bare `<testsuite>` root. Missing attributes fall back to
//! placeholders; a case is classified by its first matching child in the order
//! failure, error, skipped.

use crate::model::TestStatus;
use roxmltree::{Document, Node};
use serde::Serialize;

pub const UNKNOWN_SUITE: &str = "Unknown Suite";
pub const UNKNOWN_TEST: &str = "Unknown Test";

#[derive(Debug, thiserror::Error)]
pub enum JunitError {
    #[error("malformed junit xml: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JunitCase {
    pub suite_name: String,
    pub test_name: String,
    pub classname: String,
    pub status: TestStatus,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JunitReport {
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub skipped_tests: i64,
    pub duration_ms: i64,
    pub test_cases: Vec<JunitCase>,
}

impl JunitReport {
    /// Names of cases counted as failed (`failed` or `error`), in document order.
    pub fn failed_test_names(&self) -> Vec<&str> {
        self.test_cases
            .iter()
            .filter(|c| c.status.is_failure())
            .map(|c| c.test_name.as_str())
            .collect()
    }

    fn from_cases(test_cases: Vec<JunitCase>) -> Self {
        let mut report = JunitReport {
            total_tests: test_cases.len() as i64,
            ..Default::default()
        };
        for case in &test_cases {
            report.duration_ms += case.duration_ms;
            match case.status {
                TestStatus::Passed => report.passed_tests += 1,
                TestStatus::Failed | TestStatus::Error => report.failed_tests += 1,
                TestStatus::Skipped => report.skipped_tests += 1,
            }
        }
        report.test_cases = test_cases;
        report
    }
}

pub fn parse_junit(xml: &str) -> Result<JunitReport, JunitError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    let suites: Vec<Node<'_, '_>> = match root.tag_name().name() {
        "testsuites" => children_named(root, "testsuite").collect(),
        "testsuite" => vec![root],
        _ => Vec::new(),
    };

    let mut cases = Vec::new();
    for suite in suites {
        let suite_name = non_empty_attr(suite, "name").unwrap_or(UNKNOWN_SUITE);
        for tc in children_named(suite, "testcase") {
            cases.push(parse_case(suite_name, tc));
        }
    }

    Ok(JunitReport::from_cases(cases))
}

fn parse_case(suite_name: &str, tc: Node<'_, '_>) -> JunitCase {
    let duration_ms = tc
        .attribute("time")
        .map(seconds_to_ms)
        .unwrap_or(0);

    let (status, outcome) = if let Some(failure) = first_child(tc, "failure") {
        (TestStatus::Failed, Some(failure))
    } else if let Some(error) = first_child(tc, "error") {
        (TestStatus::Error, Some(error))
    } else if first_child(tc, "skipped").is_some() {
        (TestStatus::Skipped, None)
    } else {
        (TestStatus::Passed, None)
    };

    let (failure_message, failure_details) = match outcome {
        Some(node) => (
            node.attribute("message")
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            text_content(node),
        ),
        None => (None, None),
    };

    JunitCase {
        suite_name: suite_name.to_string(),
        test_name: non_empty_attr(tc, "name")
            .unwrap_or(UNKNOWN_TEST)
            .to_string(),
        classname: non_empty_attr(tc, "classname")
            .unwrap_or(suite_name)
            .to_string(),
        status,
        duration_ms,
        failure_message,
        failure_details,
    }
}

fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn first_child<'a, 'input: 'a>(node: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    children_named(node, name).next()
}

fn non_empty_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).filter(|v| !v.is_empty())
}

/// Concatenated text and CDATA under `node`, trimmed; `None` when blank.
fn text_content(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// JUnit `time` is fractional seconds; unreadable values count as zero.
fn seconds_to_ms(raw: &str) -> i64 {
    let secs: f64 = raw.trim().parse().unwrap_or(0.0);
    if secs.is_finite() {
        (secs * 1000.0).round() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="e2e" tests="4">
  <testsuite name="auth.spec.ts" tests="2">
    <testcase name="Login flow fails" classname="auth" time="1.2346">
      <failure message="expected 200">AssertionError: expected 200 got 500</failure>
    </testcase>
    <testcase name="logout works" classname="auth" time="0.5"/>
  </testsuite>
  <testsuite name="exam.spec.ts">
    <testcase name="starts exam" time="2">
      <error message="timeout"><![CDATA[Timed out after 30000ms]]></error>
    </testcase>
    <testcase name="submits exam" time="0.001">
      <skipped/>
      <system-out>noise</system-out>
    </testcase>
  </testsuite>
</testsuites>"#;

    #[test]
    fn aggregates_are_consistent() {
        let r = parse_junit(MULTI).unwrap();
        assert_eq!(r.total_tests, 4);
        assert_eq!(r.test_cases.len() as i64, r.total_tests);
        assert_eq!(r.passed_tests + r.failed_tests + r.skipped_tests, r.total_tests);
        assert_eq!(r.failed_tests, 2);
        assert_eq!(r.passed_tests, 1);
        assert_eq!(r.skipped_tests, 1);
        assert_eq!(r.duration_ms, 1235 + 500 + 2000 + 1);
    }

    #[test]
    fn failure_child_carries_message_and_details() {
        let r = parse_junit(MULTI).unwrap();
        let c = &r.test_cases[0];
        assert_eq!(c.status, TestStatus::Failed);
        assert_eq!(c.failure_message.as_deref(), Some("expected 200"));
        assert_eq!(
            c.failure_details.as_deref(),
            Some("AssertionError: expected 200 got 500")
        );
        assert_eq!(c.duration_ms, 1235);
    }

    #[test]
    fn error_keeps_distinct_status() {
        let r = parse_junit(MULTI).unwrap();
        let c = &r.test_cases[2];
        assert_eq!(c.status, TestStatus::Error);
        assert_eq!(c.failure_message.as_deref(), Some("timeout"));
        assert_eq!(c.failure_details.as_deref(), Some("Timed out after 30000ms"));
        assert_eq!(c.classname, "exam.spec.ts");
        assert_eq!(r.failed_test_names(), vec!["Login flow fails", "starts exam"]);
    }

    #[test]
    fn skipped_wins_over_other_children() {
        let r = parse_junit(MULTI).unwrap();
        let c = &r.test_cases[3];
        assert_eq!(c.status, TestStatus::Skipped);
        assert!(c.failure_message.is_none());
    }

    #[test]
    fn failure_takes_precedence_over_error_and_skipped() {
        let xml = r#"<testsuite name="s"><testcase name="t"><skipped/><error/><failure message="f"/></testcase></testsuite>"#;
        let r = parse_junit(xml).unwrap();
        assert_eq!(r.test_cases[0].status, TestStatus::Failed);
        assert_eq!(r.test_cases[0].failure_details, None);
    }

    #[test]
    fn single_suite_single_case_matches_wrapped_form() {
        let bare = r#"<testsuite name="s"><testcase name="t" classname="c" time="0.25"/></testsuite>"#;
        let wrapped = r#"<testsuites><testsuite name="s"><testcase name="t" classname="c" time="0.25"/></testsuite></testsuites>"#;
        assert_eq!(parse_junit(bare).unwrap(), parse_junit(wrapped).unwrap());
    }

    #[test]
    fn missing_names_use_placeholders() {
        let xml = r#"<testsuites><testsuite><testcase/></testsuite><testsuite name="empty"/></testsuites>"#;
        let r = parse_junit(xml).unwrap();
        assert_eq!(r.total_tests, 1);
        let c = &r.test_cases[0];
        assert_eq!(c.suite_name, UNKNOWN_SUITE);
        assert_eq!(c.test_name, UNKNOWN_TEST);
        assert_eq!(c.classname, UNKNOWN_SUITE);
        assert_eq!(c.status, TestStatus::Passed);
        assert_eq!(c.duration_ms, 0);
    }

    #[test]
    fn unreadable_time_is_zero() {
        let xml = r#"<testsuite name="s"><testcase name="a" time="soon"/><testcase name="b" time=""/></testsuite>"#;
        let r = parse_junit(xml).unwrap();
        assert_eq!(r.duration_ms, 0);
    }

    #[test]
    fn unknown_root_yields_empty_report() {
        let r = parse_junit("<report/>").unwrap();
        assert_eq!(r, JunitReport::default());
    }

    #[test]
    fn malformed_document_is_error() {
        assert!(parse_junit("<testsuite><testcase></testsuite>").is_err());
    }
}
