//! Output Normalizer: classify a raw ProcessOutcome into a ToolResult.

use std::time::Duration;

use crate::{
    engine::ProcessOutcome,
    error::{ToolError, ToolOutput, ToolResult},
};

/// Phrases the engine emits on failures that still exit with status 0:
/// message tags from the evaluator plus wolframscript licensing text.
/// Extend via `WOLFRAM_ERROR_MARKERS`, not by editing this list.
pub const DEFAULT_ERROR_MARKERS: &[&str] = &[
    "Syntax::",
    "$Failed",
    "$Aborted",
    "is not licensed",
    "Failed to authenticate",
    "activation key",
    "Cannot find a valid Wolfram",
];

#[derive(Debug, Clone)]
pub struct Normalizer {
    markers: Vec<String>,
}

impl Normalizer {
    /// Built-in marker set plus any configured extras.
    pub fn new(extra_markers: impl IntoIterator<Item = String>) -> Self {
        let mut markers: Vec<String> =
            DEFAULT_ERROR_MARKERS.iter().map(|m| m.to_string()).collect();
        markers.extend(extra_markers.into_iter().filter(|m| !m.trim().is_empty()));
        Self { markers }
    }

    /// The classification ladder: timeout, nonzero exit, engine-reported
    /// marker, empty output, success, in that order.
    pub fn classify(&self, outcome: &ProcessOutcome, limit: Duration) -> ToolResult {
        if outcome.timed_out {
            return Err(ToolError::Timeout { seconds: limit.as_secs() });
        }
        if outcome.status != Some(0) {
            let diagnostic = pick_diagnostic(&outcome.stderr, &outcome.stdout);
            return Err(ToolError::EngineExecution {
                status: outcome.status.unwrap_or(-1),
                diagnostic,
            });
        }
        if let Some(line) = self.marker_line(&outcome.stdout).or_else(|| self.marker_line(&outcome.stderr)) {
            return Err(ToolError::EngineReported { diagnostic: line.trim().to_string() });
        }
        let text = normalize_text(&outcome.stdout);
        if text.is_empty() {
            return Err(ToolError::EmptyResult);
        }
        Ok(ToolOutput { text, raw: outcome.stdout.clone() })
    }

    fn marker_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines()
            .find(|line| self.markers.iter().any(|m| line.contains(m.as_str())))
    }
}

fn pick_diagnostic(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "no diagnostic output".to_string()
}

/// Trim outer whitespace and trailing whitespace per line; interior
/// structure (multi-line results) is preserved as the engine printed it.
fn normalize_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn outcome(status: Option<i32>, stdout: &str, stderr: &str, timed_out: bool) -> ProcessOutcome {
        ProcessOutcome {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            elapsed: Duration::from_millis(5),
            timed_out,
        }
    }

    fn classify(o: &ProcessOutcome) -> ToolResult {
        Normalizer::new(std::iter::empty()).classify(o, Duration::from_secs(30))
    }

    #[test]
    fn clean_output_is_success_with_raw_preserved() {
        let result = classify(&outcome(Some(0), "4\n", "", false)).unwrap();
        assert_eq!(result.text, "4");
        assert_eq!(result.raw, "4\n");
    }

    #[test]
    fn timeout_wins_over_everything() {
        let err = classify(&outcome(None, "partial", "noise", true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn nonzero_exit_carries_stderr() {
        let err = classify(&outcome(Some(2), "", "kernel crashed\n", false)).unwrap_err();
        match err {
            ToolError::EngineExecution { status, diagnostic } => {
                assert_eq!(status, 2);
                assert_eq!(diagnostic, "kernel crashed");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn marker_on_zero_exit_is_engine_reported() {
        let stdout = "Syntax::sntxi: Incomplete expression; more input is needed.\n$Failed\n";
        let err = classify(&outcome(Some(0), stdout, "", false)).unwrap_err();
        match err {
            ToolError::EngineReported { diagnostic } => {
                assert!(diagnostic.starts_with("Syntax::sntxi"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn licensing_failure_is_distinguishable() {
        let err = classify(&outcome(
            Some(0),
            "This computer is not licensed to run Wolfram Engine.\n",
            "",
            false,
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineReportedError);
    }

    #[test]
    fn configured_extra_markers_apply() {
        let normalizer = Normalizer::new(vec!["Recursion::".to_string()]);
        let err = normalizer
            .classify(
                &outcome(Some(0), "Recursion::limit exceeded\n", "", false),
                Duration::from_secs(30),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineReportedError);
    }

    #[test]
    fn blank_stdout_on_zero_exit_is_empty_result() {
        let err = classify(&outcome(Some(0), "  \n\t\n", "", false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[test]
    fn symbolic_forms_pass_through_untouched() {
        let result = classify(&outcome(Some(0), "x^3/3   \n", "", false)).unwrap();
        assert_eq!(result.text, "x^3/3");
    }

    #[test]
    fn multi_line_results_keep_interior_structure() {
        let result = classify(&outcome(Some(0), "{{1, 2},\n {3, 4}}\n", "", false)).unwrap();
        assert_eq!(result.text, "{{1, 2},\n {3, 4}}");
    }
}
