//! Helpers for surfacing one-shot subprocess failures.

use std::process::Output;

/// Max length of captured diagnostics carried inside error messages.
const MAX_DIAGNOSTIC_LEN: usize = 400;

/// A short, human-readable account of why a command failed: trimmed
/// stderr, falling back to stdout, falling back to the exit code.
pub(crate) fn failure_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return tail(stderr);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return tail(stdout);
    }
    format!("exit code {}", output.status.code().unwrap_or(-1))
}

/// Keep the tail of long output; the actionable part of pip/conda
/// diagnostics is at the end.
fn tail(text: &str) -> String {
    if text.len() <= MAX_DIAGNOSTIC_LEN {
        return text.to_string();
    }
    let start = text.len() - MAX_DIAGNOSTIC_LEN;
    // avoid splitting a UTF-8 sequence
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("...{}", &text[start..])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn prefers_stderr_then_stdout_then_code() {
        assert_eq!(failure_summary(&output(1, "out", "err")), "err");
        assert_eq!(failure_summary(&output(1, "out", "")), "out");
        assert_eq!(failure_summary(&output(1, "", "")), "exit code 1");
    }

    #[test]
    fn long_output_keeps_the_tail() {
        let long = "x".repeat(1000) + "THE END";
        let summary = failure_summary(&output(1, "", &long));
        assert!(summary.starts_with("..."));
        assert!(summary.ends_with("THE END"));
        assert!(summary.len() <= MAX_DIAGNOSTIC_LEN + 3);
    }
}
