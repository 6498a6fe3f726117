//! Human-readable renderings of a scan result.

use std::fmt::Write;

use securepilot_core::{ScanRequest, ScanResult};

/// Render a scan result as plain text.
///
/// Skipped files are listed only when `show_skipped` is set.
///
/// # Examples
///
/// ```
/// use securepilot_core::{Finding, ScanRequest, ScanResult};
/// use securepilot_scan::report::render_text;
///
/// let request = ScanRequest::new("octo/app", 3).unwrap();
/// let result = ScanResult {
///     results: vec![Finding::with_issues("db.py", vec!["[high] line 4: SQL injection".into()])],
///     ..ScanResult::default()
/// };
/// let text = render_text(&request, &result, false);
/// assert!(text.contains("octo/app#3"));
/// assert!(text.contains("SQL injection"));
/// ```
pub fn render_text(request: &ScanRequest, result: &ScanResult, show_skipped: bool) -> String {
    let stats = &result.stats;
    let mut out = String::new();

    let _ = writeln!(out, "Security Scan: {request}");
    let _ = writeln!(out, "==============");
    let _ = writeln!(
        out,
        "Model: {} | Files: {} changed, {} scanned, {} skipped | Chunks: {} | Issues: {} | Failed: {}\n",
        stats.model_used,
        stats.files_changed,
        stats.files_eligible,
        stats.skipped.len(),
        stats.chunks_dispatched,
        result.issue_count(),
        stats.files_failed,
    );

    if result.results.is_empty() {
        let _ = writeln!(out, "No eligible files to scan.");
    }

    for finding in &result.results {
        if let Some(error) = &finding.error {
            let _ = writeln!(out, "[FAILED] {}: {error}", finding.file);
        } else if finding.issues.is_empty() {
            let _ = writeln!(out, "[OK] {}", finding.file);
        } else {
            let _ = writeln!(out, "[ISSUES] {} ({})", finding.file, finding.issues.len());
            for issue in &finding.issues {
                let _ = writeln!(out, "  - {issue}");
            }
        }
    }

    if show_skipped && !stats.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped:");
        for skip in &stats.skipped {
            let _ = writeln!(out, "  {} ({})", skip.file, skip.reason);
        }
    }

    out
}

/// Render a scan result as markdown, e.g. for a PR comment.
///
/// # Examples
///
/// ```
/// use securepilot_core::{ScanRequest, ScanResult};
/// use securepilot_scan::report::render_markdown;
///
/// let request = ScanRequest::new("octo/app", 3).unwrap();
/// let md = render_markdown(&request, &ScanResult::default(), false);
/// assert!(md.contains("# Security Scan"));
/// ```
pub fn render_markdown(request: &ScanRequest, result: &ScanResult, show_skipped: bool) -> String {
    let stats = &result.stats;
    let mut out = String::new();

    let _ = writeln!(out, "# Security Scan: `{request}`\n");
    let _ = writeln!(
        out,
        "**Model:** {} | **Files scanned:** {} of {} | **Issues:** {} | **Failed:** {}\n",
        stats.model_used,
        stats.files_eligible,
        stats.files_changed,
        result.issue_count(),
        stats.files_failed,
    );

    if result.issue_count() == 0 && stats.files_failed == 0 {
        let _ = writeln!(out, "No issues found.");
    }

    for finding in &result.results {
        if let Some(error) = &finding.error {
            let _ = writeln!(out, "### \u{26a0}\u{fe0f} `{}`\n", finding.file);
            let _ = writeln!(out, "Not analyzed: {error}\n");
        } else if !finding.issues.is_empty() {
            let _ = writeln!(out, "### \u{1f6a8} `{}`\n", finding.file);
            for issue in &finding.issues {
                let _ = writeln!(out, "- {issue}");
            }
            out.push('\n');
        }
    }

    if show_skipped && !stats.skipped.is_empty() {
        let _ = writeln!(out, "<details><summary>Skipped files ({})</summary>\n", stats.skipped.len());
        for skip in &stats.skipped {
            let _ = writeln!(out, "- `{}`: {}", skip.file, skip.reason);
        }
        let _ = writeln!(out, "\n</details>");
    }

    out
}

#[cfg(test)]
mod tests {
    use securepilot_core::{Finding, ScanStats, SkipReason, SkippedFile};

    use super::*;

    fn sample() -> (ScanRequest, ScanResult) {
        let request = ScanRequest::new("octo/app", 11).unwrap();
        let result = ScanResult {
            results: vec![
                Finding::with_issues("a.py", vec!["[high] line 2: eval on input".into()]),
                Finding::with_issues("b.go", vec![]),
                Finding::failed("c.js", "timeout"),
            ],
            stats: ScanStats {
                files_changed: 4,
                files_eligible: 3,
                skipped: vec![SkippedFile {
                    file: "README.md".into(),
                    reason: SkipReason::NotAllowed,
                }],
                chunks_dispatched: 3,
                files_failed: 1,
                model_used: "gpt-4o".into(),
            },
        };
        (request, result)
    }

    #[test]
    fn text_lists_every_finding() {
        let (request, result) = sample();
        let text = render_text(&request, &result, false);
        assert!(text.contains("[ISSUES] a.py (1)"));
        assert!(text.contains("  - [high] line 2: eval on input"));
        assert!(text.contains("[OK] b.go"));
        assert!(text.contains("[FAILED] c.js: timeout"));
        assert!(!text.contains("README.md"));
    }

    #[test]
    fn text_shows_skipped_on_request() {
        let (request, result) = sample();
        let text = render_text(&request, &result, true);
        assert!(text.contains("README.md (extension not in allowlist)"));
    }

    #[test]
    fn markdown_sections() {
        let (request, result) = sample();
        let md = render_markdown(&request, &result, true);
        assert!(md.contains("# Security Scan: `octo/app#11`"));
        assert!(md.contains("- [high] line 2: eval on input"));
        assert!(md.contains("Not analyzed: timeout"));
        assert!(!md.contains("`b.go`"));
        assert!(md.contains("<details>"));
        assert!(!md.contains("No issues found."));
    }

    #[test]
    fn markdown_clean_scan() {
        let request = ScanRequest::new("octo/app", 1).unwrap();
        let md = render_markdown(&request, &ScanResult::default(), false);
        assert!(md.contains("No issues found."));
    }
}
