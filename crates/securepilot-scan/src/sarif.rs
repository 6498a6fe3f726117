use securepilot_core::ScanResult;

const RULE_ID: &str = "securepilot/security-issue";

/// Convert a scan result to SARIF v2.1.0 JSON.
///
/// Each issue becomes a result located at its file (and line, when the issue
/// text starts with a `line N:` marker). Files that could not be analyzed are
/// reported as `toolExecutionNotifications`.
///
/// # Examples
///
/// ```
/// use securepilot_core::ScanResult;
/// use securepilot_scan::sarif::to_sarif;
///
/// let sarif = to_sarif(&ScanResult::default());
/// assert_eq!(sarif["version"], "2.1.0");
/// ```
pub fn to_sarif(result: &ScanResult) -> serde_json::Value {
    let mut results = Vec::new();
    let mut notifications = Vec::new();

    for finding in &result.results {
        if let Some(error) = &finding.error {
            notifications.push(serde_json::json!({
                "level": "error",
                "message": { "text": format!("{} was not analyzed: {error}", finding.file) },
                "locations": [location(&finding.file, None)],
            }));
            continue;
        }

        for issue in &finding.issues {
            let (severity, line) = parse_issue_prefix(issue);
            results.push(serde_json::json!({
                "ruleId": RULE_ID,
                "level": severity_to_sarif_level(severity),
                "message": { "text": issue },
                "locations": [location(&finding.file, line)],
            }));
        }
    }

    let rules = if results.is_empty() {
        Vec::new()
    } else {
        vec![serde_json::json!({
            "id": RULE_ID,
            "shortDescription": { "text": "Security issue" },
            "defaultConfiguration": { "level": "warning" }
        })]
    };

    serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "securepilot",
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": rules
                }
            },
            "invocations": [{
                "executionSuccessful": notifications.is_empty(),
                "toolExecutionNotifications": notifications
            }],
            "results": results
        }]
    })
}

fn location(file: &str, line: Option<u64>) -> serde_json::Value {
    let mut physical = serde_json::json!({
        "artifactLocation": { "uri": file }
    });
    if let Some(line) = line {
        physical["region"] = serde_json::json!({ "startLine": line });
    }
    serde_json::json!({ "physicalLocation": physical })
}

/// Read the optional `[severity] ` and `line N: ` prefixes of a normalized
/// issue string.
fn parse_issue_prefix(issue: &str) -> (Option<&str>, Option<u64>) {
    let mut rest = issue;
    let mut severity = None;

    if let Some(tail) = rest.strip_prefix('[') {
        if let Some((sev, after)) = tail.split_once("] ") {
            severity = Some(sev);
            rest = after;
        }
    }

    let line = rest
        .strip_prefix("line ")
        .and_then(|tail| tail.split_once(':'))
        .and_then(|(n, _)| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0);

    (severity, line)
}

fn severity_to_sarif_level(severity: Option<&str>) -> &'static str {
    match severity {
        Some("critical" | "high" | "error") => "error",
        Some("low" | "info" | "note") => "note",
        _ => "warning",
    }
}

#[cfg(test)]
mod tests {
    use securepilot_core::{Finding, ScanResult};

    use super::*;

    fn make_result(results: Vec<Finding>) -> ScanResult {
        ScanResult {
            results,
            ..ScanResult::default()
        }
    }

    #[test]
    fn sarif_has_required_fields() {
        let sarif = to_sarif(&make_result(vec![]));

        assert_eq!(sarif["version"], "2.1.0");
        assert!(sarif["$schema"].as_str().unwrap().contains("sarif-schema"));
        assert_eq!(sarif["runs"].as_array().unwrap().len(), 1);

        let run = &sarif["runs"][0];
        assert_eq!(run["tool"]["driver"]["name"], "securepilot");
        assert!(run["results"].as_array().unwrap().is_empty());
        assert!(run["tool"]["driver"]["rules"].as_array().unwrap().is_empty());
        assert_eq!(run["invocations"][0]["executionSuccessful"], true);
    }

    #[test]
    fn issue_maps_to_result_with_line() {
        let sarif = to_sarif(&make_result(vec![Finding::with_issues(
            "src/db.py",
            vec!["[high] line 12: SQL injection".into()],
        )]));

        let result = &sarif["runs"][0]["results"][0];
        assert_eq!(result["ruleId"], RULE_ID);
        assert_eq!(result["level"], "error");
        assert_eq!(result["message"]["text"], "[high] line 12: SQL injection");
        let loc = &result["locations"][0]["physicalLocation"];
        assert_eq!(loc["artifactLocation"]["uri"], "src/db.py");
        assert_eq!(loc["region"]["startLine"], 12);
    }

    #[test]
    fn issue_without_line_has_no_region() {
        let sarif = to_sarif(&make_result(vec![Finding::with_issues(
            "a.js",
            vec!["prototype pollution".into()],
        )]));
        let result = &sarif["runs"][0]["results"][0];
        assert_eq!(result["level"], "warning");
        assert!(result["locations"][0]["physicalLocation"]["region"].is_null());
    }

    #[test]
    fn failed_files_become_notifications() {
        let sarif = to_sarif(&make_result(vec![
            Finding::failed("slow.py", "timeout"),
            Finding::with_issues("ok.py", vec![]),
        ]));
        let run = &sarif["runs"][0];
        assert!(run["results"].as_array().unwrap().is_empty());
        let notes = run["invocations"][0]["toolExecutionNotifications"]
            .as_array()
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0]["message"]["text"].as_str().unwrap().contains("slow.py"));
        assert_eq!(run["invocations"][0]["executionSuccessful"], false);
    }

    #[test]
    fn prefix_parsing() {
        assert_eq!(parse_issue_prefix("[low] line 3: x"), (Some("low"), Some(3)));
        assert_eq!(parse_issue_prefix("line 9: x"), (None, Some(9)));
        assert_eq!(parse_issue_prefix("[medium] x"), (Some("medium"), None));
        assert_eq!(parse_issue_prefix("plain text"), (None, None));
        assert_eq!(parse_issue_prefix("line abc: x"), (None, None));
    }
}
