use securepilot_core::AnalysisError;
use serde_json::Value;

const SYSTEM_PROMPT: &str = "\
You are SecurePilot, an application security reviewer. You are given one piece \
of a unified diff from a pull request. Find security vulnerabilities introduced \
or exposed by the changed lines.

Rules:
- Report only issues you are confident are real and exploitable
- Focus on: injection (SQL, command, template), XSS, path traversal, SSRF, \
insecure deserialization, hard-coded secrets, broken authentication or \
authorization, weak cryptography, unsafe memory handling, race conditions
- Reference line numbers from the new side of the diff when you can
- Do not comment on style, naming, or performance
- The diff may be a fragment of a larger patch; do not report issues that \
depend only on code you cannot see

Respond with a JSON object:
{
  \"issues\": [
    {
      \"severity\": \"critical\" | \"high\" | \"medium\" | \"low\",
      \"line\": 42,
      \"description\": \"What is wrong and how it can be exploited\"
    }
  ]
}

If you find no issues, return: { \"issues\": [] }";

/// Build the system prompt for the security analysis LLM.
///
/// # Examples
///
/// ```
/// use securepilot_scan::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("SecurePilot"));
/// assert!(prompt.contains("\"issues\""));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Build the user prompt carrying one chunk of a file's patch.
///
/// # Examples
///
/// ```
/// use securepilot_scan::prompt::build_scan_prompt;
///
/// let prompt = build_scan_prompt("app/db.py", "+cursor.execute(q % name)");
/// assert!(prompt.contains("app/db.py"));
/// assert!(prompt.contains("+cursor.execute"));
/// ```
pub fn build_scan_prompt(filename: &str, content: &str) -> String {
    format!("File: {filename}\n\nChanges:\n\n```diff\n{content}\n```\n")
}

/// Parse the model's reply into normalized issue descriptions.
///
/// Accepts `{"issues": [...]}` or a bare array. Each entry may be a string or
/// an object with `description` (or `message`), optional `severity`, and
/// optional `line`; objects are rendered as `"[severity] line N: text"`.
///
/// # Errors
///
/// Returns [`AnalysisError::Refused`] if the reply is not JSON in one of the
/// accepted shapes.
///
/// # Examples
///
/// ```
/// use securepilot_scan::prompt::parse_issues_response;
///
/// let reply = r#"{"issues":[{"severity":"high","line":12,"description":"SQL injection"}]}"#;
/// let issues = parse_issues_response(reply).unwrap();
/// assert_eq!(issues, vec!["[high] line 12: SQL injection"]);
/// ```
pub fn parse_issues_response(response: &str) -> Result<Vec<String>, AnalysisError> {
    let cleaned = strip_code_fences(response);

    let parsed: Value = serde_json::from_str(cleaned).map_err(|e| {
        AnalysisError::Refused(format!("model response is not valid JSON: {e}"))
    })?;

    let entries = match &parsed {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("issues") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                return Err(AnalysisError::Refused(
                    "model response has a non-array \"issues\" field".into(),
                ))
            }
        },
        _ => {
            return Err(AnalysisError::Refused(
                "model response is neither an object nor an array".into(),
            ))
        }
    };

    Ok(entries.iter().filter_map(normalize_issue).collect())
}

fn normalize_issue(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => {
            let text = ["description", "message", "issue", "title"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())?;

            let mut out = String::new();
            if let Some(severity) = map.get("severity").and_then(Value::as_str) {
                let severity = severity.trim().to_ascii_lowercase();
                if !severity.is_empty() {
                    out.push_str(&format!("[{severity}] "));
                }
            }
            match map.get("line") {
                Some(Value::Number(n)) => out.push_str(&format!("line {n}: ")),
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    out.push_str(&format!("line {}: ", s.trim()))
                }
                _ => {}
            }
            out.push_str(text);
            Some(out)
        }
        _ => None,
    }
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
