//! Eligibility filtering applied before anything reaches the analysis backend.
//!
//! Keeps source files from the extension allowlist whose patch is present and
//! small enough, and drops vendored, generated, and minified files along with
//! anything matching a configured skip glob.

use securepilot_core::{ChangedFile, FileStatus, ScanSettings, SkipReason, SkippedFile};

/// Decides which changed files are analyzed.
///
/// Deterministic and side-effect free: the same file always gets the same
/// decision.
///
/// # Examples
///
/// ```
/// use securepilot_core::{ChangedFile, FileStatus};
/// use securepilot_difflens::filter::EligibilityFilter;
///
/// let filter = EligibilityFilter::default_filter();
/// let file = ChangedFile {
///     filename: "app/views.py".into(),
///     patch: Some("+eval(request.args['q'])\n".into()),
///     status: FileStatus::Modified,
/// };
/// assert!(filter.is_eligible(&file));
/// ```
pub struct EligibilityFilter {
    extensions: Vec<String>,
    skip_patterns: Vec<glob::Pattern>,
    max_patch_bytes: usize,
}

impl EligibilityFilter {
    /// Create a filter with the default allowlist and limits.
    pub fn default_filter() -> Self {
        Self::from_settings(&ScanSettings::default())
    }

    /// Create a filter from scan settings.
    ///
    /// Invalid glob patterns are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use securepilot_core::ScanSettings;
    /// use securepilot_difflens::filter::EligibilityFilter;
    ///
    /// let settings = ScanSettings {
    ///     extensions: vec!["rs".into()],
    ///     ..ScanSettings::default()
    /// };
    /// let filter = EligibilityFilter::from_settings(&settings);
    /// assert!(!filter.allows_path("main.py"));
    /// assert!(filter.allows_path("main.rs"));
    /// ```
    pub fn from_settings(settings: &ScanSettings) -> Self {
        let mut skip_patterns = Vec::new();
        for pat in &settings.skip_patterns {
            if let Ok(p) = glob::Pattern::new(pat) {
                skip_patterns.push(p);
            }
        }

        Self {
            extensions: settings
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            skip_patterns,
            max_patch_bytes: settings.max_patch_bytes,
        }
    }

    /// `true` if the file should be analyzed.
    pub fn is_eligible(&self, file: &ChangedFile) -> bool {
        self.check(file).is_none()
    }

    /// Check only the path rules (allowlist, vendored, generated, minified,
    /// skip patterns), ignoring the patch.
    pub fn allows_path(&self, path: &str) -> bool {
        self.check_path(path).is_none()
    }

    /// Explain why a file is not eligible, or `None` if it is.
    pub fn check(&self, file: &ChangedFile) -> Option<SkipReason> {
        if let Some(reason) = self.check_path(&file.filename) {
            return Some(reason);
        }

        if file.status == FileStatus::Removed {
            return Some(SkipReason::Removed);
        }

        let patch = match file.patch.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Some(SkipReason::NoPatch),
        };

        if patch.len() > self.max_patch_bytes {
            return Some(SkipReason::TooLarge);
        }

        None
    }

    /// Split a file list into eligible indices and skipped files.
    ///
    /// Indices refer to positions in `files` and keep their original order.
    pub fn partition(&self, files: &[ChangedFile]) -> FilterResult {
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();

        for (index, file) in files.iter().enumerate() {
            match self.check(file) {
                None => eligible.push(index),
                Some(reason) => skipped.push(SkippedFile {
                    file: file.filename.clone(),
                    reason,
                }),
            }
        }

        FilterResult { eligible, skipped }
    }

    fn check_path(&self, path: &str) -> Option<SkipReason> {
        let file_name = path.rsplit('/').next().unwrap_or(path);

        let allowed = file_name
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext));
        if !allowed {
            return Some(SkipReason::NotAllowed);
        }

        if is_vendored(path) {
            return Some(SkipReason::Vendored);
        }

        if is_minified(file_name) {
            return Some(SkipReason::Minified);
        }

        if is_generated(file_name) {
            return Some(SkipReason::Generated);
        }

        for pat in &self.skip_patterns {
            if pat.matches(path) {
                return Some(SkipReason::PatternMatch(pat.to_string()));
            }
        }

        None
    }
}

/// Result of partitioning a file list.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Indices of eligible files, ascending.
    pub eligible: Vec<usize>,
    /// Files that were filtered out, with reasons.
    pub skipped: Vec<SkippedFile>,
}

fn is_vendored(path: &str) -> bool {
    path.split('/')
        .any(|part| part == "vendor" || part == "third_party" || part == "node_modules")
}

fn is_minified(file_name: &str) -> bool {
    file_name.ends_with(".min.js") || file_name.ends_with(".min.css")
}

fn is_generated(file_name: &str) -> bool {
    file_name.contains(".generated.")
        || file_name.ends_with(".g.dart")
        || file_name.ends_with(".pb.go")
        || file_name.ends_with(".pb.rs")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, patch: Option<&str>) -> ChangedFile {
        ChangedFile {
            filename: name.into(),
            patch: patch.map(str::to_string),
            status: FileStatus::Modified,
        }
    }

    #[test]
    fn allowlisted_source_files_kept() {
        let filter = EligibilityFilter::default_filter();
        for name in ["a.py", "src/b.js", "c.ts", "d.go", "pkg/E.java", "src/lib.rs"] {
            assert!(filter.is_eligible(&file(name, Some("+x\n"))), "{name}");
        }
    }

    #[test]
    fn non_source_extensions_skipped() {
        let filter = EligibilityFilter::default_filter();
        for name in ["README.md", "Cargo.lock", "logo.png", "Makefile", ".env"] {
            assert_eq!(
                filter.check(&file(name, Some("+x\n"))),
                Some(SkipReason::NotAllowed),
                "{name}"
            );
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let filter = EligibilityFilter::default_filter();
        assert!(filter.is_eligible(&file("Legacy.PY", Some("+x\n"))));
    }

    #[test]
    fn missing_or_empty_patch_skipped() {
        let filter = EligibilityFilter::default_filter();
        assert_eq!(filter.check(&file("a.py", None)), Some(SkipReason::NoPatch));
        assert_eq!(filter.check(&file("a.py", Some(""))), Some(SkipReason::NoPatch));
        assert_eq!(filter.check(&file("a.py", Some("  \n"))), Some(SkipReason::NoPatch));
    }

    #[test]
    fn oversized_patch_skipped() {
        let settings = ScanSettings {
            max_patch_bytes: 10,
            ..ScanSettings::default()
        };
        let filter = EligibilityFilter::from_settings(&settings);
        assert!(filter.is_eligible(&file("a.py", Some("0123456789"))));
        assert_eq!(
            filter.check(&file("a.py", Some("0123456789A"))),
            Some(SkipReason::TooLarge)
        );
    }

    #[test]
    fn removed_files_skipped() {
        let filter = EligibilityFilter::default_filter();
        let removed = ChangedFile {
            status: FileStatus::Removed,
            ..file("old.py", Some("-gone\n"))
        };
        assert_eq!(filter.check(&removed), Some(SkipReason::Removed));
    }

    #[test]
    fn vendored_generated_minified_skipped() {
        let filter = EligibilityFilter::default_filter();
        let cases = [
            ("vendor/lib.go", SkipReason::Vendored),
            ("third_party/dep.rs", SkipReason::Vendored),
            ("web/node_modules/pkg/index.js", SkipReason::Vendored),
            ("api.generated.ts", SkipReason::Generated),
            ("proto/msg.pb.go", SkipReason::Generated),
            ("static/app.min.js", SkipReason::Minified),
        ];
        for (name, reason) in cases {
            assert_eq!(filter.check(&file(name, Some("+x\n"))), Some(reason), "{name}");
        }
    }

    #[test]
    fn custom_patterns_from_settings() {
        let settings = ScanSettings {
            skip_patterns: vec!["tests/**".into(), "[".into()],
            ..ScanSettings::default()
        };
        let filter = EligibilityFilter::from_settings(&settings);
        assert!(matches!(
            filter.check(&file("tests/unit/test_auth.py", Some("+x\n"))),
            Some(SkipReason::PatternMatch(_))
        ));
        assert!(filter.is_eligible(&file("src/auth.py", Some("+x\n"))));
    }

    #[test]
    fn partition_preserves_order_and_reasons() {
        let filter = EligibilityFilter::default_filter();
        let files = vec![
            file("a.py", Some("+1\n")),
            file("notes.txt", Some("+2\n")),
            file("b.go", None),
            file("c.ts", Some("+3\n")),
        ];
        let result = filter.partition(&files);
        assert_eq!(result.eligible, vec![0, 3]);
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.skipped[0].file, "notes.txt");
        assert_eq!(result.skipped[0].reason, SkipReason::NotAllowed);
        assert_eq!(result.skipped[1].file, "b.go");
        assert_eq!(result.skipped[1].reason, SkipReason::NoPatch);
    }

    #[test]
    fn empty_input_returns_empty_result() {
        let filter = EligibilityFilter::default_filter();
        let result = filter.partition(&[]);
        assert!(result.eligible.is_empty());
        assert!(result.skipped.is_empty());
    }
}
