//! Folding chunk outcomes back into one finding per file.

use std::collections::BTreeMap;

use securepilot_core::{AnalysisError, Finding};

use crate::dispatch::ChunkOutcome;

/// An eligible file and the number of chunks it was split into.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    /// Index of the file in the retrieved list.
    pub file_index: usize,
    /// Path of the file.
    pub filename: String,
    /// How many chunks were dispatched for it.
    pub chunks: usize,
}

/// Build the finding for one file from its chunk outcomes.
///
/// Outcomes may arrive in any order. If every chunk succeeded, the issues are
/// concatenated in sequence order. Otherwise the finding carries the first
/// failure in sequence order and no issues. A chunk without an outcome counts
/// as [`AnalysisError::Unavailable`].
///
/// # Examples
///
/// ```
/// use securepilot_core::AnalysisError;
/// use securepilot_scan::aggregate::aggregate_file;
///
/// let finding = aggregate_file(
///     "a.py",
///     2,
///     vec![(1, Ok(vec!["second".into()])), (0, Ok(vec!["first".into()]))],
/// );
/// assert_eq!(finding.issues, vec!["first", "second"]);
///
/// let finding = aggregate_file(
///     "b.py",
///     2,
///     vec![(0, Ok(vec![])), (1, Err(AnalysisError::Refused("400".into())))],
/// );
/// assert_eq!(finding.error.as_deref(), Some("AnalysisRefused: 400"));
/// ```
pub fn aggregate_file(
    filename: &str,
    expected_chunks: usize,
    outcomes: Vec<(usize, Result<Vec<String>, AnalysisError>)>,
) -> Finding {
    let mut slots: Vec<Option<Result<Vec<String>, AnalysisError>>> = vec![None; expected_chunks];
    for (sequence, result) in outcomes {
        if let Some(slot) = slots.get_mut(sequence) {
            *slot = Some(result);
        }
    }

    let mut issues = Vec::new();
    for slot in slots {
        match slot {
            Some(Ok(found)) => issues.extend(found),
            Some(Err(e)) => return Finding::failed(filename, e.summary()),
            None => {
                let missing = AnalysisError::Unavailable("analysis task did not complete".into());
                return Finding::failed(filename, missing.summary());
            }
        }
    }

    Finding::with_issues(filename, issues)
}

/// Build one finding per planned file, in plan order.
///
/// Outcomes for files not in the plan are ignored.
pub fn aggregate(plan: &[PlannedFile], outcomes: Vec<ChunkOutcome>) -> Vec<Finding> {
    let mut by_file: BTreeMap<usize, Vec<(usize, Result<Vec<String>, AnalysisError>)>> =
        BTreeMap::new();
    for outcome in outcomes {
        by_file
            .entry(outcome.file_index)
            .or_default()
            .push((outcome.sequence, outcome.result));
    }

    plan.iter()
        .map(|file| {
            let outcomes = by_file.remove(&file.file_index).unwrap_or_default();
            aggregate_file(&file.filename, file.chunks, outcomes)
        })
        .collect()
}
