//! Line-preserving patch chunking.
//!
//! Large patches are cut into pieces no larger than a byte budget so each
//! analysis call stays within backend limits. Cuts only ever fall on line
//! boundaries, and concatenating the chunks in `sequence` order gives back the
//! original patch byte for byte.

use securepilot_core::{ChangedFile, Chunk};

/// Split a changed file's patch into ordered chunks.
///
/// `file_index` is the file's position in the host-reported list and is
/// copied into every chunk. A file without a patch yields no chunks.
///
/// # Examples
///
/// ```
/// use securepilot_core::{ChangedFile, FileStatus};
/// use securepilot_difflens::chunker::split_file;
///
/// let file = ChangedFile {
///     filename: "a.py".into(),
///     patch: Some("+one\n+two\n+three\n".into()),
///     status: FileStatus::Added,
/// };
/// let chunks = split_file(4, &file, 10);
/// assert_eq!(chunks.len(), 2);
/// assert!(chunks.iter().all(|c| c.file_index == 4));
/// assert_eq!(chunks[0].content, "+one\n+two\n");
/// assert_eq!(chunks[1].content, "+three\n");
/// ```
pub fn split_file(file_index: usize, file: &ChangedFile, max_bytes: usize) -> Vec<Chunk> {
    match file.patch.as_deref() {
        Some(patch) => split_patch(file_index, patch, max_bytes),
        None => Vec::new(),
    }
}

/// Split raw patch text into the fewest line-aligned chunks of at most
/// `max_bytes` each.
///
/// Lines are packed greedily, which is optimal for contiguous splits. A single
/// line longer than `max_bytes` is never cut; it becomes a chunk of its own
/// and is the only case where a chunk exceeds the budget. A `max_bytes` of
/// zero is treated as one.
///
/// # Examples
///
/// ```
/// use securepilot_difflens::chunker::split_patch;
///
/// let chunks = split_patch(0, "+short\n", 1024);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].sequence, 0);
/// ```
pub fn split_patch(file_index: usize, patch: &str, max_bytes: usize) -> Vec<Chunk> {
    let max_bytes = max_bytes.max(1);

    if patch.len() <= max_bytes {
        return vec![Chunk {
            file_index,
            sequence: 0,
            content: patch.to_string(),
        }];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in patch.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > max_bytes {
            chunks.push(Chunk {
                file_index,
                sequence: chunks.len(),
                content: std::mem::take(&mut current),
            });
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            file_index,
            sequence: chunks.len(),
            content: current,
        });
    }

    chunks
}
