// src/exec/tail.rs

//! Incremental reads of a job's output file.

use std::path::Path;

use anyhow::Result;

use crate::fs::FileSystem;

/// Text read from an output file since the caller's last offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputChunk {
    pub text: String,
    /// Offset to pass to the next call.
    pub next_offset: u64,
    /// The file shrank below the requested offset (it was rewritten), so
    /// `text` starts from the beginning of the file again.
    pub truncated: bool,
}

/// Read `path` from `offset` to its current end.
///
/// A missing file yields an empty chunk at offset 0.
pub fn read_chunk(fs: &dyn FileSystem, path: &Path, offset: u64) -> Result<OutputChunk> {
    if !fs.is_file(path) {
        return Ok(OutputChunk::default());
    }

    let len = fs.file_len(path)?;
    let (start, truncated) = if len < offset { (0, true) } else { (offset, false) };
    let bytes = fs.read_from(path, start)?;

    Ok(OutputChunk {
        next_offset: start + bytes.len() as u64,
        text: String::from_utf8_lossy(&bytes).into_owned(),
        truncated,
    })
}
