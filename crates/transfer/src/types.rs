/// A contiguous byte range of the source, the unit of part submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 1-based index, increasing with offset.
    pub index: u32,
    /// Byte offset within the source.
    pub offset: u64,
    /// Size of this part in bytes.
    pub size: u64,
}

impl Part {
    /// Offset one past the last byte of this part.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// A byte range inside a [`Part`], uploaded and retried on its own in
/// intelligent ingestion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubChunk {
    /// Offset relative to the start of the owning part.
    pub offset_in_part: u64,
    /// Size of this sub-chunk in bytes.
    pub size: u64,
}
