use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::TransferError;
use crate::validation::detect_mime_type;

/// Readable payload of an upload.
///
/// Implementations must allow concurrent positioned reads from several
/// threads; parts of the same source are read in parallel.
pub trait UploadSource: Send + Sync {
    /// File name reported to the backend, if the source has one.
    fn name(&self) -> Option<String>;

    /// Total size in bytes, if it can be determined.
    fn size(&self) -> Option<u64>;

    /// MIME type of the payload, if known.
    fn mime_type(&self) -> Option<String> {
        self.name()
            .and_then(|name| detect_mime_type(&name).map(str::to_string))
    }

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError>;
}

fn check_range(offset: u64, len: u64, size: u64) -> Result<(), TransferError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransferError::OutOfRange { offset, len, size }),
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A file on disk. Reads are serialized behind a lock around seek+read.
pub struct FileSource {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Opens `path` for reading and records its current size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidSource(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for FileSource {
    fn name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_range(offset, len, self.size)?;

        let mut buf = vec![0u8; len as usize];
        let mut file = self
            .file
            .lock()
            .map_err(|_| TransferError::InvalidSource("file handle poisoned".into()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// An in-memory buffer.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
    name: Option<String>,
    mime_type: Option<String>,
}

impl MemorySource {
    /// Wraps `data` without a name or MIME type.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::from(data.into()),
            name: None,
            mime_type: None,
        }
    }

    /// Sets the name reported to the backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the MIME type reported to the backend.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl UploadSource for MemorySource {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn mime_type(&self) -> Option<String> {
        self.mime_type.clone().or_else(|| {
            self.name
                .as_deref()
                .and_then(detect_mime_type)
                .map(str::to_string)
        })
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data[start..start + len as usize].to_vec())
    }
}
