//! `FileSystemPort`: sandboxed file read/write/list.
//!
//! Every operation resolves its path through a [`PathSandbox`] first, then
//! enforces the configured `maxFileSize` cap. Partial reads follow the
//! explicit rule adopted for this crate (see `DESIGN.md`): the served
//! range is `[offset, min(offset + length, size, offset + cap))`,
//! `truncated` iff any bytes were omitted.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use serde::Serialize;

use crate::config::ConfigSnapshot;
use crate::error::ServerError;
use crate::sandbox::PathSandbox;

/// How file bytes should be rendered back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8 text, returned as-is (lossy-decoded if invalid).
    Utf8,
    /// UTF-16LE text, decoded to a Rust `String`.
    Utf16Le,
    /// Raw bytes, base64-encoded.
    Binary,
}

impl Encoding {
    /// Parses the wire encoding name.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "utf-8" => Some(Self::Utf8),
            "utf-16le" => Some(Self::Utf16Le),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Result of a file read.
#[derive(Debug, Clone, Serialize)]
pub struct FileReadResult {
    /// The decoded content (or base64 for binary).
    pub content: String,
    /// Whether the requested range was cut short by `length` or the size cap.
    pub truncated: bool,
    /// Total size of the file on disk, in bytes.
    pub size: u64,
}

/// File-system operations scoped to a workspace sandbox.
pub struct FileSystemPort {
    sandbox: Arc<PathSandbox>,
}

impl FileSystemPort {
    /// Builds a port bound to `sandbox`.
    #[must_use]
    pub fn new(sandbox: Arc<PathSandbox>) -> Self {
        Self { sandbox }
    }

    /// Reads `path`, serving `[offset, min(offset+length, size, offset+cap))`.
    ///
    /// # Errors
    ///
    /// Returns a sandbox rejection, [`ServerError::NotFound`], or
    /// [`ServerError::PermissionDenied`].
    pub async fn read_file(
        &self,
        config: &ConfigSnapshot,
        path: &str,
        offset: u64,
        length: Option<u64>,
        encoding: Encoding,
    ) -> Result<FileReadResult, ServerError> {
        let resolved = self.sandbox.validate(path)?;

        let metadata = tokio::fs::metadata(&resolved).await.map_err(|e| map_io(&resolved, e))?;
        let size = metadata.len();
        let cap = config.tools.file_operations.max_file_size;

        let requested_end = offset.saturating_add(length.unwrap_or(u64::MAX));
        let capped_end = requested_end.min(size).min(offset.saturating_add(cap));
        let served_len = capped_end.saturating_sub(offset);
        let truncated = capped_end < size || (length.is_some() && capped_end < requested_end.min(size));

        let bytes = read_range(&resolved, offset, served_len).await.map_err(|e| map_io(&resolved, e))?;

        let content = match encoding {
            Encoding::Utf8 => String::from_utf8_lossy(&bytes).into_owned(),
            Encoding::Utf16Le => decode_utf16le(&bytes),
            Encoding::Binary => base64::engine::general_purpose::STANDARD.encode(&bytes),
        };

        Ok(FileReadResult {
            content,
            truncated,
            size,
        })
    }

    /// Writes `contents` to `path`, refusing to exceed `maxFileSize` and
    /// refusing to overwrite an existing file unless
    /// `security.allowDestructiveOperations` is set.
    ///
    /// # Errors
    ///
    /// Returns a sandbox rejection, [`ServerError::InvalidArguments`] if
    /// the payload exceeds the size cap, or [`ServerError::PermissionDenied`]
    /// if overwrite is attempted without permission.
    pub async fn write_file(
        &self,
        config: &ConfigSnapshot,
        path: &str,
        contents: &[u8],
        create_parent_dirs: bool,
    ) -> Result<(), ServerError> {
        let resolved = self.sandbox.validate(path)?;

        let cap = config.tools.file_operations.max_file_size;
        if contents.len() as u64 > cap {
            return Err(ServerError::InvalidArguments {
                tool: "write_file".to_string(),
                message: format!("payload of {} bytes exceeds maxFileSize of {cap} bytes", contents.len()),
            });
        }

        if resolved.exists() && !config.security.allow_destructive_operations {
            return Err(ServerError::PermissionDenied { path: resolved });
        }

        if create_parent_dirs {
            if let Some(parent) = resolved.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| map_io(parent, e))?;
            }
        }

        tokio::fs::write(&resolved, contents).await.map_err(|e| map_io(&resolved, e))
    }

    /// Lists the entries of a directory.
    ///
    /// # Errors
    ///
    /// Returns a sandbox rejection or an IO error mapped via [`map_io`].
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirEntryInfo>, ServerError> {
        let resolved = self.sandbox.validate(path)?;
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&resolved).await.map_err(|e| map_io(&resolved, e))?;

        while let Some(entry) = read_dir.next_entry().await.map_err(|e| map_io(&resolved, e))? {
            let metadata = entry.metadata().await.map_err(|e| map_io(&entry.path(), e))?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: metadata.is_dir(),
                size: metadata.len(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// One entry in a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct DirEntryInfo {
    /// File or directory name (not a full path).
    pub name: String,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

async fn read_range(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    let read = file.read(&mut buf).await?;
    buf.truncate(read);
    Ok(buf)
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn map_io(path: &Path, err: std::io::Error) -> ServerError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ServerError::NotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ServerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ServerError::internal(format!("io error on {}", path.display()), err),
    }
}
