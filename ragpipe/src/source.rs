//! Loading documents from the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// File extensions treated as plain text.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

const PROVIDER: &str = "filesystem";

/// List the text files under `root`, sorted by path.
///
/// If `root` is a file it is returned as-is, whatever its extension.
pub fn discover_text_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(RagError::CollaboratorUnavailable {
            provider: PROVIDER.to_string(),
            message: format!("'{}' is not a file or directory", root.display()),
        });
    }

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    files.sort();
    Ok(files)
}

/// Read one file as a [`Document`] whose ID is the file path.
pub fn load_document(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| RagError::CollaboratorUnavailable {
        provider: PROVIDER.to_string(),
        message: format!("failed to read '{}': {e}", path.display()),
    })?;
    let text = String::from_utf8(bytes).map_err(|_| RagError::InvalidInput {
        provider: PROVIDER.to_string(),
        message: format!("'{}' is not valid UTF-8", path.display()),
    })?;

    let id = path.display().to_string();
    let mut document = Document::new(id.clone(), text).with_metadata("path", id.clone());
    document.source_uri = Some(id);
    Ok(document)
}

/// Load every text file under `root` (or `root` itself if it is a file).
pub fn load_documents(root: impl AsRef<Path>) -> Result<Vec<Document>> {
    let files = discover_text_files(root.as_ref())?;
    let documents = files.iter().map(load_document).collect::<Result<Vec<_>>>()?;
    debug!(root = %root.as_ref().display(), count = documents.len(), "loaded documents");
    Ok(documents)
}
