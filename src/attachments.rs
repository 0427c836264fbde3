//! Filesystem storage for report attachments
use super::error::{ApprovalError, ValidationError};
use super::report::Attachment;
use super::utils::new_sequence_id;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

// keep only characters that are safe in a path component
fn sanitize(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(
        &self,
        report_id: &str,
        filename: &str,
        mimetype: &str,
        contents: &[u8],
    ) -> Result<Attachment, ApprovalError> {
        let safe_name = sanitize(filename);
        if safe_name.trim_matches(|c| c == '.' || c == '_').is_empty() {
            return Err(ValidationError::EmptyFilename.into());
        }

        let id = new_sequence_id();
        let dir = self.root.join(report_id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{id}-{safe_name}"));
        std::fs::write(&path, contents)?;

        Ok(Attachment {
            id,
            filename: filename.to_string(),
            path: path.to_string_lossy().into_owned(),
            size: contents.len() as u64,
            mimetype: mimetype.to_string(),
        })
    }

    /// Only paths under the store root are removed.
    pub fn remove(&self, path: &str) -> std::io::Result<()> {
        let path = Path::new(path);
        if !path.starts_with(&self.root) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is outside the attachment root", path.display()),
            ));
        }
        std::fs::remove_file(path)
    }

    pub fn remove_best_effort(&self, path: &str) {
        if let Err(err) = self.remove(path) {
            tracing::warn!(%path, error = %err, "failed to remove attachment");
        }
    }
}
