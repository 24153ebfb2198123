//! Email attachments, held either as bytes or as a file path read at send time.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RelayError;

/// An email attachment.
///
/// ```
/// use mailroute::Attachment;
///
/// let report = Attachment::from_bytes("report.pdf", b"%PDF".to_vec());
/// assert_eq!(report.content_type, "application/pdf");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename presented to the recipient
    pub filename: String,
    /// MIME content type
    pub content_type: String,
    /// Raw data (empty for path-based attachments)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    /// File path, read when the provider needs the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Attachment {
    /// Create an attachment from raw bytes. Content type is guessed from the filename.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            content_type,
            data,
            path: None,
        }
    }

    /// Create a path-based attachment. The file must exist now; it is read at send time.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RelayError::AttachmentFileNotFound(
                path.display().to_string(),
            ));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self {
            filename,
            content_type,
            data: Vec::new(),
            path: Some(path.to_string_lossy().into_owned()),
        })
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Get the attachment data, reading the file for path-based attachments.
    pub fn get_data(&self) -> Result<Vec<u8>, RelayError> {
        if let Some(ref path) = self.path {
            std::fs::read(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RelayError::AttachmentFileNotFound(path.clone())
                } else {
                    RelayError::AttachmentReadError(format!("{}: {}", path, e))
                }
            })
        } else if self.data.is_empty() {
            Err(RelayError::AttachmentMissingContent(self.filename.clone()))
        } else {
            Ok(self.data.clone())
        }
    }

    /// Base64-encoded content.
    pub fn base64_data(&self) -> Result<String, RelayError> {
        let data = self.get_data()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(data))
    }

    /// Check if this is a path-based attachment.
    pub fn is_path_based(&self) -> bool {
        self.path.is_some()
    }
}
