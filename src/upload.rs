// ============================================================================
// Upload Bundles
// ============================================================================
//
// Files received in one multipart request, held in memory only until they are
// re-encoded into the outbound multipart body for the video service.
//
// ============================================================================

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original filename as sent by the client
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// 1..=max files taken from a single form field
#[derive(Debug)]
pub struct UploadBundle {
    files: Vec<UploadedFile>,
}

impl UploadBundle {
    /// Validate a file count against the bundle bounds
    pub fn new(files: Vec<UploadedFile>, max_files: usize) -> AppResult<Self> {
        if files.is_empty() {
            return Err(AppError::validation(empty_message(max_files)));
        }
        if files.len() > max_files {
            return Err(AppError::validation(too_many_message(max_files)));
        }
        Ok(Self { files })
    }

    /// Read the files of `field_name` out of a multipart body.
    ///
    /// Parts under other names are skipped. Reading stops as soon as the cap
    /// is exceeded so an oversized form is never fully buffered.
    pub async fn from_multipart(
        multipart: &mut Multipart,
        field_name: &str,
        max_files: usize,
    ) -> AppResult<Self> {
        let mut files = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(field_name) {
                continue;
            }
            if files.len() == max_files {
                return Err(AppError::validation(too_many_message(max_files)));
            }

            let file_name = field.file_name().unwrap_or(field_name).to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;

            tracing::debug!(
                field = %field_name,
                file_name = %file_name,
                size_bytes = data.len(),
                "Received upload part"
            );

            files.push(UploadedFile {
                file_name,
                content_type,
                data,
            });
        }

        Self::new(files, max_files)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.data.len()).sum()
    }

    pub fn into_files(self) -> Vec<UploadedFile> {
        self.files
    }
}

fn empty_message(max_files: usize) -> &'static str {
    if max_files == 1 {
        "No file provided"
    } else {
        "No files provided"
    }
}

fn too_many_message(max_files: usize) -> String {
    if max_files == 1 {
        "Only one file allowed".to_string()
    } else {
        format!("Maximum {} files allowed", max_files)
    }
}
