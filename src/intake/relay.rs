//! Reviewer notification — the second, best-effort phase of intake.
//!
//! By the time a [`Submission`] exists its bytes are already on disk. A
//! failed forward is reported to the caller and logged, but nothing here can
//! undo the stored file.

use std::path::PathBuf;
use std::sync::Arc;

use crate::channels::{ChatId, Gateway};
use crate::error::RelayError;

use super::prompts::reviewer_caption;

/// One accepted document, ready to hand to the reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Name the submitter gave the file.
    pub original_file_name: String,
    /// Generated name inside the uploads directory.
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub submitter_name: String,
    pub submitter_phone: String,
    /// Gateway reference to the original upload.
    pub file_id: String,
}

/// Forwards every submission to a single fixed reviewer chat.
pub struct RelayNotifier {
    gateway: Arc<dyn Gateway>,
    reviewer: ChatId,
}

impl RelayNotifier {
    pub fn new(gateway: Arc<dyn Gateway>, reviewer: ChatId) -> Self {
        Self { gateway, reviewer }
    }

    pub fn reviewer(&self) -> &ChatId {
        &self.reviewer
    }

    /// Send the original document with a caption describing the submitter.
    pub async fn forward(&self, submission: &Submission) -> Result<(), RelayError> {
        let caption = reviewer_caption(submission);
        self.gateway
            .forward_document(&self.reviewer, &submission.file_id, &caption)
            .await
            .map_err(|source| RelayError::ForwardFailed {
                reviewer: self.reviewer.to_string(),
                source,
            })?;

        tracing::info!(
            reviewer = %self.reviewer,
            stored_as = %submission.stored_name,
            "Submission relayed to reviewer"
        );
        Ok(())
    }
}
