//! Single-slot store for the attachment waiting to be sent.

use scorpion_core::types::ImagePayload;

use crate::error::ChatError;

/// Holds at most one pending image between selection and send.
#[derive(Debug, Default)]
pub struct AttachmentStore {
    pending: Option<ImagePayload>,
    max_bytes: usize,
}

impl AttachmentStore {
    /// Create an empty store that accepts payloads up to `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            pending: None,
            max_bytes,
        }
    }

    /// Store `payload`, replacing any attachment already pending.
    ///
    /// Returns the replaced attachment, if there was one.
    pub fn set(&mut self, payload: ImagePayload) -> Result<Option<ImagePayload>, ChatError> {
        if payload.is_empty() {
            return Err(ChatError::InvalidAttachment("payload is empty".to_string()));
        }
        if !payload.media_type.starts_with("image/") {
            return Err(ChatError::InvalidAttachment(format!(
                "unsupported media type '{}'",
                payload.media_type
            )));
        }
        if payload.len() > self.max_bytes {
            return Err(ChatError::AttachmentTooLarge {
                size: payload.len(),
                limit: self.max_bytes,
            });
        }
        Ok(self.pending.replace(payload))
    }

    /// Remove and return the pending attachment.
    pub fn take(&mut self) -> Option<ImagePayload> {
        self.pending.take()
    }

    /// Drop the pending attachment. Returns whether one was pending.
    pub fn clear(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn peek(&self) -> Option<&ImagePayload> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
