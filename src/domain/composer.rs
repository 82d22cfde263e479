//! Draft state for the outgoing message composer.

/// Maximum allowed draft length (marketplace message limit).
const MAX_DRAFT_LENGTH: usize = 2_000;

/// Text the user is composing for the open booking.
///
/// A failed send restores the attempted text here so the user can retry;
/// a successful send leaves the composer empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComposerState {
    draft: String,
}

impl ComposerState {
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_empty(&self) -> bool {
        self.draft.is_empty()
    }

    /// Replaces the draft, truncating at the character limit.
    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.chars().take(MAX_DRAFT_LENGTH).collect();
    }

    /// Takes the draft out for sending, leaving the composer empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.draft)
    }

    /// Puts a failed send's text back so the user can retry it.
    pub fn restore(&mut self, text: &str) {
        self.set_draft(text);
    }

    pub fn clear(&mut self) {
        self.draft.clear();
    }
}
