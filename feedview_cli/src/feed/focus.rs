//! Focus tracking for the selected entry

use super::buffer::BufferStore;
use feedview_common::EntryKey;

/// Tracks the single focused entry as a weak reference into the buffer
///
/// The key is not cleared when its entry is evicted; the tracker only picks a
/// focus by itself when the buffer first fills and nothing is focused yet.
#[derive(Debug)]
pub struct FocusTracker {
    focused: Option<EntryKey>,
    buffer_was_empty: bool,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self {
            focused: None,
            buffer_was_empty: true,
        }
    }

    pub fn focused(&self) -> Option<&EntryKey> {
        self.focused.as_ref()
    }

    /// Explicit user selection
    pub fn select(&mut self, key: EntryKey) {
        self.focused = Some(key);
    }

    /// Observe the buffer after a mutation
    ///
    /// Returns true when the focus was initialised by this call.
    pub fn on_buffer_changed(&mut self, buffer: &BufferStore) -> bool {
        let was_empty = self.buffer_was_empty;
        self.buffer_was_empty = buffer.is_empty();

        if !was_empty || buffer.is_empty() || self.focused.is_some() {
            return false;
        }

        self.focused = buffer.head_key();
        self.focused.is_some()
    }

    /// Whether the focused key still refers to a retained entry
    pub fn is_stale(&self, buffer: &BufferStore) -> bool {
        self.focused
            .as_ref()
            .map(|key| !buffer.contains(key))
            .unwrap_or(false)
    }
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self::new()
    }
}
