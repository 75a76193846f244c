use crate::models::ContentDescriptor;
use std::sync::Arc;

/// Append-only list of documents whose upload completed.
///
/// Entries keep insertion order and are never removed, reordered or
/// deduplicated.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: Vec<ContentDescriptor>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, descriptor: ContentDescriptor) {
        self.entries.push(descriptor);
    }

    pub fn list(&self) -> &[ContentDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy handed to readers outside the coordinator.
    pub fn snapshot(&self) -> Arc<[ContentDescriptor]> {
        Arc::from(self.entries.as_slice())
    }
}
