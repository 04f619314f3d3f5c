//! Book catalog collaborator interface.

use crate::types::BookId;

/// Read-only collaborator answering page-count lookups.
///
/// The engine snapshots the answer into each journaled op, so replay never
/// consults the catalog again. Lookups run on the runtime loop task, so
/// implementations must be shareable across threads.
pub trait BookCatalog: Send + Sync + 'static {
    /// Total page count of the reference edition, when the catalog knows it.
    fn effective_total_pages(&self, book_id: BookId) -> Option<u32>;
}

/// Catalog backed by a fixed map, for tests and embedders without a catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    totals: hashbrown::HashMap<BookId, u32>,
}

impl StaticCatalog {
    /// Empty catalog; every lookup answers `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page count for `book_id`.
    pub fn set(&mut self, book_id: BookId, total_pages: u32) {
        self.totals.insert(book_id, total_pages);
    }
}

impl BookCatalog for StaticCatalog {
    fn effective_total_pages(&self, book_id: BookId) -> Option<u32> {
        self.totals.get(&book_id).copied()
    }
}
