//! Canonical page contents.

use pagesync_protocol::{Checksum, ChecksumsUpdatedPush, DataUnit, ItemIndex, PageId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Items of one page and their checksums.
///
/// Both maps always hold the same keys.
struct Page<T> {
    units: HashMap<ItemIndex, T>,
    checksums: HashMap<ItemIndex, Checksum>,
}

impl<T> Page<T> {
    fn new() -> Self {
        Self {
            units: HashMap::new(),
            checksums: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A mutation that replicas should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageChange {
    /// Items were inserted, updated or removed; the page still exists.
    Updated {
        /// Page that changed.
        page: PageId,
        /// New checksums of inserted or changed items.
        updated: Vec<(ItemIndex, Checksum)>,
        /// Items that were deleted.
        removed: Vec<ItemIndex>,
    },
    /// The page is gone.
    Removed {
        /// Page that was deleted.
        page: PageId,
    },
}

impl PageChange {
    /// The page this change is about.
    pub fn page(&self) -> PageId {
        match self {
            PageChange::Updated { page, .. } | PageChange::Removed { page } => *page,
        }
    }

    /// Converts the change into the push sent to replicas.
    pub fn into_push(self) -> ChecksumsUpdatedPush {
        match self {
            PageChange::Updated {
                page,
                updated,
                removed,
            } => ChecksumsUpdatedPush::updated(page, updated, removed),
            PageChange::Removed { page } => ChecksumsUpdatedPush::removed(page),
        }
    }
}

/// Answer to a data-diff query on an existing page.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDiff<T> {
    /// Requested items that exist, with their current content.
    pub new_data: Vec<(ItemIndex, T)>,
    /// Requested items the page does not hold.
    pub removed_indices: Vec<ItemIndex>,
}

/// Thread-safe map of pages.
///
/// Each call takes the lock once, so every read sees a self-consistent page
/// and every write updates items and checksums together.
pub(crate) struct PageStore<T> {
    pages: RwLock<HashMap<PageId, Page<T>>>,
}

impl<T: DataUnit> PageStore<T> {
    pub(crate) fn new() -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
        }
    }

    /// Full checksum listing of a page, sorted by index.
    pub(crate) fn checksums(&self, page: PageId) -> Option<Vec<(ItemIndex, Checksum)>> {
        let pages = self.pages.read();
        let entry = pages.get(&page)?;
        let mut listing: Vec<_> = entry.checksums.iter().map(|(i, c)| (*i, *c)).collect();
        listing.sort_unstable_by_key(|(index, _)| *index);
        Some(listing)
    }

    /// Current content of the requested items.
    pub(crate) fn data_diff(&self, page: PageId, indices: &[ItemIndex]) -> Option<DataDiff<T>> {
        let pages = self.pages.read();
        let entry = pages.get(&page)?;

        let mut diff = DataDiff {
            new_data: Vec::new(),
            removed_indices: Vec::new(),
        };
        for &index in indices {
            match entry.units.get(&index) {
                Some(unit) => diff.new_data.push((index, unit.clone())),
                None => diff.removed_indices.push(index),
            }
        }
        Some(diff)
    }

    pub(crate) fn get(&self, page: PageId, index: ItemIndex) -> Option<T> {
        self.pages.read().get(&page)?.units.get(&index).cloned()
    }

    /// Upserts items. Only items whose checksum changed are reported.
    pub(crate) fn set_items<I>(&self, page: PageId, items: I) -> Option<PageChange>
    where
        I: IntoIterator<Item = (ItemIndex, T)>,
    {
        let mut items = items.into_iter().peekable();
        items.peek()?;

        let mut pages = self.pages.write();
        let entry = pages.entry(page).or_insert_with(Page::new);

        let mut updated = Vec::new();
        for (index, unit) in items {
            let checksum = unit.checksum();
            let previous = entry.checksums.insert(index, checksum);
            entry.units.insert(index, unit);
            if previous != Some(checksum) {
                updated.push((index, checksum));
            }
        }

        if updated.is_empty() {
            return None;
        }
        Some(PageChange::Updated {
            page,
            updated,
            removed: Vec::new(),
        })
    }

    /// Removes items, deleting the page once it is empty.
    pub(crate) fn remove_items(&self, page: PageId, indices: &[ItemIndex]) -> Option<PageChange> {
        let mut pages = self.pages.write();
        let entry = pages.get_mut(&page)?;

        let removed: Vec<ItemIndex> = indices
            .iter()
            .copied()
            .filter(|index| {
                entry.checksums.remove(index);
                entry.units.remove(index).is_some()
            })
            .collect();

        if removed.is_empty() {
            return None;
        }
        if entry.is_empty() {
            pages.remove(&page);
            return Some(PageChange::Removed { page });
        }
        Some(PageChange::Updated {
            page,
            updated: Vec::new(),
            removed,
        })
    }

    pub(crate) fn remove_page(&self, page: PageId) -> Option<PageChange> {
        self.pages
            .write()
            .remove(&page)
            .map(|_| PageChange::Removed { page })
    }

    pub(crate) fn contains_page(&self, page: PageId) -> bool {
        self.pages.read().contains_key(&page)
    }

    /// Ids of all existing pages, sorted.
    pub(crate) fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn page_len(&self, page: PageId) -> usize {
        self.pages.read().get(&page).map_or(0, |p| p.units.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.read().len()
    }

    /// Checks that every page's checksum map matches its items.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.pages.read().values().all(|p| {
            !p.is_empty()
                && p.units.len() == p.checksums.len()
                && p
                    .units
                    .iter()
                    .all(|(i, u)| p.checksums.get(i) == Some(&u.checksum()))
        })
    }
}
