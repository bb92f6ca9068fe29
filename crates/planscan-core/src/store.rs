//! Per-page column store.
//!
//! [`ColumnStore`] is the only authoritative collection of columns. Every id
//! is assigned here, which keeps the page invariants true by construction:
//!
//! - ids are unique within a page
//! - automatic columns are always `C-1..C-n`, contiguous, in detection order
//! - manual columns are `M-1, M-2, ...`, monotonic per page, never renumbered
//!   and never reused, not even after deletion
//! - automatic columns precede manual ones in [`ColumnStore::list`]
//!
//! Re-detection replaces the automatic columns of a page and leaves its
//! manual columns untouched.

use crate::column::{Column, ColumnId, ColumnOrigin, ColumnPatch, AUTOMATIC_PREFIX, MANUAL_PREFIX};
use crate::error::{PlanscanError, Result};
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Side of a manually placed column when none is configured.
pub const DEFAULT_MANUAL_SIZE: f64 = 30.0;

/// A store shared between the detection runner and edit callers.
pub type SharedColumnStore = Arc<Mutex<ColumnStore>>;

/// Lock the shared store, reporting a poisoned lock as a task failure.
///
/// # Errors
///
/// [`PlanscanError::Task`] if a previous holder panicked.
pub fn lock_store(store: &SharedColumnStore) -> Result<MutexGuard<'_, ColumnStore>> {
    store.lock().map_err(|_| PlanscanError::Task {
        reason: "column store lock poisoned".to_string(),
    })
}

/// Persisted state of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub columns: Vec<Column>,
    /// Number of the next manual id (`M-{next_manual}`)
    #[serde(default = "first_manual_number")]
    pub next_manual: u64,
}

const fn first_manual_number() -> u64 {
    1
}

#[derive(Debug, Clone)]
struct PageColumns {
    columns: Vec<Column>,
    next_manual: u64,
}

impl Default for PageColumns {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            next_manual: first_manual_number(),
        }
    }
}

impl PageColumns {
    fn automatic_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_automatic()).count()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    /// Re-pack automatic ids to `C-1..C-n` in current order. A label that
    /// still mirrors the old id follows the new one.
    fn renumber_automatic(&mut self) {
        for (i, column) in self.columns.iter_mut().filter(|c| c.is_automatic()).enumerate() {
            let id = format!("{AUTOMATIC_PREFIX}{}", i + 1);
            if column.id != id {
                if column.label == column.id {
                    column.label.clone_from(&id);
                }
                column.id = id;
            }
        }
    }

    fn allocate_manual_id(&mut self) -> ColumnId {
        let id = format!("{MANUAL_PREFIX}{}", self.next_manual);
        self.next_manual = self.next_manual.saturating_add(1);
        id
    }
}

/// Canonical per-page collection of [`Column`]s.
#[derive(Debug, Clone)]
pub struct ColumnStore {
    pages: BTreeMap<usize, PageColumns>,
    manual_size: f64,
}

impl Default for ColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            manual_size: DEFAULT_MANUAL_SIZE,
        }
    }

    /// Store placing manual columns of side `size` (base coordinates).
    #[must_use]
    pub fn with_manual_size(size: f64) -> Self {
        Self {
            pages: BTreeMap::new(),
            manual_size: size,
        }
    }

    /// Wrap in the shared handle used by the detection runner.
    #[must_use]
    pub fn into_shared(self) -> SharedColumnStore {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    #[must_use]
    pub const fn manual_size(&self) -> f64 {
        self.manual_size
    }

    /// Replace the automatic columns of `page`.
    ///
    /// The incoming columns become `C-1..C-n` in the given order, forced to
    /// automatic origin, and are placed ahead of the page's manual columns,
    /// which keep their ids, fields and relative order. Returns the number of
    /// automatic columns now on the page.
    pub fn replace_detected(&mut self, page: usize, columns: Vec<Column>) -> usize {
        let entry = self.pages.entry(page).or_default();
        let removed = entry.automatic_count();

        let mut next: Vec<Column> = Vec::with_capacity(columns.len() + entry.columns.len());
        for (i, mut column) in columns.into_iter().enumerate() {
            let id = format!("{AUTOMATIC_PREFIX}{}", i + 1);
            if column.label.is_empty() || column.label == column.id {
                column.label.clone_from(&id);
            }
            column.id = id;
            column.origin = ColumnOrigin::Automatic;
            next.push(column);
        }
        let count = next.len();
        next.extend(entry.columns.drain(..).filter(Column::is_manual));
        entry.columns = next;

        log::info!(
            "Page {}: replaced {} automatic columns with {} ({} manual kept)",
            page,
            removed,
            count,
            entry.columns.len() - count
        );
        count
    }

    /// Place a manual column of the configured size centered on `center`
    /// (base coordinates). Returns its id.
    pub fn add_manual(&mut self, page: usize, center: Point) -> ColumnId {
        self.add_manual_sized(page, center, self.manual_size)
    }

    /// Place a manual column of side `size` centered on `center`.
    pub fn add_manual_sized(&mut self, page: usize, center: Point, size: f64) -> ColumnId {
        let entry = self.pages.entry(page).or_default();
        let id = entry.allocate_manual_id();
        entry
            .columns
            .push(Column::manual(id.clone(), Rect::centered(center, size)));
        log::debug!("Page {}: added manual column {}", page, id);
        id
    }

    /// Remove a column. Deleting an automatic column re-packs the remaining
    /// automatic ids; manual ids are never touched.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::ColumnNotFound`] for an unknown page or id.
    pub fn delete_column(&mut self, page: usize, id: &str) -> Result<Column> {
        let entry = self
            .pages
            .get_mut(&page)
            .ok_or_else(|| PlanscanError::column_not_found(page, id))?;
        let index = entry
            .position(id)
            .ok_or_else(|| PlanscanError::column_not_found(page, id))?;

        let removed = entry.columns.remove(index);
        if removed.is_automatic() {
            entry.renumber_automatic();
        }
        log::debug!("Page {}: deleted column {}", page, removed.id);
        Ok(removed)
    }

    /// Merge the editable fields of `patch` into a column. Geometry and id
    /// cannot change through this path.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::ColumnNotFound`] for an unknown page or id.
    pub fn update_fields(&mut self, page: usize, id: &str, patch: &ColumnPatch) -> Result<&Column> {
        let column = self
            .pages
            .get_mut(&page)
            .and_then(|entry| entry.columns.iter_mut().find(|c| c.id == id))
            .ok_or_else(|| PlanscanError::column_not_found(page, id))?;
        patch.apply_to(column);
        Ok(&*column)
    }

    /// Columns of `page` in order: automatic first, then manual. Empty for
    /// an unknown page.
    #[must_use]
    pub fn list(&self, page: usize) -> &[Column] {
        self.pages
            .get(&page)
            .map(|entry| entry.columns.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, page: usize, id: &str) -> Option<&Column> {
        self.list(page).iter().find(|c| c.id == id)
    }

    /// Drop every column of one page, including its manual-id counter.
    /// Returns whether the page existed.
    pub fn clear_page(&mut self, page: usize) -> bool {
        self.pages.remove(&page).is_some()
    }

    /// Drop everything (document unloaded, project switched).
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Pages that have a column set, ascending.
    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    /// Total number of columns across all pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.values().map(|entry| entry.columns.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole store for persistence.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<usize, PageSnapshot> {
        self.pages
            .iter()
            .map(|(&page, entry)| {
                (
                    page,
                    PageSnapshot {
                        columns: entry.columns.clone(),
                        next_manual: entry.next_manual,
                    },
                )
            })
            .collect()
    }

    /// Rebuild a store from persisted pages.
    ///
    /// Persisted data is not trusted to satisfy the page invariants: automatic
    /// columns are moved first and re-packed, the manual counter is raised
    /// past every stored `M-n`, and manual columns with a duplicate or foreign
    /// id get a fresh one. Manual numbers above [`MAX_MANUAL_NUMBER`] count as
    /// foreign and the counter is capped there.
    #[must_use]
    pub fn from_snapshot(pages: BTreeMap<usize, PageSnapshot>) -> Self {
        let mut store = Self::new();
        for (page, snapshot) in pages {
            let highest = snapshot
                .columns
                .iter()
                .filter(|c| c.is_manual())
                .filter_map(|c| manual_number(&c.id))
                .max()
                .unwrap_or(0);

            if snapshot.next_manual > MAX_MANUAL_NUMBER {
                log::warn!(
                    "Page {}: manual id counter {} out of range, capped at {}",
                    page,
                    snapshot.next_manual,
                    MAX_MANUAL_NUMBER
                );
            }
            let mut entry = PageColumns {
                columns: Vec::with_capacity(snapshot.columns.len()),
                next_manual: snapshot
                    .next_manual
                    .min(MAX_MANUAL_NUMBER)
                    .max(highest.saturating_add(1)),
            };
            let (automatic, manual): (Vec<Column>, Vec<Column>) =
                snapshot.columns.into_iter().partition(Column::is_automatic);
            entry.columns.extend(automatic);
            entry.renumber_automatic();

            let mut seen: HashSet<ColumnId> = HashSet::new();
            for mut column in manual {
                if manual_number(&column.id).is_none() || !seen.insert(column.id.clone()) {
                    let id = entry.allocate_manual_id();
                    log::warn!(
                        "Page {}: manual column {:?} re-identified as {}",
                        page,
                        column.id,
                        id
                    );
                    if column.label == column.id {
                        column.label.clone_from(&id);
                    }
                    column.id = id.clone();
                    seen.insert(id);
                }
                entry.columns.push(column);
            }
            store.pages.insert(page, entry);
        }
        store
    }
}

/// Largest `n` accepted in a persisted manual id `M-n`.
pub const MAX_MANUAL_NUMBER: u64 = u64::MAX / 2;

/// `n` of a manual id `M-n`, if it is in range.
fn manual_number(id: &str) -> Option<u64> {
    id.strip_prefix(MANUAL_PREFIX)?
        .parse()
        .ok()
        .filter(|n| *n <= MAX_MANUAL_NUMBER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    fn detected(n: usize) -> Vec<Column> {
        (0..n)
            .map(|i| {
                Column::detected(
                    format!("tmp-{i}"),
                    Rect::new(i as f64 * 50.0, 100.0, 40.0, 40.0),
                )
            })
            .collect()
    }

    fn ids(store: &ColumnStore, page: usize) -> Vec<String> {
        store.list(page).iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn test_replace_detected_numbers_from_one() {
        let mut store = ColumnStore::new();
        assert_eq!(store.replace_detected(0, detected(3)), 3);
        assert_eq!(ids(&store, 0), ["C-1", "C-2", "C-3"]);
        assert_eq!(store.list(0)[1].label, "C-2");
    }

    #[test]
    fn test_replace_detected_keeps_manual() {
        let mut store = ColumnStore::new();
        store.replace_detected(0, detected(2));
        let manual = store.add_manual(0, Point::new(500.0, 500.0));
        store
            .update_fields(
                0,
                &manual,
                &ColumnPatch {
                    note: Some("hand placed".to_string()),
                    ..ColumnPatch::default()
                },
            )
            .unwrap();

        store.replace_detected(0, detected(1));
        assert_eq!(ids(&store, 0), ["C-1", "M-1"]);
        assert_eq!(store.get(0, "M-1").unwrap().note, "hand placed");
    }

    #[test]
    fn test_add_manual_geometry() {
        let mut store = ColumnStore::new();
        let id = store.add_manual(2, Point::new(100.0, 60.0));
        let column = store.get(2, &id).unwrap();
        assert_eq!(id, "M-1");
        assert_eq!(column.geometry, Rect::new(85.0, 45.0, 30.0, 30.0));
        assert_eq!(column.column_type, ColumnType::Manual);
        assert_eq!(column.confidence, 1.0);
    }

    #[test]
    fn test_delete_automatic_repacks() {
        let mut store = ColumnStore::new();
        store.replace_detected(0, detected(4));
        store.add_manual(0, Point::new(10.0, 10.0));

        let removed = store.delete_column(0, "C-2").unwrap();
        assert_eq!(removed.geometry.x, 50.0);
        assert_eq!(ids(&store, 0), ["C-1", "C-2", "C-3", "M-1"]);
        // Former C-3 moved up, label followed
        assert_eq!(store.get(0, "C-2").unwrap().geometry.x, 100.0);
        assert_eq!(store.get(0, "C-2").unwrap().label, "C-2");
    }

    #[test]
    fn test_custom_label_survives_repack() {
        let mut store = ColumnStore::new();
        let mut columns = detected(2);
        columns[1].label = "grid B4".to_string();
        store.replace_detected(0, columns);
        store.delete_column(0, "C-1").unwrap();
        assert_eq!(store.list(0)[0].id, "C-1");
        assert_eq!(store.list(0)[0].label, "grid B4");
    }

    #[test]
    fn test_manual_ids_never_reused() {
        let mut store = ColumnStore::new();
        store.add_manual(0, Point::new(0.0, 0.0));
        let second = store.add_manual(0, Point::new(50.0, 0.0));
        store.delete_column(0, &second).unwrap();
        assert_eq!(store.add_manual(0, Point::new(90.0, 0.0)), "M-3");
        // Independent counter per page
        assert_eq!(store.add_manual(1, Point::new(0.0, 0.0)), "M-1");
    }

    #[test]
    fn test_unknown_page_and_id() {
        let mut store = ColumnStore::new();
        assert!(store.list(7).is_empty());
        assert!(store.get(7, "C-1").is_none());
        assert!(store.delete_column(7, "C-1").unwrap_err().is_not_found());

        store.replace_detected(0, detected(1));
        let err = store
            .update_fields(0, "C-9", &ColumnPatch::default())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_page_and_clear() {
        let mut store = ColumnStore::new();
        store.replace_detected(0, detected(2));
        store.replace_detected(3, detected(1));
        assert_eq!(store.pages().collect::<Vec<_>>(), [0, 3]);
        assert!(store.clear_page(0));
        assert!(!store.clear_page(0));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_manual_counter() {
        let mut store = ColumnStore::new();
        store.replace_detected(1, detected(2));
        store.add_manual(1, Point::new(0.0, 0.0));
        let doomed = store.add_manual(1, Point::new(40.0, 0.0));
        store.delete_column(1, &doomed).unwrap();

        let mut restored = ColumnStore::from_snapshot(store.snapshot());
        assert_eq!(ids(&restored, 1), ids(&store, 1));
        assert_eq!(restored.add_manual(1, Point::new(0.0, 0.0)), "M-3");
    }

    #[test]
    fn test_from_snapshot_repairs_invariants() {
        let mut columns = vec![
            Column::manual("M-4".to_string(), Rect::new(0.0, 0.0, 30.0, 30.0)),
            Column::detected("C-7".to_string(), Rect::new(0.0, 0.0, 40.0, 40.0)),
            Column::manual("M-4".to_string(), Rect::new(50.0, 0.0, 30.0, 30.0)),
        ];
        columns[1].label = "C-7".to_string();
        let mut pages = BTreeMap::new();
        pages.insert(
            0,
            PageSnapshot {
                columns,
                next_manual: 1,
            },
        );

        let store = ColumnStore::from_snapshot(pages);
        assert_eq!(ids(&store, 0), ["C-1", "M-4", "M-5"]);
        assert_eq!(store.list(0)[0].label, "C-1");
    }

    #[test]
    fn test_out_of_range_manual_id_is_reidentified() {
        let mut pages = BTreeMap::new();
        pages.insert(
            0,
            PageSnapshot {
                columns: vec![
                    Column::manual("M-2".to_string(), Rect::new(0.0, 0.0, 30.0, 30.0)),
                    Column::manual(format!("M-{}", u64::MAX), Rect::new(50.0, 0.0, 30.0, 30.0)),
                ],
                next_manual: 1,
            },
        );

        let mut store = ColumnStore::from_snapshot(pages);
        assert_eq!(ids(&store, 0), ["M-2", "M-3"]);
        assert_eq!(store.add_manual(0, Point::new(0.0, 0.0)), "M-4");
    }

    #[test]
    fn test_saturated_manual_counter_does_not_overflow() {
        let mut pages = BTreeMap::new();
        pages.insert(
            0,
            PageSnapshot {
                columns: Vec::new(),
                next_manual: u64::MAX,
            },
        );

        let mut store = ColumnStore::from_snapshot(pages);
        let first = store.add_manual(0, Point::new(0.0, 0.0));
        let second = store.add_manual(0, Point::new(50.0, 0.0));
        assert_eq!(first, format!("M-{MAX_MANUAL_NUMBER}"));
        assert_ne!(first, second);
        assert_eq!(ColumnStore::from_snapshot(store.snapshot()).list(0).len(), 2);
    }
}
