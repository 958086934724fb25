use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{CellValue, ColumnId, TableRow};
use crate::store::{PersistenceAdapter, PersistenceExt};

pub const PAGE_SIZE_KEY: &str = "pageSize";
pub const COLUMN_VISIBILITY_KEY: &str = "columnVisibility";
pub const COLUMN_ORDER_KEY: &str = "columnOrder";
pub const SORT_KEY: &str = "sortSpec";
pub const COLUMN_FILTERS_KEY: &str = "columnFilters";

/// Sizes offered by the page size picker.
pub const PAGE_SIZES: [usize; 4] = [10, 15, 20, 25];

pub fn page_size_option(size: usize) -> Result<usize> {
    if PAGE_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(Error::Config(format!("page size must be one of {PAGE_SIZES:?}, got {size}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    #[serde(rename = "columnId")]
    pub column: ColumnId,
    #[serde(rename = "descending")]
    pub desc: bool,
}

impl SortKey {
    pub fn desc(column: ColumnId) -> Self {
        SortKey { column, desc: true }
    }

    pub fn asc(column: ColumnId) -> Self {
        SortKey { column, desc: false }
    }
}

pub type SortSpec = Vec<SortKey>;
pub type ColumnFilters = BTreeMap<ColumnId, ColumnFilter>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnFilter {
    /// Inclusive numeric bounds; a missing bound is open.
    Range { min: Option<f64>, max: Option<f64> },
    Flag(bool),
    /// Case-insensitive substring match.
    Text(String),
}

impl ColumnFilter {
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        ColumnFilter::Range { min, max }
    }

    /// Filters that let every row through are never stored.
    pub fn is_noop(&self) -> bool {
        match self {
            ColumnFilter::Range { min, max } => min.is_none() && max.is_none(),
            ColumnFilter::Flag(_) => false,
            ColumnFilter::Text(text) => text.trim().is_empty(),
        }
    }

    pub fn matches(&self, cell: CellValue<'_>) -> bool {
        match self {
            ColumnFilter::Range { min, max } => match cell.as_f64() {
                Some(v) => min.map_or(true, |min| v >= min) && max.map_or(true, |max| v <= max),
                None => false,
            },
            ColumnFilter::Flag(flag) => cell == CellValue::Bool(*flag),
            ColumnFilter::Text(needle) => {
                let needle = needle.trim().to_lowercase();
                match cell {
                    CellValue::Text(text) => text.to_lowercase().contains(&needle),
                    CellValue::Int(Some(v)) => v.to_string().contains(&needle),
                    CellValue::Float(Some(v)) => v.to_string().contains(&needle),
                    _ => false,
                }
            }
        }
    }
}

/// The part of the table state a preset controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub visible_columns: BTreeSet<ColumnId>,
    pub column_order: Vec<ColumnId>,
    pub sort: SortSpec,
    pub column_filters: ColumnFilters,
}

impl ViewSettings {
    pub fn matches(&self, state: &TableViewState) -> bool {
        self.visible_columns == state.visible_columns
            && self.column_order == state.column_order
            && self.sort == state.sort
            && self.column_filters == state.column_filters
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableViewState {
    pub sort: SortSpec,
    pub visible_columns: BTreeSet<ColumnId>,
    /// Empty means natural order.
    pub column_order: Vec<ColumnId>,
    pub column_filters: ColumnFilters,
    pub page_index: usize,
    pub page_size: usize,
}

impl TableViewState {
    pub fn settings(&self) -> ViewSettings {
        ViewSettings {
            visible_columns: self.visible_columns.clone(),
            column_order: self.column_order.clone(),
            sort: self.sort.clone(),
            column_filters: self.column_filters.clone(),
        }
    }
}

/// One page of rows, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub rows: Vec<TableRow>,
    pub columns: Vec<ColumnId>,
    pub page_index: usize,
    pub page_count: usize,
    pub filtered_count: usize,
    pub total_count: usize,
}

pub fn page_count(row_count: usize, page_size: usize) -> usize {
    row_count.div_ceil(page_size.max(1))
}

fn visibility_map(visible: &BTreeSet<ColumnId>) -> BTreeMap<ColumnId, bool> {
    ColumnId::ALL.into_iter().map(|c| (c, visible.contains(&c))).collect()
}

fn visible_from_map(map: &BTreeMap<ColumnId, bool>) -> BTreeSet<ColumnId> {
    // columns the map does not mention are shown
    ColumnId::ALL
        .into_iter()
        .filter(|c| map.get(c).copied().unwrap_or(true))
        .collect()
}

fn sanitize_sort(sort: SortSpec) -> SortSpec {
    let mut seen = BTreeSet::new();
    sort.into_iter()
        .filter(|k| k.column.sortable() && seen.insert(k.column))
        .collect()
}

fn dedup_order(order: Vec<ColumnId>) -> Vec<ColumnId> {
    let mut seen = BTreeSet::new();
    order.into_iter().filter(|c| seen.insert(*c)).collect()
}

fn compare_lowercase(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

fn compare_present(a: CellValue<'_>, b: CellValue<'_>) -> Ordering {
    match (a, b) {
        (CellValue::Int(Some(a)), CellValue::Int(Some(b))) => a.cmp(&b),
        (CellValue::Float(Some(a)), CellValue::Float(Some(b))) => a.total_cmp(&b),
        (CellValue::Text(a), CellValue::Text(b)) => compare_lowercase(a, b),
        (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

/// Stable multi-key sort. Absent values go last in either direction.
pub fn sort_rows(rows: &mut [&TableRow], sort: &[SortKey]) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in sort {
            let (x, y) = (a.cell(key.column), b.cell(key.column));
            let ord = match (x.is_absent(), y.is_absent()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if key.desc => compare_present(x, y).reverse(),
                (false, false) => compare_present(x, y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

pub fn filter_rows<'a>(rows: &'a [TableRow], filters: &ColumnFilters) -> Vec<&'a TableRow> {
    rows.iter()
        .filter(|row| {
            filters
                .iter()
                .all(|(column, filter)| filter.matches(row.cell(*column)))
        })
        .collect()
}

/// Owns sort, columns, filters and pagination of the item table and keeps
/// the persisted copy of each in step.
pub struct TableController {
    state: TableViewState,
    store: Arc<dyn PersistenceAdapter>,
    /// Rows of the last `view()`; `None` until the first one.
    rows: Option<Arc<Vec<TableRow>>>,
    filtered_count: Option<usize>,
}

impl TableController {
    /// Restores the last saved state, falling back to `defaults` key by key.
    pub fn load(
        store: Arc<dyn PersistenceAdapter>,
        defaults: &ViewSettings,
        default_page_size: usize,
    ) -> Self {
        let page_size = store.get(PAGE_SIZE_KEY, default_page_size).max(1);
        let visibility = store.get(
            COLUMN_VISIBILITY_KEY,
            visibility_map(&defaults.visible_columns),
        );
        let column_order = store.get(COLUMN_ORDER_KEY, defaults.column_order.clone());
        let sort = store.get(SORT_KEY, defaults.sort.clone());
        let mut column_filters: ColumnFilters =
            store.get(COLUMN_FILTERS_KEY, defaults.column_filters.clone());
        column_filters.retain(|_, f| !f.is_noop());

        TableController {
            state: TableViewState {
                sort: sanitize_sort(sort),
                visible_columns: visible_from_map(&visibility),
                column_order: dedup_order(column_order),
                column_filters,
                page_index: 0,
                page_size,
            },
            store,
            rows: None,
            filtered_count: None,
        }
    }

    pub fn state(&self) -> &TableViewState {
        &self.state
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.state.sort = sanitize_sort(sort);
        self.state.page_index = 0;
        self.store.set(SORT_KEY, &self.state.sort);
    }

    /// Header click: a new column sorts descending and replaces any other
    /// sort, the same column again flips direction.
    pub fn toggle_sort(&mut self, column: ColumnId) {
        if !column.sortable() {
            return;
        }
        let desc = match self.state.sort.iter().find(|k| k.column == column) {
            Some(current) => !current.desc,
            None => true,
        };
        self.set_sort(vec![SortKey { column, desc }]);
    }

    /// Before the first `view()` the row count is unknown and the index is
    /// taken as given; `view()` clamps it.
    pub fn set_page_index(&mut self, page_index: usize) {
        self.state.page_index = page_index;
        self.clamp_page_index();
    }

    fn clamp_page_index(&mut self) {
        if let Some(pages) = self.page_count() {
            let last = pages.saturating_sub(1);
            if self.state.page_index > last {
                debug!(from = self.state.page_index, to = last, "page index clamped");
                self.state.page_index = last;
            }
        }
    }

    /// Filters decide the row count, so it is recomputed as soon as they change.
    fn recount(&mut self) {
        self.filtered_count = self
            .rows
            .as_ref()
            .map(|rows| filter_rows(rows, &self.state.column_filters).len());
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.state.page_size = page_size.max(1);
        self.state.page_index = 0;
        self.store.set(PAGE_SIZE_KEY, &self.state.page_size);
    }

    /// Showing or hiding columns drops any custom column order.
    pub fn set_column_visibility(
        &mut self,
        patch: impl IntoIterator<Item = (ColumnId, bool)>,
    ) {
        for (column, visible) in patch {
            if visible {
                self.state.visible_columns.insert(column);
            } else {
                self.state.visible_columns.remove(&column);
            }
        }
        self.state.column_order.clear();
        let visibility = visibility_map(&self.state.visible_columns);
        self.store.set(COLUMN_VISIBILITY_KEY, &visibility);
        self.store.set(COLUMN_ORDER_KEY, &self.state.column_order);
    }

    pub fn set_column_order(&mut self, order: Vec<ColumnId>) {
        self.state.column_order = dedup_order(order);
        self.store.set(COLUMN_ORDER_KEY, &self.state.column_order);
    }

    /// `None` or a filter that matches everything removes the column's filter.
    pub fn set_column_filters(
        &mut self,
        patch: impl IntoIterator<Item = (ColumnId, Option<ColumnFilter>)>,
    ) {
        for (column, filter) in patch {
            match filter {
                Some(filter) if !filter.is_noop() => {
                    self.state.column_filters.insert(column, filter);
                }
                _ => {
                    self.state.column_filters.remove(&column);
                }
            }
        }
        self.state.page_index = 0;
        self.recount();
        self.store.set(COLUMN_FILTERS_KEY, &self.state.column_filters);
    }

    pub fn set_search(&mut self, text: &str) {
        let filter = ColumnFilter::Text(text.to_string());
        self.set_column_filters([(ColumnId::Name, Some(filter))]);
    }

    /// Replaces sort, columns and filters in one step. Page size and index are
    /// kept, the index only moving back if the new filters leave fewer pages.
    pub fn apply_settings(&mut self, settings: &ViewSettings) {
        self.state.sort = sanitize_sort(settings.sort.clone());
        self.state.visible_columns = settings.visible_columns.clone();
        self.state.column_order = dedup_order(settings.column_order.clone());
        self.state.column_filters = settings.column_filters.clone();
        self.state.column_filters.retain(|_, f| !f.is_noop());
        self.recount();
        self.clamp_page_index();

        let visibility = visibility_map(&self.state.visible_columns);
        self.store.set(SORT_KEY, &self.state.sort);
        self.store.set(COLUMN_VISIBILITY_KEY, &visibility);
        self.store.set(COLUMN_ORDER_KEY, &self.state.column_order);
        self.store.set(COLUMN_FILTERS_KEY, &self.state.column_filters);
    }

    /// Visible columns: explicit order first, then the rest in natural order.
    pub fn visible_columns(&self) -> Vec<ColumnId> {
        let mut ordered = self.state.column_order.clone();
        for column in ColumnId::ALL {
            if !ordered.contains(&column) {
                ordered.push(column);
            }
        }
        ordered.retain(|c| self.state.visible_columns.contains(c));
        ordered
    }

    pub fn page_count(&self) -> Option<usize> {
        self.filtered_count.map(|count| page_count(count, self.state.page_size))
    }

    pub fn can_previous_page(&self) -> bool {
        self.state.page_index > 0
    }

    pub fn can_next_page(&self) -> bool {
        self.page_count().is_some_and(|pages| self.state.page_index + 1 < pages)
    }

    pub fn next_page(&mut self) {
        if self.can_next_page() {
            self.state.page_index += 1;
        }
    }

    pub fn previous_page(&mut self) {
        self.state.page_index = self.state.page_index.saturating_sub(1);
    }

    /// Filters, sorts and pages `rows`, re-clamping the page index to the result.
    pub fn view(&mut self, rows: &Arc<Vec<TableRow>>) -> TableView {
        self.rows = Some(rows.clone());
        let mut filtered = filter_rows(rows, &self.state.column_filters);
        sort_rows(&mut filtered, &self.state.sort);

        let filtered_count = filtered.len();
        let pages = page_count(filtered_count, self.state.page_size);
        let clamped = self.state.page_index.min(pages.saturating_sub(1));
        if clamped != self.state.page_index {
            debug!(from = self.state.page_index, to = clamped, "page index clamped");
            self.state.page_index = clamped;
        }
        self.filtered_count = Some(filtered_count);

        let start = (clamped * self.state.page_size).min(filtered_count);
        let end = (start + self.state.page_size).min(filtered_count);

        TableView {
            rows: filtered[start..end].iter().map(|r| (*r).clone()).collect(),
            columns: self.visible_columns(),
            page_index: clamped,
            page_count: pages,
            filtered_count,
            total_count: rows.len(),
        }
    }
}
