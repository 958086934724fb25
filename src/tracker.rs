use std::sync::Arc;

use crate::chart::{ChartWindow, ChartWindowSetting};
use crate::error::Result;
use crate::model::TableRow;
use crate::poller::{MarketSnapshots, Source};
use crate::presets::PresetManager;
use crate::rows::RowCache;
use crate::store::PersistenceAdapter;
use crate::table::{TableController, TableView};

/// Everything a front end needs: live snapshots, the assembled rows and the
/// table state on top of them.
pub struct Tracker {
    snapshots: Arc<MarketSnapshots>,
    cache: RowCache,
    table: TableController,
    presets: PresetManager,
    chart: ChartWindowSetting,
}

impl Tracker {
    pub fn new(
        snapshots: Arc<MarketSnapshots>,
        durable: Arc<dyn PersistenceAdapter>,
        session: Arc<dyn PersistenceAdapter>,
        presets: PresetManager,
        default_page_size: usize,
    ) -> Self {
        let table = TableController::load(durable, &presets.defaults(), default_page_size);
        Tracker {
            snapshots,
            cache: RowCache::new(),
            table,
            presets,
            chart: ChartWindowSetting::new(session),
        }
    }

    pub fn snapshots(&self) -> &Arc<MarketSnapshots> {
        &self.snapshots
    }

    /// Rows need both the item list and at least one price poll.
    pub fn is_ready(&self) -> bool {
        self.snapshots.has(Source::Metadata) && self.snapshots.has(Source::Prices)
    }

    pub fn rows(&mut self) -> Arc<Vec<TableRow>> {
        self.cache.rows(&self.snapshots.inputs())
    }

    pub fn view(&mut self) -> TableView {
        let rows = self.rows();
        self.table.view(&rows)
    }

    pub fn table(&self) -> &TableController {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableController {
        &mut self.table
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn apply_preset(&mut self, id: &str) -> Result<()> {
        self.presets.apply_by_id(id, &mut self.table)
    }

    pub fn current_preset_id(&self) -> Option<&'static str> {
        self.presets.current_preset_id(self.table.state())
    }

    pub fn chart_window(&self) -> ChartWindow {
        self.chart.get()
    }

    pub fn set_chart_window(&self, window: ChartWindow) {
        self.chart.set(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, PriceMap};
    use crate::poller::Snapshot;
    use crate::rows::tests::{item, price};
    use crate::store::{SessionStore, SqliteStore};

    fn tracker(snapshots: Arc<MarketSnapshots>) -> Tracker {
        Tracker::new(
            snapshots,
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(SessionStore::new()),
            PresetManager::builtin(),
            10,
        )
    }

    fn publish(snapshots: &MarketSnapshots, snapshot: Snapshot) {
        let ticket = snapshots.ticket();
        assert!(snapshots.publish(ticket, snapshot));
    }

    #[test]
    fn view_follows_new_snapshots() {
        let snapshots = Arc::new(MarketSnapshots::new());
        let mut tracker = tracker(snapshots.clone());
        assert!(!tracker.is_ready());
        assert!(tracker.view().rows.is_empty());

        publish(&snapshots, Snapshot::Metadata(vec![item(1, "Bucket"), item(2, "Rope")]));
        let prices: PriceMap = [(ItemId(1), price(105, 100)), (ItemId(2), price(300, 200))]
            .into_iter()
            .collect();
        publish(&snapshots, Snapshot::Prices(prices));
        assert!(tracker.is_ready());

        let view = tracker.view();
        assert_eq!(view.rows.len(), 2);
        // default preset sorts by profit, highest first
        assert_eq!(view.rows[0].id, ItemId(2));

        let prices = [(ItemId(1), price(1_000, 100))].into_iter().collect();
        publish(&snapshots, Snapshot::Prices(prices));
        let view = tracker.view();
        assert_eq!(view.rows[0].id, ItemId(1));
        assert_eq!(view.rows.len(), 1);
    }

    #[test]
    fn rows_are_cached_between_polls() {
        let snapshots = Arc::new(MarketSnapshots::new());
        let mut tracker = tracker(snapshots.clone());
        publish(&snapshots, Snapshot::Metadata(vec![item(1, "Bucket")]));
        publish(&snapshots, Snapshot::Prices([(ItemId(1), price(105, 100))].into_iter().collect()));

        let a = tracker.rows();
        let b = tracker.rows();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn presets_and_chart_window() {
        let mut tracker = tracker(Arc::new(MarketSnapshots::new()));
        assert_eq!(tracker.current_preset_id(), Some("default"));
        tracker.apply_preset("highAlchProfit").unwrap();
        assert_eq!(tracker.current_preset_id(), Some("highAlchProfit"));
        assert!(tracker.apply_preset("nope").is_err());

        assert_eq!(tracker.chart_window(), ChartWindow::Day);
        tracker.set_chart_window(ChartWindow::AllTime);
        assert_eq!(tracker.chart_window(), ChartWindow::AllTime);
    }
}
