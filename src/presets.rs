use tracing::info;

use crate::error::{Error, Result};
use crate::model::ColumnId;
use crate::table::{ColumnFilters, SortKey, TableController, TableViewState, ViewSettings};

/// A named, immutable bundle of table settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    pub settings: ViewSettings,
}

impl Preset {
    /// Shows exactly `columns`, in that order.
    pub fn new(
        id: &'static str,
        label: &'static str,
        columns: &[ColumnId],
        sort: Vec<SortKey>,
    ) -> Self {
        Preset {
            id,
            label,
            settings: ViewSettings {
                visible_columns: columns.iter().copied().collect(),
                column_order: columns.to_vec(),
                sort,
                column_filters: ColumnFilters::new(),
            },
        }
    }
}

/// First preset, in insertion order, equal to the live state.
pub fn selected_preset<'a>(presets: &'a [Preset], state: &TableViewState) -> Option<&'a Preset> {
    presets.iter().find(|p| p.settings.matches(state))
}

pub struct PresetManager {
    presets: Vec<Preset>,
}

impl PresetManager {
    pub fn new(presets: Vec<Preset>) -> Self {
        PresetManager { presets }
    }

    pub fn builtin() -> Self {
        use ColumnId::*;
        Self::new(vec![
            Preset::new(
                "default",
                "Default",
                &[
                    Icon,
                    Name,
                    InstaBuyPrice,
                    InstaSellPrice,
                    Profit,
                    DailyVolume,
                    Limit,
                    Roi,
                    PotentialProfit,
                    InstaSellTime,
                    InstaBuyTime,
                ],
                vec![SortKey::desc(Profit)],
            ),
            Preset::new(
                "highAlchProfit",
                "High Alch Profit",
                &[
                    Icon,
                    Name,
                    HighAlchProfit,
                    InstaSellPrice,
                    HighAlch,
                    DailyVolume,
                    Limit,
                    InstaSellTime,
                ],
                vec![SortKey::desc(HighAlchProfit)],
            ),
        ])
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Settings a fresh table starts from.
    pub fn defaults(&self) -> ViewSettings {
        self.presets.first().map(|p| p.settings.clone()).unwrap_or_else(|| ViewSettings {
            visible_columns: ColumnId::ALL.into_iter().collect(),
            column_order: Vec::new(),
            sort: Vec::new(),
            column_filters: ColumnFilters::new(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn apply(&self, preset: &Preset, table: &mut TableController) {
        info!(preset = preset.id, "applying preset");
        table.apply_settings(&preset.settings);
    }

    pub fn apply_by_id(&self, id: &str, table: &mut TableController) -> Result<()> {
        let preset = self.get(id).ok_or_else(|| Error::UnknownPreset(id.to_string()))?;
        self.apply(preset, table);
        Ok(())
    }

    pub fn current_preset_id(&self, state: &TableViewState) -> Option<&'static str> {
        selected_preset(&self.presets, state).map(|p| p.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::SessionStore;
    use crate::table::ColumnFilter;

    fn table(manager: &PresetManager) -> TableController {
        TableController::load(Arc::new(SessionStore::new()), &manager.defaults(), 10)
    }

    #[test]
    fn fresh_table_matches_default_preset() {
        let manager = PresetManager::builtin();
        let table = table(&manager);
        assert_eq!(manager.current_preset_id(table.state()), Some("default"));
    }

    #[test]
    fn apply_then_current_round_trips() {
        let manager = PresetManager::builtin();
        let mut table = table(&manager);
        for preset in manager.presets() {
            manager.apply(preset, &mut table);
            assert_eq!(manager.current_preset_id(table.state()), Some(preset.id));
        }
    }

    #[test]
    fn apply_keeps_pagination() {
        let manager = PresetManager::builtin();
        let mut table = table(&manager);
        table.set_page_size(25);
        table.set_page_index(3);
        manager.apply_by_id("highAlchProfit", &mut table).unwrap();
        assert_eq!(table.state().page_size, 25);
        assert_eq!(table.state().page_index, 3);
        assert_eq!(table.state().sort, vec![SortKey::desc(ColumnId::HighAlchProfit)]);
    }

    #[test]
    fn any_deviation_clears_the_selection() {
        let manager = PresetManager::builtin();
        let mut table = table(&manager);

        table.toggle_sort(ColumnId::Profit);
        assert_eq!(manager.current_preset_id(table.state()), None);
        table.toggle_sort(ColumnId::Profit);
        assert_eq!(manager.current_preset_id(table.state()), Some("default"));

        table.set_column_filters([(ColumnId::Limit, Some(ColumnFilter::range(Some(1.0), None)))]);
        assert_eq!(manager.current_preset_id(table.state()), None);
        table.set_column_filters([(ColumnId::Limit, None)]);
        assert_eq!(manager.current_preset_id(table.state()), Some("default"));

        table.set_column_visibility([(ColumnId::Tax, true)]);
        assert_eq!(manager.current_preset_id(table.state()), None);
    }

    #[test]
    fn first_match_wins() {
        let a = Preset::new("a", "A", &[ColumnId::Name], vec![]);
        let b = Preset::new("b", "B", &[ColumnId::Name], vec![]);
        let manager = PresetManager::new(vec![a, b]);
        let table = table(&manager);
        assert_eq!(manager.current_preset_id(table.state()), Some("a"));
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let manager = PresetManager::builtin();
        let mut table = table(&manager);
        let err = manager.apply_by_id("bogus", &mut table).unwrap_err();
        assert!(matches!(err, Error::UnknownPreset(id) if id == "bogus"));
        assert_eq!(manager.current_preset_id(table.state()), Some("default"));
    }

    #[test]
    fn empty_manager_shows_everything() {
        let manager = PresetManager::new(vec![]);
        let table = table(&manager);
        assert_eq!(table.visible_columns(), ColumnId::ALL.to_vec());
        assert_eq!(manager.current_preset_id(table.state()), None);
    }
}
