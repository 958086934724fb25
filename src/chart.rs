use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{PersistenceAdapter, PersistenceExt};

pub const CHART_WINDOW_KEY: &str = "chartTimeWindow";

/// Time window of the item price chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartWindow {
    #[default]
    #[serde(rename = "5m")]
    Day,
    #[serde(rename = "1h")]
    Week,
    #[serde(rename = "6h")]
    Month,
    #[serde(rename = "1y")]
    Year,
    #[serde(rename = "all")]
    AllTime,
}

impl ChartWindow {
    pub const ALL: [ChartWindow; 5] = [
        ChartWindow::Day,
        ChartWindow::Week,
        ChartWindow::Month,
        ChartWindow::Year,
        ChartWindow::AllTime,
    ];

    pub fn timestep(self) -> &'static str {
        match self {
            ChartWindow::Day => "5m",
            ChartWindow::Week => "1h",
            ChartWindow::Month => "6h",
            ChartWindow::Year => "1y",
            ChartWindow::AllTime => "all",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ChartWindow::Day => "Day",
            ChartWindow::Week => "Week",
            ChartWindow::Month => "Month",
            ChartWindow::Year => "Year",
            ChartWindow::AllTime => "All Time",
        }
    }

    /// Year and all-time charts come from the long term history feed.
    pub fn uses_long_term_history(self) -> bool {
        matches!(self, ChartWindow::Year | ChartWindow::AllTime)
    }

    pub fn refetch_interval(self) -> Duration {
        match self {
            ChartWindow::Day => Duration::from_secs(30),
            ChartWindow::Week => Duration::from_secs(5 * 60),
            ChartWindow::Month => Duration::from_secs(60 * 60),
            _ => Duration::from_secs(30),
        }
    }
}

/// Chart window selection, kept in the session store so it resets with the session.
pub struct ChartWindowSetting {
    session: Arc<dyn PersistenceAdapter>,
}

impl ChartWindowSetting {
    pub fn new(session: Arc<dyn PersistenceAdapter>) -> Self {
        Self { session }
    }

    pub fn get(&self) -> ChartWindow {
        self.session.get(CHART_WINDOW_KEY, ChartWindow::default())
    }

    pub fn set(&self, window: ChartWindow) {
        self.session.set(CHART_WINDOW_KEY, &window);
    }
}
