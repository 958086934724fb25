use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::flips;
use crate::model::{ItemMetadata, PriceMap, PriceSnapshot, TableRow, VolumeMap, VolumeSnapshot};

/// The latest snapshot of every source, taken together.
#[derive(Debug, Clone, Default)]
pub struct MarketInputs {
    pub metadata: Arc<Vec<ItemMetadata>>,
    pub prices: Arc<PriceMap>,
    pub volumes: Arc<VolumeMap>,
    pub reference_price: Option<i64>,
}

impl Hash for MarketInputs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metadata.as_slice().hash(state);
        self.prices.as_ref().hash(state);
        self.volumes.as_ref().hash(state);
        self.reference_price.hash(state);
    }
}

pub fn build_row(
    item: &ItemMetadata,
    price: Option<&PriceSnapshot>,
    volume: Option<&VolumeSnapshot>,
    reference_price: Option<i64>,
) -> TableRow {
    let price = price.copied().unwrap_or_default();
    let buy = price.insta_buy_price;
    let sell = price.insta_sell_price;

    TableRow {
        id: item.id,
        name: item.name.clone(),
        limit: item.buy_limit,
        icon: item.icon.clone(),
        value: item.value,
        low_alch: item.low_alch,
        high_alch: item.high_alch,
        members: item.members,

        insta_buy_price: buy,
        insta_buy_time: price.insta_buy_time,
        insta_sell_price: sell,
        insta_sell_time: price.insta_sell_time,
        daily_volume: volume.and_then(|v| v.daily_volume),

        margin: flips::margin(buy, sell),
        tax: flips::tax(buy),
        profit: flips::profit(buy, sell),
        potential_profit: flips::potential_profit(buy, sell, item.buy_limit),
        roi: flips::roi(buy, sell),
        low_alch_profit: flips::alch_profit(sell, item.low_alch, reference_price),
        high_alch_profit: flips::alch_profit(sell, item.high_alch, reference_price),
    }
}

/// Joins every source by item id, in metadata order. Items that have never
/// traded in either direction are dropped (removed or non-circulating items).
pub fn assemble_rows(inputs: &MarketInputs) -> Vec<TableRow> {
    inputs
        .metadata
        .par_iter()
        .map(|item| {
            build_row(
                item,
                inputs.prices.get(&item.id),
                inputs.volumes.get(&item.id),
                inputs.reference_price,
            )
        })
        .filter(|row| row.insta_buy_time.is_some() || row.insta_sell_time.is_some())
        .collect()
}

pub fn structural_hash(inputs: &MarketInputs) -> u64 {
    let mut hasher = DefaultHasher::new();
    inputs.hash(&mut hasher);
    hasher.finish()
}

/// Last assembled rows, reused until any input changes.
#[derive(Default)]
pub struct RowCache {
    key: Option<u64>,
    rows: Arc<Vec<TableRow>>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&mut self, inputs: &MarketInputs) -> Arc<Vec<TableRow>> {
        let key = structural_hash(inputs);
        if self.key == Some(key) {
            debug!("row cache hit");
            return self.rows.clone();
        }
        let rows = Arc::new(assemble_rows(inputs));
        debug!(rows = rows.len(), items = inputs.metadata.len(), "rows assembled");
        self.key = Some(key);
        self.rows = rows.clone();
        rows
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}
