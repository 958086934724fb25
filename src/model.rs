use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Hash, Copy, Clone, Debug, Deserialize, Serialize, Eq, PartialEq, PartialOrd, Ord)]
pub struct ItemId(pub i32);

/// Static item data from the mapping feed. Fetched once per session.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: ItemId,
    pub name: String,
    pub buy_limit: Option<i64>,  // 4 hour cap
    pub icon: String,
    pub value: Option<i64>,
    pub low_alch: Option<i64>,
    pub high_alch: Option<i64>,
    pub members: bool,
}

/// Latest instant trades for one item. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub insta_buy_price: Option<i64>,
    pub insta_buy_time: Option<i64>,
    pub insta_sell_price: Option<i64>,
    pub insta_sell_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub daily_volume: Option<i64>,
}

pub type PriceMap = BTreeMap<ItemId, PriceSnapshot>;
pub type VolumeMap = BTreeMap<ItemId, VolumeSnapshot>;

/// One denormalized row of the item table. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub id: ItemId,
    pub name: String,
    pub limit: Option<i64>,
    pub icon: String,
    pub value: Option<i64>,
    pub low_alch: Option<i64>,
    pub high_alch: Option<i64>,
    pub members: bool,

    pub insta_buy_price: Option<i64>,
    pub insta_buy_time: Option<i64>,
    pub insta_sell_price: Option<i64>,
    pub insta_sell_time: Option<i64>,
    pub daily_volume: Option<i64>,

    pub margin: Option<i64>,
    pub tax: i64,
    pub profit: Option<i64>,
    pub potential_profit: Option<i64>,
    pub roi: Option<f64>,
    pub low_alch_profit: Option<i64>,
    pub high_alch_profit: Option<i64>,
}

#[derive(Hash, Copy, Clone, Debug, Deserialize, Serialize, Eq, PartialEq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ColumnId {
    Id,
    Name,
    Limit,
    Icon,
    Value,
    LowAlch,
    LowAlchProfit,
    HighAlch,
    HighAlchProfit,
    Members,
    InstaBuyPrice,
    InstaBuyTime,
    InstaSellPrice,
    InstaSellTime,
    DailyVolume,
    Margin,
    Tax,
    Roi,
    Profit,
    PotentialProfit,
}

impl ColumnId {
    /// Natural column order, used whenever no explicit order is set.
    pub const ALL: [ColumnId; 20] = [
        ColumnId::Id,
        ColumnId::Name,
        ColumnId::Limit,
        ColumnId::Icon,
        ColumnId::Value,
        ColumnId::LowAlch,
        ColumnId::LowAlchProfit,
        ColumnId::HighAlch,
        ColumnId::HighAlchProfit,
        ColumnId::Members,
        ColumnId::InstaBuyPrice,
        ColumnId::InstaBuyTime,
        ColumnId::InstaSellPrice,
        ColumnId::InstaSellTime,
        ColumnId::DailyVolume,
        ColumnId::Margin,
        ColumnId::Tax,
        ColumnId::Roi,
        ColumnId::Profit,
        ColumnId::PotentialProfit,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ColumnId::Id => "id",
            ColumnId::Name => "name",
            ColumnId::Limit => "limit",
            ColumnId::Icon => "icon",
            ColumnId::Value => "value",
            ColumnId::LowAlch => "lowAlch",
            ColumnId::LowAlchProfit => "lowAlchProfit",
            ColumnId::HighAlch => "highAlch",
            ColumnId::HighAlchProfit => "highAlchProfit",
            ColumnId::Members => "members",
            ColumnId::InstaBuyPrice => "instaBuyPrice",
            ColumnId::InstaBuyTime => "instaBuyTime",
            ColumnId::InstaSellPrice => "instaSellPrice",
            ColumnId::InstaSellTime => "instaSellTime",
            ColumnId::DailyVolume => "dailyVolume",
            ColumnId::Margin => "margin",
            ColumnId::Tax => "tax",
            ColumnId::Roi => "roi",
            ColumnId::Profit => "profit",
            ColumnId::PotentialProfit => "potentialProfit",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            ColumnId::Id => "ID",
            ColumnId::Name => "Name",
            ColumnId::Limit => "Limit",
            ColumnId::Icon => "Icon",
            ColumnId::Value => "Value",
            ColumnId::LowAlch => "Low Alch",
            ColumnId::LowAlchProfit => "Low Alch Profit",
            ColumnId::HighAlch => "High Alch",
            ColumnId::HighAlchProfit => "High Alch Profit",
            ColumnId::Members => "Members",
            ColumnId::InstaBuyPrice => "Buy Price",
            ColumnId::InstaBuyTime => "Latest Purchase",
            ColumnId::InstaSellPrice => "Sell Price",
            ColumnId::InstaSellTime => "Latest Sale",
            ColumnId::DailyVolume => "Daily Volume",
            ColumnId::Margin => "Margin",
            ColumnId::Tax => "Tax",
            ColumnId::Roi => "ROI",
            ColumnId::Profit => "Profit",
            ColumnId::PotentialProfit => "Potential Profit",
        }
    }

    pub fn sortable(self) -> bool {
        self != ColumnId::Icon
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ColumnId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColumnId::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownColumn(s.to_string()))
    }
}

/// A single cell, typed for sorting and filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(&'a str),
    Bool(bool),
}

impl CellValue<'_> {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            CellValue::Int(v) => v.map(|v| v as f64),
            CellValue::Float(v) => v,
            CellValue::Bool(_) | CellValue::Text(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CellValue::Int(None) | CellValue::Float(None))
    }
}

impl TableRow {
    pub fn cell(&self, column: ColumnId) -> CellValue<'_> {
        match column {
            ColumnId::Id => CellValue::Int(Some(self.id.0 as i64)),
            ColumnId::Name => CellValue::Text(&self.name),
            ColumnId::Limit => CellValue::Int(self.limit),
            ColumnId::Icon => CellValue::Text(&self.icon),
            ColumnId::Value => CellValue::Int(self.value),
            ColumnId::LowAlch => CellValue::Int(self.low_alch),
            ColumnId::LowAlchProfit => CellValue::Int(self.low_alch_profit),
            ColumnId::HighAlch => CellValue::Int(self.high_alch),
            ColumnId::HighAlchProfit => CellValue::Int(self.high_alch_profit),
            ColumnId::Members => CellValue::Bool(self.members),
            ColumnId::InstaBuyPrice => CellValue::Int(self.insta_buy_price),
            ColumnId::InstaBuyTime => CellValue::Int(self.insta_buy_time),
            ColumnId::InstaSellPrice => CellValue::Int(self.insta_sell_price),
            ColumnId::InstaSellTime => CellValue::Int(self.insta_sell_time),
            ColumnId::DailyVolume => CellValue::Int(self.daily_volume),
            ColumnId::Margin => CellValue::Int(self.margin),
            ColumnId::Tax => CellValue::Int(Some(self.tax)),
            ColumnId::Roi => CellValue::Float(self.roi),
            ColumnId::Profit => CellValue::Int(self.profit),
            ColumnId::PotentialProfit => CellValue::Int(self.potential_profit),
        }
    }
}
