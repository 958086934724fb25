use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{ItemId, ItemMetadata, PriceMap, PriceSnapshot, VolumeMap, VolumeSnapshot};

/// Upstream market data. Each call returns a complete snapshot for its source.
#[async_trait]
pub trait MarketFeed: Send + Sync + 'static {
    async fn latest_prices(&self) -> Result<PriceMap>;
    async fn daily_volumes(&self) -> Result<VolumeMap>;
    async fn item_mapping(&self) -> Result<Vec<ItemMetadata>>;
    /// Insta-sell price of a single item.
    async fn reference_price(&self, item_id: ItemId) -> Result<Option<i64>>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestTransactions {
    pub data: HashMap<String, LatestTransaction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestTransaction {
    pub high: Option<i64>,
    pub high_time: Option<i64>,
    pub low: Option<i64>,
    pub low_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyVolumes {
    pub timestamp: Option<i64>,
    pub data: HashMap<String, Option<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingItem {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub lowalch: Option<i64>,
    #[serde(default)]
    pub highalch: Option<i64>,
    #[serde(default)]
    pub members: bool,
}

fn parse_item_id(key: &str) -> Result<ItemId> {
    key.parse::<i32>()
        .map(ItemId)
        .map_err(|_| Error::BadItemId(key.to_string()))
}

impl From<LatestTransaction> for PriceSnapshot {
    fn from(t: LatestTransaction) -> Self {
        // high is what buyers paid instantly, low is what sellers accepted
        PriceSnapshot {
            insta_buy_price: t.high,
            insta_buy_time: t.high_time,
            insta_sell_price: t.low,
            insta_sell_time: t.low_time,
        }
    }
}

impl From<MappingItem> for ItemMetadata {
    fn from(m: MappingItem) -> Self {
        ItemMetadata {
            id: ItemId(m.id),
            name: m.name,
            buy_limit: m.limit,
            icon: m.icon,
            value: m.value,
            low_alch: m.lowalch,
            high_alch: m.highalch,
            members: m.members,
        }
    }
}

impl LatestTransactions {
    pub fn into_price_map(self) -> Result<PriceMap> {
        self.data
            .into_iter()
            .map(|(key, t)| Ok((parse_item_id(&key)?, PriceSnapshot::from(t))))
            .collect()
    }
}

impl DailyVolumes {
    pub fn into_volume_map(self) -> Result<VolumeMap> {
        self.data
            .into_iter()
            .map(|(key, v)| Ok((parse_item_id(&key)?, VolumeSnapshot { daily_volume: v })))
            .collect()
    }
}

/// Client for the OSRS wiki real-time price API.
#[derive(Clone)]
pub struct WikiClient {
    client: Client,
    prices_url: String,
    volumes_url: String,
    mapping_url: String,
}

impl WikiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            prices_url: config.prices_url.clone(),
            volumes_url: config.volumes_url.clone(),
            mapping_url: config.mapping_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(url, "fetching");
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { url: url.to_string(), status: status.as_u16() });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl MarketFeed for WikiClient {
    async fn latest_prices(&self) -> Result<PriceMap> {
        let latest: LatestTransactions = self.get_json(&self.prices_url, &[]).await?;
        latest.into_price_map()
    }

    async fn daily_volumes(&self) -> Result<VolumeMap> {
        let volumes: DailyVolumes = self.get_json(&self.volumes_url, &[]).await?;
        volumes.into_volume_map()
    }

    async fn item_mapping(&self) -> Result<Vec<ItemMetadata>> {
        let items: Vec<MappingItem> = self.get_json(&self.mapping_url, &[]).await?;
        Ok(items.into_iter().map(ItemMetadata::from).collect())
    }

    async fn reference_price(&self, item_id: ItemId) -> Result<Option<i64>> {
        let latest: LatestTransactions = self
            .get_json(&self.prices_url, &[("id", item_id.0.to_string())])
            .await?;
        let prices = latest.into_price_map()?;
        Ok(prices.get(&item_id).and_then(|p| p.insta_sell_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_maps_high_to_buy_and_low_to_sell() {
        let json = r#"{"data":{
            "2":{"high":160,"highTime":1700000100,"low":155,"lowTime":1700000050},
            "6":{"high":null,"highTime":null,"low":190000,"lowTime":1700000000}
        }}"#;
        let latest: LatestTransactions = serde_json::from_str(json).unwrap();
        let prices = latest.into_price_map().unwrap();

        let cannonball = prices[&ItemId(2)];
        assert_eq!(cannonball.insta_buy_price, Some(160));
        assert_eq!(cannonball.insta_buy_time, Some(1_700_000_100));
        assert_eq!(cannonball.insta_sell_price, Some(155));
        assert_eq!(cannonball.insta_sell_time, Some(1_700_000_050));

        let cannon_base = prices[&ItemId(6)];
        assert_eq!(cannon_base.insta_buy_price, None);
        assert_eq!(cannon_base.insta_buy_time, None);
        assert_eq!(cannon_base.insta_sell_price, Some(190_000));
    }

    #[test]
    fn missing_fields_in_latest_are_absent() {
        let latest: LatestTransactions =
            serde_json::from_str(r#"{"data":{"4151":{"low":1}}}"#).unwrap();
        let prices = latest.into_price_map().unwrap();
        assert_eq!(prices[&ItemId(4151)].insta_buy_price, None);
        assert_eq!(prices[&ItemId(4151)].insta_sell_price, Some(1));
    }

    #[test]
    fn volumes_parse() {
        let json = r#"{"timestamp":1700000000,"data":{"2":6540321,"561":0}}"#;
        let volumes: DailyVolumes = serde_json::from_str(json).unwrap();
        let volumes = volumes.into_volume_map().unwrap();
        assert_eq!(volumes[&ItemId(2)].daily_volume, Some(6_540_321));
        assert_eq!(volumes[&ItemId(561)].daily_volume, Some(0));
    }

    #[test]
    fn bad_id_key_fails_the_snapshot() {
        let json = r#"{"data":{"abc":{"high":1,"highTime":1,"low":1,"lowTime":1}}}"#;
        let latest: LatestTransactions = serde_json::from_str(json).unwrap();
        assert!(matches!(latest.into_price_map(), Err(Error::BadItemId(k)) if k == "abc"));
    }

    #[test]
    fn mapping_item_with_optional_fields() {
        let json = r#"[
            {"examine":"Fabulously ancient mage protection.","id":10344,"members":true,"lowalch":20200,"limit":8,"value":50500,"highalch":30300,"icon":"3rd age amulet.png","name":"3rd age amulet"},
            {"id":1,"name":"Toolkit","members":false,"icon":"Toolkit.png"}
        ]"#;
        let items: Vec<MappingItem> = serde_json::from_str(json).unwrap();
        let items: Vec<ItemMetadata> = items.into_iter().map(ItemMetadata::from).collect();

        assert_eq!(items[0].id, ItemId(10344));
        assert_eq!(items[0].buy_limit, Some(8));
        assert_eq!(items[0].high_alch, Some(30_300));
        assert!(items[0].members);
        assert_eq!(items[1].buy_limit, None);
        assert_eq!(items[1].low_alch, None);
        assert!(!items[1].members);
    }
}
