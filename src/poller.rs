use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::loader::MarketFeed;
use crate::model::{ItemId, ItemMetadata, PriceMap, VolumeMap};
use crate::rows::MarketInputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Prices,
    Volumes,
    Metadata,
    Reference,
}

/// A complete result of one poll, replacing the previous value for its source.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Prices(PriceMap),
    Volumes(VolumeMap),
    Metadata(Vec<ItemMetadata>),
    Reference(Option<i64>),
}

impl Snapshot {
    pub fn source(&self) -> Source {
        match self {
            Snapshot::Prices(_) => Source::Prices,
            Snapshot::Volumes(_) => Source::Volumes,
            Snapshot::Metadata(_) => Source::Metadata,
            Snapshot::Reference(_) => Source::Reference,
        }
    }

    fn len(&self) -> usize {
        match self {
            Snapshot::Prices(p) => p.len(),
            Snapshot::Volumes(v) => v.len(),
            Snapshot::Metadata(m) => m.len(),
            Snapshot::Reference(r) => r.is_some() as usize,
        }
    }
}

struct Slot<T> {
    seq: u64,
    value: Option<Arc<T>>,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot { seq: 0, value: None, updated_at: None }
    }
}

impl<T> Slot<T> {
    fn replace(&mut self, ticket: u64, value: T) -> bool {
        if ticket <= self.seq {
            return false;
        }
        self.seq = ticket;
        self.value = Some(Arc::new(value));
        self.updated_at = Some(Utc::now());
        true
    }
}

/// Latest completed snapshot of every source.
///
/// Each poll takes a ticket before it starts fetching. A finished poll only
/// replaces the stored snapshot if no newer poll of that source has already
/// been stored, so late completions of old polls are dropped.
pub struct MarketSnapshots {
    tickets: AtomicU64,
    prices: RwLock<Slot<PriceMap>>,
    volumes: RwLock<Slot<VolumeMap>>,
    metadata: RwLock<Slot<Vec<ItemMetadata>>>,
    reference: RwLock<Slot<Option<i64>>>,
    generation: watch::Sender<u64>,
}

impl Default for MarketSnapshots {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketSnapshots {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        MarketSnapshots {
            tickets: AtomicU64::new(0),
            prices: RwLock::default(),
            volumes: RwLock::default(),
            metadata: RwLock::default(),
            reference: RwLock::default(),
            generation,
        }
    }

    pub fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns false when a newer poll of the same source is already stored.
    pub fn publish(&self, ticket: u64, snapshot: Snapshot) -> bool {
        let source = snapshot.source();
        let accepted = match snapshot {
            Snapshot::Prices(v) => self.prices.write().replace(ticket, v),
            Snapshot::Volumes(v) => self.volumes.write().replace(ticket, v),
            Snapshot::Metadata(v) => self.metadata.write().replace(ticket, v),
            Snapshot::Reference(v) => self.reference.write().replace(ticket, v),
        };
        if accepted {
            self.generation.send_modify(|g| *g += 1);
        } else {
            debug!(?source, ticket, "discarding out of date poll");
        }
        accepted
    }

    pub fn inputs(&self) -> MarketInputs {
        MarketInputs {
            metadata: self.metadata.read().value.clone().unwrap_or_default(),
            prices: self.prices.read().value.clone().unwrap_or_default(),
            volumes: self.volumes.read().value.clone().unwrap_or_default(),
            reference_price: self.reference.read().value.as_deref().copied().flatten(),
        }
    }

    pub fn has(&self, source: Source) -> bool {
        self.updated_at(source).is_some()
    }

    pub fn updated_at(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Prices => self.prices.read().updated_at,
            Source::Volumes => self.volumes.read().updated_at,
            Source::Metadata => self.metadata.read().updated_at,
            Source::Reference => self.reference.read().updated_at,
        }
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Changes every time any source is replaced.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

/// Runs one fetch and stores its result. Returns whether the fetch succeeded.
pub async fn poll_once<Fut>(snapshots: &MarketSnapshots, source: Source, fetch: Fut) -> bool
where
    Fut: Future<Output = Result<Snapshot>>,
{
    let ticket = snapshots.ticket();
    match fetch.await {
        Ok(snapshot) => {
            let items = snapshot.len();
            if snapshots.publish(ticket, snapshot) {
                info!(?source, items, "snapshot updated");
            }
            true
        }
        Err(e) => {
            warn!(?source, error = %e, "poll failed, keeping previous snapshot");
            false
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub prices: Duration,
    pub volumes: Duration,
    pub reference: Duration,
    pub metadata_retry: Duration,
}

impl PollIntervals {
    pub fn from_config(config: &Config) -> Self {
        PollIntervals {
            prices: config.price_interval(),
            volumes: config.volume_interval(),
            reference: config.reference_interval(),
            metadata_retry: config.metadata_retry(),
        }
    }
}

pub struct Poller<F> {
    feed: Arc<F>,
    snapshots: Arc<MarketSnapshots>,
    intervals: PollIntervals,
    reference_item: ItemId,
}

pub struct PollerHandle {
    refresh: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    /// Polls prices and the reference price now. In-flight polls are left to finish.
    pub fn refresh(&self) {
        self.refresh.notify_waiters();
    }

    /// Stops every loop along with any poll still in flight.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

async fn refresh_requested(refresh: &Option<Arc<Notify>>) {
    match refresh {
        Some(refresh) => refresh.notified().await,
        None => std::future::pending().await,
    }
}

/// Polls live in a `JoinSet` owned by the loop, so aborting the loop also
/// aborts any fetch still in flight.
fn spawn_periodic<P, Fut>(
    every: Duration,
    refresh: Option<Arc<Notify>>,
    poll: P,
) -> JoinHandle<()>
where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = JoinSet::new();
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = refresh_requested(&refresh) => {}
                Some(_) = polls.join_next(), if !polls.is_empty() => continue,
            }
            polls.spawn(poll());
        }
    })
}

impl<F: MarketFeed> Poller<F> {
    pub fn new(feed: Arc<F>, snapshots: Arc<MarketSnapshots>, config: &Config) -> Self {
        Poller {
            feed,
            snapshots,
            intervals: PollIntervals::from_config(config),
            reference_item: config.reference_item_id,
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn spawn(self) -> PollerHandle {
        let refresh = Arc::new(Notify::new());
        let mut tasks = Vec::with_capacity(4);

        // item mapping: once per session, retried until it lands
        {
            let feed = self.feed.clone();
            let snapshots = self.snapshots.clone();
            let retry = self.intervals.metadata_retry;
            tasks.push(tokio::spawn(async move {
                loop {
                    let fetch = async { feed.item_mapping().await.map(Snapshot::Metadata) };
                    if poll_once(&snapshots, Source::Metadata, fetch).await {
                        break;
                    }
                    tokio::time::sleep(retry).await;
                }
            }));
        }

        let (feed, snapshots) = (self.feed.clone(), self.snapshots.clone());
        tasks.push(spawn_periodic(self.intervals.prices, Some(refresh.clone()), move || {
            let (feed, snapshots) = (feed.clone(), snapshots.clone());
            async move {
                let fetch = async { feed.latest_prices().await.map(Snapshot::Prices) };
                poll_once(&snapshots, Source::Prices, fetch).await;
            }
        }));

        let (feed, snapshots) = (self.feed.clone(), self.snapshots.clone());
        tasks.push(spawn_periodic(self.intervals.volumes, None, move || {
            let (feed, snapshots) = (feed.clone(), snapshots.clone());
            async move {
                let fetch = async { feed.daily_volumes().await.map(Snapshot::Volumes) };
                poll_once(&snapshots, Source::Volumes, fetch).await;
            }
        }));

        let (feed, snapshots) = (self.feed.clone(), self.snapshots.clone());
        let reference_item = self.reference_item;
        let every = self.intervals.reference;
        tasks.push(spawn_periodic(every, Some(refresh.clone()), move || {
            let (feed, snapshots) = (feed.clone(), snapshots.clone());
            async move {
                let fetch = async {
                    feed.reference_price(reference_item)
                        .await
                        .map(Snapshot::Reference)
                };
                poll_once(&snapshots, Source::Reference, fetch).await;
            }
        }));

        PollerHandle { refresh, tasks }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::VolumeSnapshot;
    use crate::rows::tests::{item, price};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeFeed {
        pub(crate) prices: Mutex<PriceMap>,
        pub(crate) price_delay: Mutex<Duration>,
        pub(crate) mapping_failures: Mutex<u32>,
        pub(crate) price_calls: AtomicU64,
        pub(crate) mapping_calls: AtomicU64,
        pub(crate) reference_calls: AtomicU64,
    }

    impl FakeFeed {
        pub(crate) fn with_prices(prices: PriceMap) -> Self {
            FakeFeed { prices: Mutex::new(prices), ..FakeFeed::default() }
        }
    }

    #[async_trait]
    impl MarketFeed for FakeFeed {
        async fn latest_prices(&self) -> Result<PriceMap> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.price_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(self.prices.lock().clone())
        }

        async fn daily_volumes(&self) -> Result<VolumeMap> {
            Ok([(ItemId(1), VolumeSnapshot { daily_volume: Some(42) })].into_iter().collect())
        }

        async fn item_mapping(&self) -> Result<Vec<ItemMetadata>> {
            self.mapping_calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.mapping_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Status { url: "mapping".to_string(), status: 503 });
            }
            Ok(vec![item(1, "Bucket")])
        }

        async fn reference_price(&self, _item_id: ItemId) -> Result<Option<i64>> {
            self.reference_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(95))
        }
    }

    fn one_price(buy: i64, sell: i64) -> PriceMap {
        [(ItemId(1), price(buy, sell))].into_iter().collect()
    }

    fn long_intervals() -> PollIntervals {
        PollIntervals {
            prices: Duration::from_secs(3_600),
            volumes: Duration::from_secs(86_400),
            reference: Duration::from_secs(3_600),
            metadata_retry: Duration::from_secs(60),
        }
    }

    #[test]
    fn older_poll_never_overwrites_newer() {
        let snapshots = MarketSnapshots::new();
        let slow = snapshots.ticket();
        let fast = snapshots.ticket();

        assert!(snapshots.publish(fast, Snapshot::Prices(one_price(200, 150))));
        assert!(!snapshots.publish(slow, Snapshot::Prices(one_price(105, 100))));

        let inputs = snapshots.inputs();
        assert_eq!(inputs.prices[&ItemId(1)].insta_buy_price, Some(200));
        assert_eq!(snapshots.generation(), 1);
    }

    #[test]
    fn sources_do_not_share_staleness() {
        let snapshots = MarketSnapshots::new();
        let prices = snapshots.ticket();
        let volumes = snapshots.ticket();
        assert!(snapshots.publish(volumes, Snapshot::Volumes(VolumeMap::new())));
        assert!(snapshots.publish(prices, Snapshot::Prices(one_price(1, 1))));
        assert!(snapshots.has(Source::Prices));
        assert!(snapshots.has(Source::Volumes));
        assert!(!snapshots.has(Source::Metadata));
    }

    #[test]
    fn snapshot_is_replaced_wholesale() {
        let snapshots = MarketSnapshots::new();
        let mut both = one_price(105, 100);
        both.insert(ItemId(2), price(10, 9));
        let t = snapshots.ticket();
        snapshots.publish(t, Snapshot::Prices(both));
        let t = snapshots.ticket();
        snapshots.publish(t, Snapshot::Prices(one_price(106, 100)));

        let inputs = snapshots.inputs();
        assert_eq!(inputs.prices.len(), 1);
        assert_eq!(inputs.prices.get(&ItemId(2)), None);
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_snapshot() {
        let snapshots = MarketSnapshots::new();
        let fetch = async { Ok(Snapshot::Prices(one_price(105, 100))) };
        let ok = poll_once(&snapshots, Source::Prices, fetch).await;
        assert!(ok);

        let failed = poll_once(&snapshots, Source::Prices, async {
            Err(Error::Status { url: "latest".to_string(), status: 500 })
        })
        .await;
        assert!(!failed);

        let inputs = snapshots.inputs();
        assert_eq!(inputs.prices.get(&ItemId(1)), Some(&price(105, 100)));
        assert_eq!(snapshots.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_fills_every_source_and_refreshes_on_demand() {
        let feed = Arc::new(FakeFeed::with_prices(one_price(105, 100)));
        let snapshots = Arc::new(MarketSnapshots::new());
        let mut changes = snapshots.subscribe();
        let handle = Poller::new(feed.clone(), snapshots.clone(), &Config::default())
            .with_intervals(long_intervals())
            .spawn();

        tokio::time::timeout(Duration::from_secs(5), async {
            while ![Source::Prices, Source::Volumes, Source::Metadata, Source::Reference]
                .into_iter()
                .all(|s| snapshots.has(s))
            {
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("all sources polled");

        let inputs = snapshots.inputs();
        assert_eq!(inputs.metadata.len(), 1);
        assert_eq!(inputs.reference_price, Some(95));
        assert_eq!(inputs.volumes[&ItemId(1)].daily_volume, Some(42));
        assert_eq!(feed.price_calls.load(Ordering::SeqCst), 1);

        *feed.prices.lock() = one_price(110, 100);
        handle.refresh();
        tokio::time::timeout(Duration::from_secs(5), async {
            while snapshots.inputs().prices[&ItemId(1)].insta_buy_price != Some(110) {
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("refresh polled prices");
        assert_eq!(feed.price_calls.load(Ordering::SeqCst), 2);
        assert_eq!(feed.mapping_calls.load(Ordering::SeqCst), 1);

        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_polls_in_flight() {
        let feed = Arc::new(FakeFeed::with_prices(one_price(105, 100)));
        *feed.price_delay.lock() = Duration::from_secs(10);
        let snapshots = Arc::new(MarketSnapshots::new());
        let handle = Poller::new(feed.clone(), snapshots.clone(), &Config::default())
            .with_intervals(long_intervals())
            .spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(feed.price_calls.load(Ordering::SeqCst), 1);
        assert!(snapshots.has(Source::Metadata));

        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!snapshots.has(Source::Prices));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_is_retried_until_it_loads() {
        let feed = Arc::new(FakeFeed::default());
        *feed.mapping_failures.lock() = 2;
        let snapshots = Arc::new(MarketSnapshots::new());
        let mut changes = snapshots.subscribe();
        let handle = Poller::new(feed.clone(), snapshots.clone(), &Config::default())
            .with_intervals(long_intervals())
            .spawn();

        tokio::time::timeout(Duration::from_secs(600), async {
            while !snapshots.has(Source::Metadata) {
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("metadata loaded");
        assert_eq!(feed.mapping_calls.load(Ordering::SeqCst), 3);

        handle.shutdown();
    }
}
