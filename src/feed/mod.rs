//! Live listing feed.
//!
//! Row changes on `food_listings` and `restaurants` arrive through Postgres `NOTIFY`, are fanned
//! out on a broadcast channel without diff information, and a single refresher task turns them
//! into sequenced snapshots of the available listings.

pub mod handlers;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgListener, PgPool};
use time::OffsetDateTime;
use tokio::{
    sync::{
        broadcast::{
            self,
            error::{RecvError, TryRecvError},
        },
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::listings::{repo::ListingRepo, repo_types::FoodListing};

pub const LISTINGS_CHANNEL: &str = "food_listings_changes";
pub const RESTAURANTS_CHANNEL: &str = "restaurants_changes";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const EXPIRY_SWEEP: Duration = Duration::from_secs(60);
// a listing is still available at exactly its pickup end
const EXPIRY_GRACE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    FoodListings,
    Restaurants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    #[serde(default)]
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Changed(ChangeEvent),
    /// The change source reconnected; notifications may have been missed.
    Resync,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub seq: u64,
    pub listings: Vec<FoodListing>,
}

#[derive(Clone)]
pub struct ListingFeed {
    events: broadcast::Sender<FeedEvent>,
    snapshot: Arc<watch::Sender<Snapshot>>,
}

impl ListingFeed {
    pub fn new(capacity: usize) -> Self {
        let (events, _rx) = broadcast::channel(capacity.max(1));
        let (snapshot, _rx) = watch::channel(Snapshot::default());
        Self {
            events,
            snapshot: Arc::new(snapshot),
        }
    }

    /// No subscribers is not an error.
    pub fn publish(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_available(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Re-fetches the available set after every burst of events, and again whenever the earliest
    /// pickup window in the current snapshot closes (expiry fires no NOTIFY). Fetches never
    /// overlap and each snapshot carries a higher `seq` than the one before it.
    pub fn spawn_refresher(&self, listings: Arc<dyn ListingRepo>) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let snapshot = self.snapshot.clone();
        tokio::spawn(async move {
            let mut seq = 0u64;
            let mut next_expiry = refresh(listings.as_ref(), &snapshot, &mut seq).await;
            loop {
                let wait = until_expiry(next_expiry, OffsetDateTime::now_utc());
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            // coalesce everything already queued into one fetch
                            loop {
                                match rx.try_recv() {
                                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                                }
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::time::sleep(wait) => {
                        debug!("pickup window closed; refreshing");
                    }
                }
                next_expiry = refresh(listings.as_ref(), &snapshot, &mut seq).await;
            }
            debug!("listing refresher stopped");
        })
    }

    /// Holds a `LISTEN` connection for the process lifetime, reconnecting on failure.
    pub fn spawn_pg_listener(&self, db: PgPool) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = listen(&feed, &db).await {
                    warn!(error = %e, "change feed listener failed; reconnecting");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }
}

/// Publishes a fresh snapshot and returns the earliest pickup end in it.
async fn refresh(
    listings: &dyn ListingRepo,
    snapshot: &watch::Sender<Snapshot>,
    seq: &mut u64,
) -> Option<OffsetDateTime> {
    match listings.list_available(OffsetDateTime::now_utc()).await {
        Ok(rows) => {
            *seq += 1;
            let next_expiry = rows.iter().map(|l| l.pickup_end_time).min();
            debug!(seq = *seq, count = rows.len(), "available listings refreshed");
            snapshot.send_replace(Snapshot {
                seq: *seq,
                listings: rows,
            });
            next_expiry
        }
        Err(e) => {
            warn!(error = %e, "listing refresh failed; keeping previous snapshot");
            None
        }
    }
}

/// Time until the listing ending at `next` drops out of the available set, capped at
/// `EXPIRY_SWEEP` so a failed refresh is retried.
fn until_expiry(next: Option<OffsetDateTime>, now: OffsetDateTime) -> Duration {
    next.map(|end| Duration::try_from(end - now).unwrap_or(Duration::ZERO) + EXPIRY_GRACE)
        .unwrap_or(EXPIRY_SWEEP)
        .min(EXPIRY_SWEEP)
}

async fn listen(feed: &ListingFeed, db: &PgPool) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(db)
        .await
        .context("connect change listener")?;
    listener
        .listen_all([LISTINGS_CHANNEL, RESTAURANTS_CHANNEL])
        .await
        .context("listen on change channels")?;
    info!("change feed listening");
    feed.publish(FeedEvent::Resync);

    loop {
        match listener.try_recv().await.context("receive notification")? {
            Some(n) => match parse_notification(n.channel(), n.payload()) {
                Some(ev) => feed.publish(FeedEvent::Changed(ev)),
                None => warn!(channel = n.channel(), "ignoring notification on unknown channel"),
            },
            None => {
                // sqlx reconnects on the next try_recv
                warn!("change feed connection lost; resyncing");
                feed.publish(FeedEvent::Resync);
            }
        }
    }
}

/// Decodes the trigger payload; a malformed payload still counts as a change on its channel.
pub fn parse_notification(channel: &str, payload: &str) -> Option<ChangeEvent> {
    if let Ok(ev) = serde_json::from_str::<ChangeEvent>(payload) {
        return Some(ev);
    }
    let table = match channel {
        LISTINGS_CHANNEL => Table::FoodListings,
        RESTAURANTS_CHANNEL => Table::Restaurants,
        _ => return None,
    };
    Some(ChangeEvent {
        table,
        op: ChangeOp::Update,
        id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::{repo::memory::MemoryListingRepo, repo_types::NewListing};
    use time::Duration as TimeDuration;

    async fn wait_for<F>(rx: &mut watch::Receiver<Snapshot>, pred: F) -> Snapshot
    where
        F: Fn(&Snapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("feed alive");
            }
        })
        .await
        .expect("snapshot in time")
    }

    fn listing(restaurant_id: Uuid) -> NewListing {
        let now = OffsetDateTime::now_utc();
        NewListing {
            restaurant_id,
            item_name: "Salad".into(),
            description: None,
            quantity: "2 boxes".into(),
            pickup_start_time: now + TimeDuration::hours(1),
            pickup_end_time: now + TimeDuration::hours(2),
            dietary_tags: vec![],
        }
    }

    #[test]
    fn parses_trigger_payload() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"table":"food_listings","op":"UPDATE","id":"{id}"}}"#);
        let ev = parse_notification(LISTINGS_CHANNEL, &payload).unwrap();
        assert_eq!(
            ev,
            ChangeEvent {
                table: Table::FoodListings,
                op: ChangeOp::Update,
                id: Some(id),
            }
        );
    }

    #[test]
    fn malformed_payload_falls_back_to_channel() {
        let ev = parse_notification(RESTAURANTS_CHANNEL, "garbage").unwrap();
        assert_eq!(ev.table, Table::Restaurants);
        assert!(ev.id.is_none());
        assert!(parse_notification("other_channel", "garbage").is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_events_without_diffs() {
        let feed = ListingFeed::new(8);
        let mut rx = feed.subscribe_changes();
        feed.publish(FeedEvent::Resync);
        assert_eq!(rx.recv().await.unwrap(), FeedEvent::Resync);
    }

    #[tokio::test]
    async fn refresher_publishes_sequenced_snapshots() {
        let repo = Arc::new(MemoryListingRepo::default());
        let feed = ListingFeed::new(8);
        let mut rx = feed.subscribe_available();
        let task = feed.spawn_refresher(repo.clone());

        let initial = wait_for(&mut rx, |s| s.seq >= 1).await;
        assert!(initial.listings.is_empty());

        let created = repo.create(listing(Uuid::new_v4())).await.unwrap();
        feed.publish(FeedEvent::Changed(ChangeEvent {
            table: Table::FoodListings,
            op: ChangeOp::Insert,
            id: Some(created.id),
        }));
        let after_insert = wait_for(&mut rx, |s| s.listings.len() == 1).await;
        assert!(after_insert.seq > initial.seq);
        assert_eq!(after_insert.listings[0].id, created.id);

        repo.mark_claimed(created.id, Uuid::new_v4(), OffsetDateTime::now_utc())
            .await
            .unwrap();
        for _ in 0..5 {
            feed.publish(FeedEvent::Resync);
        }
        let after_claim = wait_for(&mut rx, |s| s.listings.is_empty()).await;
        assert!(after_claim.seq > after_insert.seq);

        task.abort();
    }

    #[test]
    fn expiry_wait_is_capped_and_never_negative() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(until_expiry(None, now), EXPIRY_SWEEP);
        assert_eq!(until_expiry(Some(now - TimeDuration::minutes(1)), now), EXPIRY_GRACE);
        assert_eq!(
            until_expiry(Some(now + TimeDuration::milliseconds(300)), now),
            Duration::from_millis(300) + EXPIRY_GRACE
        );
        assert_eq!(until_expiry(Some(now + TimeDuration::hours(3)), now), EXPIRY_SWEEP);
    }

    #[tokio::test]
    async fn expired_listing_leaves_snapshot_without_change_events() {
        let repo = Arc::new(MemoryListingRepo::default());
        let now = OffsetDateTime::now_utc();
        let short = repo
            .create(NewListing {
                pickup_start_time: now - TimeDuration::hours(1),
                pickup_end_time: now + TimeDuration::milliseconds(300),
                ..listing(Uuid::new_v4())
            })
            .await
            .unwrap();
        let long = repo.create(listing(Uuid::new_v4())).await.unwrap();

        let feed = ListingFeed::new(8);
        let mut rx = feed.subscribe_available();
        let task = feed.spawn_refresher(repo.clone());

        let initial = wait_for(&mut rx, |s| s.seq >= 1).await;
        assert!(initial.listings.iter().any(|l| l.id == short.id));

        let after = wait_for(&mut rx, |s| s.listings.iter().all(|l| l.id != short.id)).await;
        assert!(after.seq > initial.seq);
        assert_eq!(after.listings.len(), 1);
        assert_eq!(after.listings[0].id, long.id);

        task.abort();
    }
}
