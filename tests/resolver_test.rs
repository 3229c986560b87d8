use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use salida_sync::error::Result as SyncResult;
use salida_sync::resolver::{IdentityResolver, Resolution};
use salida_sync::storage::{InMemoryStorage, Storage};
use salida_sync::types::{Event, EventLink, ExternalEventRecord};
use std::sync::{Arc, Mutex};

fn sample_record(external_id: &str, title: &str) -> ExternalEventRecord {
    ExternalEventRecord {
        source: "ticketmaster".to_string(),
        external_id: external_id.to_string(),
        title: title.to_string(),
        description: "Indie Rock".to_string(),
        venue_name: "Sala Apolo".to_string(),
        city: "Barcelona".to_string(),
        country: "ES".to_string(),
        event_day: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
        start_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        latitude: Some(41.3742),
        longitude: Some(2.1699),
        image_url: Some("https://images.example/apolo.jpg".to_string()),
        event_url: Some("https://tickets.example/ev1".to_string()),
        category: "music".to_string(),
    }
}

/// Wraps the in-memory store and links the identity pair itself right before
/// the first create goes through, the way a second writer that wins the race
/// would.
struct RacingStorage {
    inner: Arc<InMemoryStorage>,
    winner: Mutex<Option<i64>>,
}

impl RacingStorage {
    fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryStorage::new()),
            winner: Mutex::new(None),
        }
    }

    fn winner_id(&self) -> Option<i64> {
        *self.winner.lock().unwrap()
    }
}

#[async_trait]
impl Storage for RacingStorage {
    async fn get_link(&self, source: &str, external_id: &str) -> SyncResult<Option<EventLink>> {
        self.inner.get_link(source, external_id).await
    }

    async fn save_link(&self, link: &EventLink) -> SyncResult<()> {
        self.inner.save_link(link).await
    }

    async fn create_event(&self, event: &mut Event) -> SyncResult<()> {
        self.inner.create_event(event).await
    }

    async fn get_event(&self, event_id: i64) -> SyncResult<Option<Event>> {
        self.inner.get_event(event_id).await
    }

    async fn delete_event(&self, event_id: i64) -> SyncResult<()> {
        self.inner.delete_event(event_id).await
    }

    async fn count_events(&self) -> SyncResult<usize> {
        self.inner.count_events().await
    }

    async fn create_linked_event(&self, event: &mut Event, link: &EventLink) -> SyncResult<i64> {
        if self.winner_id().is_none() {
            let mut rival = event.clone();
            let id = self.inner.create_linked_event(&mut rival, link).await?;
            *self.winner.lock().unwrap() = Some(id);
        }
        self.inner.create_linked_event(event, link).await
    }

    async fn add_favorite(&self, user_id: i64, event_id: i64) -> SyncResult<()> {
        self.inner.add_favorite(user_id, event_id).await
    }

    async fn get_favorites(&self, user_id: i64) -> SyncResult<Vec<i64>> {
        self.inner.get_favorites(user_id).await
    }

    async fn add_attendee(&self, user_id: i64, event_id: i64) -> SyncResult<()> {
        self.inner.add_attendee(user_id, event_id).await
    }

    async fn add_comment(&self, user_id: i64, event_id: i64, body: &str) -> SyncResult<()> {
        self.inner.add_comment(user_id, event_id, body).await
    }
}

#[tokio::test]
async fn resolve_links_each_identity_pair_exactly_once() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let resolver = IdentityResolver::new(storage.clone());
    let record = sample_record("G5v0Z9", "Indie Night");

    let first = resolver.resolve(&record).await?;
    let second = resolver.resolve(&record).await?;

    assert!(matches!(first, Resolution::Created(_)));
    assert!(matches!(second, Resolution::Existing(_)));
    assert_eq!(first.event_id(), second.event_id());
    assert_eq!(storage.count_events().await?, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_resolution_converges_to_one_event() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let record = sample_record("G5v0Z9", "Indie Night");

    let resolver_a = IdentityResolver::new(storage.clone());
    let resolver_b = IdentityResolver::new(storage.clone());
    let record_a = record.clone();
    let record_b = record;

    let task_a = tokio::spawn(async move { resolver_a.resolve(&record_a).await });
    let task_b = tokio::spawn(async move { resolver_b.resolve(&record_b).await });

    let id_a = task_a.await??.event_id();
    let id_b = task_b.await??.event_id();

    assert_eq!(id_a, id_b);
    assert_eq!(storage.count_events().await?, 1);
    Ok(())
}

#[tokio::test]
async fn losing_the_create_race_converges_on_the_winners_id() -> Result<()> {
    let storage = Arc::new(RacingStorage::new());
    let resolver = IdentityResolver::new(storage.clone());

    // The pair is unlinked at lookup time, so the resolver goes on to create;
    // by then the rival has linked it and the create comes back a conflict.
    let resolution = resolver
        .resolve(&sample_record("G5v0Z9", "Indie Night"))
        .await?;

    let winner_id = storage.winner_id().expect("the rival create ran");
    assert_eq!(resolution, Resolution::Existing(winner_id));
    assert_eq!(storage.count_events().await?, 1);

    // The surviving mapping is the winner's.
    let link = storage.get_link("ticketmaster", "G5v0Z9").await?.unwrap();
    assert_eq!(link.internal_event_id, Some(winner_id));
    Ok(())
}

#[tokio::test]
async fn manual_edits_survive_a_later_resolve() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

    // The mapping exists with a manually edited title and no linked event.
    let mut seeded = EventLink::unlinked("ticketmaster".to_string(), "G5v0Z9".to_string());
    seeded.title = Some("Custom Title".to_string());
    storage.save_link(&seeded).await?;

    let resolver = IdentityResolver::new(storage.clone());
    let resolution = resolver
        .resolve(&sample_record("G5v0Z9", "Indie Night"))
        .await?;
    assert!(matches!(resolution, Resolution::Created(_)));

    let link = storage.get_link("ticketmaster", "G5v0Z9").await?.unwrap();
    assert_eq!(link.internal_event_id, Some(resolution.event_id()));
    assert_eq!(link.title.as_deref(), Some("Custom Title"));
    // Fields that were null get filled from the fresh record.
    assert_eq!(link.venue.as_deref(), Some("Sala Apolo, Barcelona"));
    Ok(())
}

#[tokio::test]
async fn failed_validation_leaves_the_pair_retryable() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let resolver = IdentityResolver::new(storage.clone());

    let bad = sample_record("G5v0Z9", "   ");
    assert!(resolver.resolve(&bad).await.is_err());
    assert_eq!(storage.count_events().await?, 0);
    assert!(storage.get_link("ticketmaster", "G5v0Z9").await?.is_none());

    // A corrected payload for the same pair succeeds afterward.
    let good = sample_record("G5v0Z9", "Indie Night");
    let resolution = resolver.resolve(&good).await?;
    assert!(matches!(resolution, Resolution::Created(_)));
    assert_eq!(storage.count_events().await?, 1);
    Ok(())
}

#[tokio::test]
async fn favorites_resolve_external_listings_on_demand() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let resolver = IdentityResolver::new(storage.clone());

    // A numeric listing id names an internal row and is used as-is.
    let record = sample_record("G5v0Z9", "Indie Night");
    let existing_id = resolver.resolve(&record).await?.event_id();
    let favored = resolver
        .favorite_listing(7, &existing_id.to_string(), None)
        .await?;
    assert_eq!(favored, existing_id);

    // An external id creates the event first, then favorites it.
    let other = sample_record("K9y2W4", "Flamenco Evening");
    let created = resolver.favorite_listing(7, "K9y2W4", Some(&other)).await?;
    assert_ne!(created, existing_id);
    assert_eq!(storage.get_favorites(7).await?.len(), 2);
    assert_eq!(storage.count_events().await?, 2);
    Ok(())
}

#[tokio::test]
async fn deleting_an_event_cleans_up_its_dependents() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let resolver = IdentityResolver::new(storage.clone());

    let event_id = resolver
        .resolve(&sample_record("G5v0Z9", "Indie Night"))
        .await?
        .event_id();
    storage.add_favorite(7, event_id).await?;
    storage.add_attendee(8, event_id).await?;
    storage.add_comment(7, event_id, "see you there").await?;

    storage.delete_event(event_id).await?;

    assert_eq!(storage.count_events().await?, 0);
    assert!(storage.get_favorites(7).await?.is_empty());

    // The mapping went with the event, so the pair resolves fresh.
    let resolution = resolver
        .resolve(&sample_record("G5v0Z9", "Indie Night"))
        .await?;
    assert!(matches!(resolution, Resolution::Created(_)));
    Ok(())
}
