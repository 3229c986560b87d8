use crate::constants::DEFAULT_VENUE_NAME;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized event record produced by one importer run.
///
/// Ephemeral: rebuilt on every import and never persisted as-is. The resolver
/// copies what it needs into the event row and the link mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalEventRecord {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub venue_name: String,
    pub city: String,
    pub country: String,
    pub event_day: NaiveDate,
    pub start_time: NaiveTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub event_url: Option<String>,
    pub category: String,
}

impl ExternalEventRecord {
    /// Venue display string: "{venue}, {city}", with the city segment omitted
    /// when the provider did not supply one.
    pub fn venue_display(&self) -> String {
        let name = if self.venue_name.is_empty() {
            DEFAULT_VENUE_NAME
        } else {
            self.venue_name.as_str()
        };
        if self.city.is_empty() {
            name.to_string()
        } else {
            format!("{}, {}", name, self.city)
        }
    }
}

/// Canonical event row owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub venue: String,
    pub city: String,
    pub country: String,
    pub event_day: NaiveDate,
    pub start_time: NaiveTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub event_url: Option<String>,
    pub category: String,
    pub creator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build an internal event row from a normalized external record.
    /// Externally sourced events have no creator.
    pub fn from_record(record: &ExternalEventRecord) -> Self {
        Self {
            id: None,
            title: record.title.clone(),
            description: record.description.clone(),
            venue: record.venue_display(),
            city: record.city.clone(),
            country: record.country.clone(),
            event_day: record.event_day,
            start_time: record.start_time,
            latitude: record.latitude,
            longitude: record.longitude,
            image_url: record.image_url.clone(),
            event_url: record.event_url.clone(),
            category: record.category.clone(),
            creator_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Durable mapping from a provider identity pair to an internal event, plus
/// cached display fields that save a refetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLink {
    pub source: String,
    pub external_id: String,
    pub internal_event_id: Option<i64>,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub image_url: Option<String>,
    pub event_day: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub event_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventLink {
    /// A mapping row with no link and no cached fields yet.
    pub fn unlinked(source: String, external_id: String) -> Self {
        Self {
            source,
            external_id,
            internal_event_id: None,
            title: None,
            venue: None,
            image_url: None,
            event_day: None,
            start_time: None,
            event_url: None,
            created_at: Utc::now(),
        }
    }

    /// Cached display fields for a freshly imported record. The link id is
    /// left unset; the store assigns it during create-and-link.
    pub fn from_record(record: &ExternalEventRecord) -> Self {
        Self {
            source: record.source.clone(),
            external_id: record.external_id.clone(),
            internal_event_id: None,
            title: Some(record.title.clone()),
            venue: Some(record.venue_display()),
            image_url: record.image_url.clone(),
            event_day: Some(record.event_day),
            start_time: Some(record.start_time),
            event_url: record.event_url.clone(),
            created_at: Utc::now(),
        }
    }

    /// Fill previously-null cached fields from `fresh`. Populated fields are
    /// never overwritten; the first non-null value wins.
    pub fn coalesce_display_fields(&mut self, fresh: &EventLink) {
        if self.title.is_none() {
            self.title = fresh.title.clone();
        }
        if self.venue.is_none() {
            self.venue = fresh.venue.clone();
        }
        if self.image_url.is_none() {
            self.image_url = fresh.image_url.clone();
        }
        if self.event_day.is_none() {
            self.event_day = fresh.event_day;
        }
        if self.start_time.is_none() {
            self.start_time = fresh.start_time;
        }
        if self.event_url.is_none() {
            self.event_url = fresh.event_url.clone();
        }
    }
}

/// A comment left on an event. Carried so event deletion has real dependents
/// to cascade over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub user_id: i64,
    pub event_id: i64,
    pub body: String,
}

/// An entry in a client-facing event list. Internal rows carry numeric ids,
/// provider listings carry external ids; the dedup pass only reads the
/// fields below and passes everything else through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    #[serde(deserialize_with = "listing_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub title: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Listing {
    pub fn new(kind: &str, id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            source: None,
            title: title.to_string(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

/// Client payloads carry numeric ids for internal rows and string ids for
/// provider listings; both normalize to strings here.
fn listing_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("unsupported listing id: {other}"))),
    }
}

/// A provider of externally sourced event listings.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Source tag recorded on every listing this provider produces.
    fn source_name(&self) -> &'static str;

    /// Fetch and normalize one city's listings. Credential and provider
    /// failures degrade to an empty list; they are logged, never raised.
    async fn fetch_city(&self, city: &str) -> Vec<ExternalEventRecord>;

    /// Fetch several cities and concatenate the results. A failing city
    /// contributes nothing without aborting the rest.
    async fn fetch_cities(&self, cities: &[String]) -> Vec<ExternalEventRecord> {
        let mut records = Vec::new();
        for city in cities {
            records.extend(self.fetch_city(city).await);
        }
        records
    }
}
