use crate::config::TicketmasterConfig;
use crate::constants::{
    default_start_time, DEFAULT_GENRE, DEFAULT_VENUE_NAME, MAX_PAGE_SIZE, MUSIC_CATEGORY_SLUG,
    TICKETMASTER_SOURCE,
};
use crate::error::{Result, SyncError};
use crate::types::{EventSource, ExternalEventRecord};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DISCOVERY_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";

pub struct TicketmasterImporter {
    client: reqwest::Client,
    api_key: Option<String>,
    config: TicketmasterConfig,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<DiscoveryEmbedded>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEmbedded {
    #[serde(default)]
    events: Vec<ProviderEvent>,
}

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    id: Option<String>,
    name: Option<String>,
    url: Option<String>,
    dates: Option<ProviderDates>,
    #[serde(default)]
    images: Vec<ProviderImage>,
    #[serde(default)]
    classifications: Vec<ProviderClassification>,
    #[serde(rename = "_embedded")]
    embedded: Option<ProviderEmbedded>,
}

#[derive(Debug, Deserialize)]
struct ProviderDates {
    start: Option<ProviderDateStart>,
}

#[derive(Debug, Deserialize)]
struct ProviderDateStart {
    #[serde(rename = "localDate")]
    local_date: Option<String>,
    #[serde(rename = "localTime")]
    local_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderImage {
    width: Option<u32>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderClassification {
    #[serde(rename = "subGenre")]
    sub_genre: Option<NamedValue>,
    genre: Option<NamedValue>,
}

#[derive(Debug, Deserialize)]
struct ProviderEmbedded {
    #[serde(default)]
    venues: Vec<ProviderVenue>,
}

#[derive(Debug, Deserialize)]
struct ProviderVenue {
    name: Option<String>,
    city: Option<NamedValue>,
    location: Option<ProviderLocation>,
}

#[derive(Debug, Deserialize)]
struct ProviderLocation {
    latitude: Option<String>,
    longitude: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: Option<String>,
}

fn parse_local_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

// Provider coordinates arrive as strings. Anything unparseable stays None
// rather than degrading to 0/0.
fn parse_coordinate(value: Option<String>) -> Option<f64> {
    value
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn genre_label(classification: &ProviderClassification) -> Option<String> {
    classification
        .sub_genre
        .as_ref()
        .and_then(|g| g.name.clone())
        .or_else(|| classification.genre.as_ref().and_then(|g| g.name.clone()))
}

impl TicketmasterImporter {
    /// Reads the provider credential from `TICKETMASTER_API_KEY`. A missing
    /// key does not fail construction; fetches will return empty instead.
    pub fn new(config: TicketmasterConfig) -> Self {
        Self::with_api_key(std::env::var("TICKETMASTER_API_KEY").ok(), config)
    }

    pub fn with_api_key(api_key: Option<String>, config: TicketmasterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        }
    }

    fn effective_page_size(&self) -> u32 {
        self.config.page_size.min(MAX_PAGE_SIZE)
    }

    fn normalize(&self, event: ProviderEvent) -> Result<ExternalEventRecord> {
        let external_id = event
            .id
            .ok_or_else(|| SyncError::MissingField("id not found".into()))?;

        let start = event.dates.and_then(|d| d.start);
        let event_day = start
            .as_ref()
            .and_then(|s| s.local_date.as_deref())
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .unwrap_or_else(|| Local::now().date_naive());
        let start_time = start
            .as_ref()
            .and_then(|s| s.local_time.as_deref())
            .and_then(parse_local_time)
            .unwrap_or_else(default_start_time);

        let image_url = event
            .images
            .into_iter()
            .filter(|image| image.url.is_some())
            .max_by_key(|image| image.width.unwrap_or(0))
            .and_then(|image| image.url);

        let venue = event
            .embedded
            .and_then(|embedded| embedded.venues.into_iter().next());
        let (venue_name, city, latitude, longitude) = match venue {
            Some(venue) => {
                let name = venue
                    .name
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| DEFAULT_VENUE_NAME.to_string());
                let city = venue
                    .city
                    .and_then(|city| city.name)
                    .unwrap_or_default();
                let (latitude, longitude) = match venue.location {
                    Some(location) => (
                        parse_coordinate(location.latitude),
                        parse_coordinate(location.longitude),
                    ),
                    None => (None, None),
                };
                (name, city, latitude, longitude)
            }
            None => (DEFAULT_VENUE_NAME.to_string(), String::new(), None, None),
        };

        let description = event
            .classifications
            .first()
            .and_then(genre_label)
            .unwrap_or_else(|| DEFAULT_GENRE.to_string());

        Ok(ExternalEventRecord {
            source: TICKETMASTER_SOURCE.to_string(),
            external_id,
            title: event.name.unwrap_or_default(),
            description,
            venue_name,
            city,
            country: self.config.country_code.clone(),
            event_day,
            start_time,
            latitude,
            longitude,
            image_url,
            event_url: event.url,
            category: MUSIC_CATEGORY_SLUG.to_string(),
        })
    }

    async fn request_city(&self, api_key: &str, city: &str) -> Result<Vec<ExternalEventRecord>> {
        let size = self.effective_page_size().to_string();
        debug!("Requesting up to {} music listings for {}", size, city);

        let response = self
            .client
            .get(DISCOVERY_URL)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .query(&[
                ("apikey", api_key),
                ("city", city),
                ("classificationName", MUSIC_CATEGORY_SLUG),
                ("size", size.as_str()),
                ("countryCode", self.config.country_code.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: DiscoveryResponse = response.json().await?;
        let events = payload
            .embedded
            .map(|embedded| embedded.events)
            .unwrap_or_default();

        let records = events
            .into_iter()
            .filter_map(|event| match self.normalize(event) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping malformed listing for {}: {}", city, e);
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

#[async_trait::async_trait]
impl EventSource for TicketmasterImporter {
    fn source_name(&self) -> &'static str {
        TICKETMASTER_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_city(&self, city: &str) -> Vec<ExternalEventRecord> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => {
                warn!("TICKETMASTER_API_KEY is not set, returning no listings");
                return Vec::new();
            }
        };

        match self.request_city(api_key, city).await {
            Ok(records) => {
                info!("Fetched {} listings for {}", records.len(), city);
                records
            }
            Err(e) => {
                warn!("Provider request for {} failed: {}", city, e);
                Vec::new()
            }
        }
    }

    async fn fetch_cities(&self, cities: &[String]) -> Vec<ExternalEventRecord> {
        let mut records = Vec::new();
        for (i, city) in cities.iter().enumerate() {
            if i > 0 && self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
            records.extend(self.fetch_city(city).await);
        }
        records
    }
}
