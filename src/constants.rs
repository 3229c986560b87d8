use chrono::NaiveTime;

/// Source and placeholder constants shared across the sync pipeline.
// Source tags (stored in the link table, matched by the deduplicator)
pub const TICKETMASTER_SOURCE: &str = "ticketmaster";

// Listing kind used by clients for externally sourced entries
pub const EXTERNAL_LISTING_KIND: &str = "api";

// Placeholders applied when the provider omits a field
pub const DEFAULT_VENUE_NAME: &str = "Venue";
pub const DEFAULT_GENRE: &str = "Music";

// Category slug for this provider; the importer only queries music classifications
pub const MUSIC_CATEGORY_SLUG: &str = "music";

// Provider-imposed cap on the `size` query parameter
pub const MAX_PAGE_SIZE: u32 = 200;

/// Fallback start time for listings the provider ships without one.
pub fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).unwrap()
}
