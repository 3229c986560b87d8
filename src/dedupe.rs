use crate::constants::{EXTERNAL_LISTING_KIND, TICKETMASTER_SOURCE};
use crate::error::Result;
use crate::types::Listing;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

// Ticket-tier qualifiers appended to a base title. Multi-word variants come
// first so they win over their single-word substrings.
static VARIANT_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(general[\s-]+admission|early[\s-]+bird|packages?|tickets?|presale|vip|ga)\b")
        .unwrap()
});

/// Reduce a listing title to its base form for duplicate grouping: drop
/// everything after the first `|`, lowercase, remove ticket-variant keywords,
/// keep only letters/digits/spaces, and collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let base = title.split('|').next().unwrap_or("");
    let lowered = base.to_lowercase();
    let stripped = VARIANT_KEYWORDS.replace_all(&lowered, " ");
    let cleaned: String = stripped
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_external(listing: &Listing) -> bool {
    listing.kind == EXTERNAL_LISTING_KIND
        || listing.source.as_deref() == Some(TICKETMASTER_SOURCE)
}

/// Collapse near-duplicate external listings, keeping the first occurrence of
/// each group. Order is preserved. Internal listings only merge on an exact
/// kind-plus-id match, never by title.
pub fn dedupe(listings: &[Listing]) -> Vec<Listing> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for (position, listing) in listings.iter().enumerate() {
        let key = if is_external(listing) {
            let normalized = normalize_title(&listing.title);
            if normalized.is_empty() {
                // A title that normalizes to nothing is its own group.
                format!("unkeyed-{position}")
            } else {
                normalized
            }
        } else {
            format!("{}-{}", listing.kind, listing.id)
        };

        if seen.insert(key) {
            kept.push(listing.clone());
        }
    }

    debug!(
        "Deduplicated {} listings down to {}",
        listings.len(),
        kept.len()
    );
    kept
}

/// Read a listing array from a JSON feed dump.
pub fn read_listings(path: &Path) -> Result<Vec<Listing>> {
    let content = std::fs::read_to_string(path)?;
    let listings = serde_json::from_str(&content)?;
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(id: &str, title: &str) -> Listing {
        Listing::new("api", id, title).with_source("ticketmaster")
    }

    #[test]
    fn ticket_tiers_of_one_concert_collapse_to_the_first() {
        let listings = vec![
            external("tm-1", "Rock Fest 2026 | VIP PACKAGES"),
            external("tm-2", "Rock Fest 2026 | General Admission"),
        ];

        let kept = dedupe(&listings);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "tm-1");
    }

    #[test]
    fn repeated_internal_ids_collapse_without_title_matching() {
        let listings = vec![
            Listing::new("local", "5", "A"),
            Listing::new("local", "5", "A"),
        ];

        assert_eq!(dedupe(&listings).len(), 1);
    }

    #[test]
    fn internal_listings_never_merge_by_title() {
        let listings = vec![
            Listing::new("local", "1", "Same Title"),
            Listing::new("local", "2", "Same Title"),
        ];

        assert_eq!(dedupe(&listings).len(), 2);
    }

    #[test]
    fn order_is_preserved_and_first_occurrence_wins() {
        let listings = vec![
            external("a", "Jazz Night"),
            Listing::new("local", "9", "Picnic"),
            external("b", "JAZZ NIGHT tickets"),
            external("c", "Flamenco Evening"),
        ];

        let kept = dedupe(&listings);
        let ids: Vec<_> = kept.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "9", "c"]);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let listings = vec![
            external("a", "Rock Fest | VIP"),
            external("b", "Rock Fest | GA"),
            external("c", "???"),
            external("d", "!!!"),
            Listing::new("local", "5", "A"),
            Listing::new("local", "5", "A"),
        ];

        let once = dedupe(&listings);
        let twice = dedupe(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn variant_keywords_match_whole_words_only() {
        // "ga" must not fire inside "Gala".
        let listings = vec![
            external("a", "Gala Dinner"),
            external("b", "Dinner GA"),
        ];

        let kept = dedupe(&listings);
        assert_eq!(kept.len(), 2);
        assert_eq!(normalize_title("Gala Dinner"), "gala dinner");
        assert_eq!(normalize_title("Dinner GA"), "dinner");
    }

    #[test]
    fn punctuation_is_stripped_from_keys() {
        assert_eq!(normalize_title("AC/DC"), "acdc");
        assert_eq!(normalize_title("Early-Bird Special!"), "special");
        assert_eq!(
            normalize_title("Rock Fest 2026 | VIP PACKAGES"),
            "rock fest 2026"
        );
    }

    #[test]
    fn unclassifiable_titles_stay_as_singletons() {
        let listings = vec![
            external("a", "| General Admission"),
            external("b", "***"),
            external("c", ""),
        ];

        assert_eq!(dedupe(&listings).len(), 3);
    }

    #[test]
    fn source_tag_alone_marks_a_listing_external() {
        let listings = vec![
            Listing::new("event", "1", "Indie Night").with_source("ticketmaster"),
            Listing::new("event", "2", "Indie Night | Presale").with_source("ticketmaster"),
        ];

        assert_eq!(dedupe(&listings).len(), 1);
    }
}
