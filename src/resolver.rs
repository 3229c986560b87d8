use crate::error::{Result, SyncError};
use crate::storage::Storage;
use crate::types::{Event, EventLink, ExternalEventRecord};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// True iff `id` is a pure digit string. Internal rows carry numeric ids;
/// provider ids always contain at least one non-digit character.
pub fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// An incoming listing reference, classified by id shape.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRef {
    Internal(i64),
    External(String),
}

impl EventRef {
    pub fn classify(id: &str) -> Self {
        if is_numeric_id(id) {
            // A digit string too long for i64 cannot name an internal row.
            match id.parse::<i64>() {
                Ok(n) => EventRef::Internal(n),
                Err(_) => EventRef::External(id.to_string()),
            }
        } else {
            EventRef::External(id.to_string())
        }
    }
}

/// Whether resolution found an existing internal row or created one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Existing(i64),
    Created(i64),
}

impl Resolution {
    pub fn event_id(&self) -> i64 {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => *id,
        }
    }
}

pub struct IdentityResolver {
    storage: Arc<dyn Storage>,
}

impl IdentityResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Map a normalized record to an internal event id, creating the event
    /// exactly once per `(source, external_id)` pair.
    ///
    /// Creation is keyed solely by the identity pair; no content-based
    /// matching against existing events is attempted, so the same real-world
    /// event imported under two provider ids yields two rows.
    #[instrument(skip(self, record), fields(source = %record.source, external_id = %record.external_id))]
    pub async fn resolve(&self, record: &ExternalEventRecord) -> Result<Resolution> {
        if let Some(link) = self
            .storage
            .get_link(&record.source, &record.external_id)
            .await?
        {
            if let Some(event_id) = link.internal_event_id {
                debug!("Already linked to event {}", event_id);
                return Ok(Resolution::Existing(event_id));
            }
        }

        // Reject before creating anything so the pair stays unlinked and a
        // retry with corrected data can still succeed.
        if record.title.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "record {}:{} has no title",
                record.source, record.external_id
            )));
        }

        let mut event = Event::from_record(record);
        let link = EventLink::from_record(record);

        match self.storage.create_linked_event(&mut event, &link).await {
            Ok(event_id) => {
                info!(
                    "Created event {} for {}:{}",
                    event_id, record.source, record.external_id
                );
                Ok(Resolution::Created(event_id))
            }
            Err(SyncError::ConflictRace {
                source_tag,
                external_id,
            }) => {
                // Another writer linked this pair first; converge on its row.
                debug!("Lost creation race for {}:{}, re-reading", source_tag, external_id);
                let event_id = self
                    .storage
                    .get_link(&source_tag, &external_id)
                    .await?
                    .and_then(|link| link.internal_event_id)
                    .ok_or_else(|| SyncError::Store {
                        message: format!(
                            "mapping for {source_tag}:{external_id} lost after conflict"
                        ),
                    })?;
                Ok(Resolution::Existing(event_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Record a favorite for a listing a user tapped. Numeric ids name
    /// internal rows directly; provider ids are resolved first, creating the
    /// event on demand.
    #[instrument(skip(self, record))]
    pub async fn favorite_listing(
        &self,
        user_id: i64,
        listing_id: &str,
        record: Option<&ExternalEventRecord>,
    ) -> Result<i64> {
        let event_id = match EventRef::classify(listing_id) {
            EventRef::Internal(id) => id,
            EventRef::External(external_id) => {
                let record = record.ok_or_else(|| {
                    SyncError::Validation(format!(
                        "external listing {external_id} needs a normalized payload to resolve"
                    ))
                })?;
                self.resolve(record).await?.event_id()
            }
        };
        self.storage.add_favorite(user_id, event_id).await?;
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn numeric_id_accepts_only_nonempty_digit_strings() {
        assert!(is_numeric_id("42"));
        assert!(is_numeric_id("007"));
        assert!(!is_numeric_id("tm-42"));
        assert!(!is_numeric_id(""));
        assert!(!is_numeric_id("42a"));
        assert!(!is_numeric_id("٤٢"));
    }

    #[test]
    fn classify_separates_internal_and_external_ids() {
        assert_eq!(EventRef::classify("42"), EventRef::Internal(42));
        assert_eq!(
            EventRef::classify("G5v0Z9"),
            EventRef::External("G5v0Z9".to_string())
        );
        // Longer than any i64, so it cannot be an internal row id.
        assert_eq!(
            EventRef::classify("99999999999999999999"),
            EventRef::External("99999999999999999999".to_string())
        );
    }

    #[tokio::test]
    async fn external_favorite_without_payload_is_rejected() {
        let resolver = IdentityResolver::new(Arc::new(InMemoryStorage::new()));
        let result = resolver.favorite_listing(7, "G5v0Z9", None).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }
}
