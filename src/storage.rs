use crate::error::{Result, SyncError};
use crate::types::{Comment, Event, EventLink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Storage trait for events, link mappings, and their dependent rows.
#[async_trait]
pub trait Storage: Send + Sync {
    // Link mapping operations
    async fn get_link(&self, source: &str, external_id: &str) -> Result<Option<EventLink>>;
    /// Write a mapping row as-is. This is the administrative path (manual
    /// edits); normal resolution goes through `create_linked_event`.
    async fn save_link(&self, link: &EventLink) -> Result<()>;

    // Event operations
    async fn create_event(&self, event: &mut Event) -> Result<()>;
    async fn get_event(&self, event_id: i64) -> Result<Option<Event>>;
    /// Delete an event and every dependent favorite/attendee/comment/mapping
    /// row in one transaction. Deleting an absent id is a no-op.
    async fn delete_event(&self, event_id: i64) -> Result<()>;
    async fn count_events(&self) -> Result<usize>;

    /// Create an event row and link the mapping to it, atomically per
    /// `(source, external_id)`. Fails with `ConflictRace` when the pair is
    /// already linked; cached display fields on a pre-existing mapping row
    /// are only filled where currently null.
    async fn create_linked_event(&self, event: &mut Event, link: &EventLink) -> Result<i64>;

    // Dependent rows hanging off an event (cascade targets)
    async fn add_favorite(&self, user_id: i64, event_id: i64) -> Result<()>;
    async fn get_favorites(&self, user_id: i64) -> Result<Vec<i64>>;
    async fn add_attendee(&self, user_id: i64, event_id: i64) -> Result<()>;
    async fn add_comment(&self, user_id: i64, event_id: i64, body: &str) -> Result<()>;
}

#[derive(Default)]
struct State {
    last_event_id: i64,
    events: HashMap<i64, Event>,
    links: HashMap<(String, String), EventLink>,
    favorites: Vec<(i64, i64)>,
    attendees: Vec<(i64, i64)>,
    comments: Vec<Comment>,
}

/// In-memory storage implementation for development/testing.
///
/// One mutex guards the whole table set so that create-and-link and the
/// delete cascade are atomic, the same way the SQL backend wraps them in a
/// transaction.
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_link(&self, source: &str, external_id: &str) -> Result<Option<EventLink>> {
        let state = self.state.lock().unwrap();
        let link = state
            .links
            .get(&(source.to_string(), external_id.to_string()))
            .cloned();
        Ok(link)
    }

    async fn save_link(&self, link: &EventLink) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.links.insert(
            (link.source.clone(), link.external_id.clone()),
            link.clone(),
        );
        debug!("Saved link for {}:{}", link.source, link.external_id);
        Ok(())
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.last_event_id += 1;
        let id = state.last_event_id;
        event.id = Some(id);
        state.events.insert(id, event.clone());

        debug!("Created event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        let state = self.state.lock().unwrap();
        Ok(state.events.get(&event_id).cloned())
    }

    async fn delete_event(&self, event_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.events.remove(&event_id).is_none() {
            debug!("Delete of absent event {} ignored", event_id);
            return Ok(());
        }
        state.favorites.retain(|(_, e)| *e != event_id);
        state.attendees.retain(|(_, e)| *e != event_id);
        state.comments.retain(|c| c.event_id != event_id);
        state
            .links
            .retain(|_, link| link.internal_event_id != Some(event_id));

        debug!("Deleted event {} and its dependent rows", event_id);
        Ok(())
    }

    async fn count_events(&self) -> Result<usize> {
        let state = self.state.lock().unwrap();
        Ok(state.events.len())
    }

    async fn create_linked_event(&self, event: &mut Event, link: &EventLink) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let key = (link.source.clone(), link.external_id.clone());

        if let Some(existing) = state.links.get(&key) {
            if existing.internal_event_id.is_some() {
                return Err(SyncError::ConflictRace {
                    source_tag: link.source.clone(),
                    external_id: link.external_id.clone(),
                });
            }
        }

        state.last_event_id += 1;
        let id = state.last_event_id;
        event.id = Some(id);
        state.events.insert(id, event.clone());

        match state.links.get_mut(&key) {
            Some(existing) => {
                existing.internal_event_id = Some(id);
                existing.coalesce_display_fields(link);
            }
            None => {
                let mut fresh = link.clone();
                fresh.internal_event_id = Some(id);
                state.links.insert(key, fresh);
            }
        }

        debug!(
            "Created event {} linked to {}:{}",
            id, link.source, link.external_id
        );
        Ok(id)
    }

    async fn add_favorite(&self, user_id: i64, event_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&event_id) {
            return Err(SyncError::Store {
                message: format!("favorite references missing event {event_id}"),
            });
        }
        if !state.favorites.contains(&(user_id, event_id)) {
            state.favorites.push((user_id, event_id));
            debug!("User {} favorited event {}", user_id, event_id);
        }
        Ok(())
    }

    async fn get_favorites(&self, user_id: i64) -> Result<Vec<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .favorites
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, e)| *e)
            .collect())
    }

    async fn add_attendee(&self, user_id: i64, event_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&event_id) {
            return Err(SyncError::Store {
                message: format!("attendee references missing event {event_id}"),
            });
        }
        if !state.attendees.contains(&(user_id, event_id)) {
            state.attendees.push((user_id, event_id));
        }
        Ok(())
    }

    async fn add_comment(&self, user_id: i64, event_id: i64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&event_id) {
            return Err(SyncError::Store {
                message: format!("comment references missing event {event_id}"),
            });
        }
        state.comments.push(Comment {
            user_id,
            event_id,
            body: body.to_string(),
        });
        Ok(())
    }
}
