use crate::error::{Result, SyncError};
use crate::storage::Storage;
use crate::types::{Event, EventLink};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use libsql::{Builder, Connection, Database};
use std::env;
use tracing::{debug, info};

/// Turso/libSQL-backed storage.
pub struct LibsqlStorage {
    db: Database,
}

fn store_err(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::Store {
        message: format!("{context}: {e}"),
    }
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| store_err(&format!("Malformed event_day '{value}'"), e))
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map_err(|e| store_err(&format!("Malformed start_time '{value}'"), e))
}

// Rows written by this code carry RFC 3339 timestamps; rows created by SQL
// defaults carry datetime('now') text. Anything else degrades to "now".
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

fn event_from_row(row: &libsql::Row) -> Result<Event> {
    let event_day: String = row.get(6).map_err(|e| store_err("Failed to get event_day", e))?;
    let start_time: String = row.get(7).map_err(|e| store_err("Failed to get start_time", e))?;
    let created_at: String = row.get(14).map_err(|e| store_err("Failed to get created_at", e))?;

    Ok(Event {
        id: Some(row.get(0).map_err(|e| store_err("Failed to get id", e))?),
        title: row.get(1).map_err(|e| store_err("Failed to get title", e))?,
        description: row.get(2).map_err(|e| store_err("Failed to get description", e))?,
        venue: row.get(3).map_err(|e| store_err("Failed to get venue", e))?,
        city: row.get(4).map_err(|e| store_err("Failed to get city", e))?,
        country: row.get(5).map_err(|e| store_err("Failed to get country", e))?,
        event_day: parse_day(&event_day)?,
        start_time: parse_time(&start_time)?,
        latitude: row.get::<f64>(8).ok(),
        longitude: row.get::<f64>(9).ok(),
        image_url: row.get::<String>(10).ok(),
        event_url: row.get::<String>(11).ok(),
        category: row.get(12).map_err(|e| store_err("Failed to get category", e))?,
        creator_id: row.get::<i64>(13).ok(),
        created_at: parse_timestamp(&created_at),
    })
}

fn link_from_row(row: &libsql::Row) -> Result<EventLink> {
    let event_day = match row.get::<String>(6).ok() {
        Some(v) => Some(parse_day(&v)?),
        None => None,
    };
    let start_time = match row.get::<String>(7).ok() {
        Some(v) => Some(parse_time(&v)?),
        None => None,
    };
    let created_at: String = row.get(9).map_err(|e| store_err("Failed to get created_at", e))?;

    Ok(EventLink {
        source: row.get(0).map_err(|e| store_err("Failed to get source", e))?,
        external_id: row.get(1).map_err(|e| store_err("Failed to get external_id", e))?,
        internal_event_id: row.get::<i64>(2).ok(),
        title: row.get::<String>(3).ok(),
        venue: row.get::<String>(4).ok(),
        image_url: row.get::<String>(5).ok(),
        event_day,
        start_time,
        event_url: row.get::<String>(8).ok(),
        created_at: parse_timestamp(&created_at),
    })
}

impl LibsqlStorage {
    /// Connect to Turso using `LIBSQL_URL` and `LIBSQL_AUTH_TOKEN`.
    pub async fn new() -> Result<Self> {
        let url = env::var("LIBSQL_URL")
            .map_err(|_| SyncError::Config("LIBSQL_URL environment variable not set".to_string()))?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| {
            SyncError::Config("LIBSQL_AUTH_TOKEN environment variable not set".to_string())
        })?;

        info!("Connecting to Turso database at {}", url);

        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| store_err("Failed to connect to database", e))?;

        Ok(Self { db })
    }

    async fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| store_err("Failed to get database connection", e))
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.connection().await?;
        let migration_sql = include_str!("../migrations/001_create_sync_schema.sql");

        conn.execute_batch(migration_sql)
            .await
            .map_err(|e| store_err("Failed to run migrations", e))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    async fn insert_event(&self, conn: &Connection, event: &mut Event) -> Result<i64> {
        conn.execute(
            "INSERT INTO events (title, description, venue, city, country, event_day, start_time, latitude, longitude, image_url, event_url, category, creator_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                event.title.as_str(),
                event.description.as_str(),
                event.venue.as_str(),
                event.city.as_str(),
                event.country.as_str(),
                event.event_day.format("%Y-%m-%d").to_string(),
                event.start_time.format("%H:%M:%S").to_string(),
                event.latitude,
                event.longitude,
                event.image_url.as_deref(),
                event.event_url.as_deref(),
                event.category.as_str(),
                event.creator_id,
                event.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| store_err("Failed to insert event", e))?;

        let id = conn.last_insert_rowid();
        event.id = Some(id);
        Ok(id)
    }

    async fn create_and_link(
        &self,
        conn: &Connection,
        event: &mut Event,
        link: &EventLink,
    ) -> Result<i64> {
        // Re-check inside the transaction; the resolver's fast path ran
        // before it began.
        let mut rows = conn
            .query(
                "SELECT internal_event_id FROM event_links WHERE source = ? AND external_id = ?",
                libsql::params![link.source.as_str(), link.external_id.as_str()],
            )
            .await
            .map_err(|e| store_err("Failed to query link", e))?;
        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
        {
            if row.get::<i64>(0).ok().is_some() {
                return Err(SyncError::ConflictRace {
                    source_tag: link.source.clone(),
                    external_id: link.external_id.clone(),
                });
            }
        }

        let event_id = self.insert_event(conn, event).await?;

        conn.execute(
            "INSERT INTO event_links (source, external_id, internal_event_id, title, venue, image_url, event_day, start_time, event_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source, external_id) DO UPDATE SET \
               internal_event_id = COALESCE(event_links.internal_event_id, excluded.internal_event_id), \
               title = COALESCE(event_links.title, excluded.title), \
               venue = COALESCE(event_links.venue, excluded.venue), \
               image_url = COALESCE(event_links.image_url, excluded.image_url), \
               event_day = COALESCE(event_links.event_day, excluded.event_day), \
               start_time = COALESCE(event_links.start_time, excluded.start_time), \
               event_url = COALESCE(event_links.event_url, excluded.event_url)",
            libsql::params![
                link.source.as_str(),
                link.external_id.as_str(),
                event_id,
                link.title.as_deref(),
                link.venue.as_deref(),
                link.image_url.as_deref(),
                link.event_day.map(|d| d.format("%Y-%m-%d").to_string()),
                link.start_time.map(|t| t.format("%H:%M:%S").to_string()),
                link.event_url.as_deref(),
                link.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| store_err("Failed to upsert link", e))?;

        // The unique key is the serialization point: if another writer linked
        // this pair first, our insert coalesced into their row and the id
        // below is theirs, not ours.
        let mut rows = conn
            .query(
                "SELECT internal_event_id FROM event_links WHERE source = ? AND external_id = ?",
                libsql::params![link.source.as_str(), link.external_id.as_str()],
            )
            .await
            .map_err(|e| store_err("Failed to query link", e))?;
        let linked = rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
            .and_then(|row| row.get::<i64>(0).ok());

        match linked {
            Some(id) if id == event_id => Ok(event_id),
            _ => Err(SyncError::ConflictRace {
                source_tag: link.source.clone(),
                external_id: link.external_id.clone(),
            }),
        }
    }

    async fn delete_cascade(&self, conn: &Connection, event_id: i64) -> Result<()> {
        for sql in [
            "DELETE FROM favorites WHERE event_id = ?",
            "DELETE FROM attendees WHERE event_id = ?",
            "DELETE FROM comments WHERE event_id = ?",
            "DELETE FROM event_links WHERE internal_event_id = ?",
            "DELETE FROM events WHERE id = ?",
        ] {
            conn.execute(sql, libsql::params![event_id])
                .await
                .map_err(|e| store_err("Failed to cascade delete", e))?;
        }
        Ok(())
    }

    async fn event_exists(&self, conn: &Connection, event_id: i64) -> Result<bool> {
        let mut rows = conn
            .query(
                "SELECT 1 FROM events WHERE id = ?",
                libsql::params![event_id],
            )
            .await
            .map_err(|e| store_err("Failed to query event", e))?;
        Ok(rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
            .is_some())
    }
}

#[async_trait]
impl Storage for LibsqlStorage {
    async fn get_link(&self, source: &str, external_id: &str) -> Result<Option<EventLink>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT source, external_id, internal_event_id, title, venue, image_url, event_day, start_time, event_url, created_at \
                 FROM event_links WHERE source = ? AND external_id = ?",
                libsql::params![source, external_id],
            )
            .await
            .map_err(|e| store_err("Failed to query link", e))?;

        match rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
        {
            Some(row) => Ok(Some(link_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_link(&self, link: &EventLink) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            "INSERT OR REPLACE INTO event_links (source, external_id, internal_event_id, title, venue, image_url, event_day, start_time, event_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                link.source.as_str(),
                link.external_id.as_str(),
                link.internal_event_id,
                link.title.as_deref(),
                link.venue.as_deref(),
                link.image_url.as_deref(),
                link.event_day.map(|d| d.format("%Y-%m-%d").to_string()),
                link.start_time.map(|t| t.format("%H:%M:%S").to_string()),
                link.event_url.as_deref(),
                link.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| store_err("Failed to save link", e))?;

        debug!("Saved link for {}:{}", link.source, link.external_id);
        Ok(())
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let conn = self.connection().await?;
        self.insert_event(&conn, event).await?;
        Ok(())
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, description, venue, city, country, event_day, start_time, latitude, longitude, image_url, event_url, category, creator_id, created_at \
                 FROM events WHERE id = ?",
                libsql::params![event_id],
            )
            .await
            .map_err(|e| store_err("Failed to query event", e))?;

        match rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
        {
            Some(row) => Ok(Some(event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_event(&self, event_id: i64) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute("BEGIN IMMEDIATE", libsql::params![])
            .await
            .map_err(|e| store_err("Failed to begin transaction", e))?;

        match self.delete_cascade(&conn, event_id).await {
            Ok(()) => {
                conn.execute("COMMIT", libsql::params![])
                    .await
                    .map_err(|e| store_err("Failed to commit transaction", e))?;
                debug!("Deleted event {} and its dependent rows", event_id);
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", libsql::params![]).await;
                Err(e)
            }
        }
    }

    async fn count_events(&self) -> Result<usize> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM events", libsql::params![])
            .await
            .map_err(|e| store_err("Failed to count events", e))?;
        let count = rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
            .and_then(|row| row.get::<i64>(0).ok())
            .unwrap_or(0);
        Ok(count as usize)
    }

    async fn create_linked_event(&self, event: &mut Event, link: &EventLink) -> Result<i64> {
        let conn = self.connection().await?;
        conn.execute("BEGIN IMMEDIATE", libsql::params![])
            .await
            .map_err(|e| store_err("Failed to begin transaction", e))?;

        match self.create_and_link(&conn, event, link).await {
            Ok(id) => {
                conn.execute("COMMIT", libsql::params![])
                    .await
                    .map_err(|e| store_err("Failed to commit transaction", e))?;
                debug!("Created event {} linked to {}:{}", id, link.source, link.external_id);
                Ok(id)
            }
            Err(e) => {
                // Roll back so a lost race never leaves an orphan event row.
                let _ = conn.execute("ROLLBACK", libsql::params![]).await;
                Err(e)
            }
        }
    }

    async fn add_favorite(&self, user_id: i64, event_id: i64) -> Result<()> {
        let conn = self.connection().await?;
        if !self.event_exists(&conn, event_id).await? {
            return Err(SyncError::Store {
                message: format!("favorite references missing event {event_id}"),
            });
        }
        conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, event_id) VALUES (?, ?)",
            libsql::params![user_id, event_id],
        )
        .await
        .map_err(|e| store_err("Failed to add favorite", e))?;
        Ok(())
    }

    async fn get_favorites(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT event_id FROM favorites WHERE user_id = ?",
                libsql::params![user_id],
            )
            .await
            .map_err(|e| store_err("Failed to query favorites", e))?;

        let mut event_ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| store_err("Failed to read row", e))?
        {
            event_ids.push(row.get(0).map_err(|e| store_err("Failed to get event_id", e))?);
        }
        Ok(event_ids)
    }

    async fn add_attendee(&self, user_id: i64, event_id: i64) -> Result<()> {
        let conn = self.connection().await?;
        if !self.event_exists(&conn, event_id).await? {
            return Err(SyncError::Store {
                message: format!("attendee references missing event {event_id}"),
            });
        }
        conn.execute(
            "INSERT OR IGNORE INTO attendees (user_id, event_id) VALUES (?, ?)",
            libsql::params![user_id, event_id],
        )
        .await
        .map_err(|e| store_err("Failed to add attendee", e))?;
        Ok(())
    }

    async fn add_comment(&self, user_id: i64, event_id: i64, body: &str) -> Result<()> {
        let conn = self.connection().await?;
        if !self.event_exists(&conn, event_id).await? {
            return Err(SyncError::Store {
                message: format!("comment references missing event {event_id}"),
            });
        }
        conn.execute(
            "INSERT INTO comments (user_id, event_id, body) VALUES (?, ?, ?)",
            libsql::params![user_id, event_id, body],
        )
        .await
        .map_err(|e| store_err("Failed to add comment", e))?;
        Ok(())
    }
}
