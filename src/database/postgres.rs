use futures_util::future::BoxFuture;
use sqlx::PgPool;

use super::{LocationRecord, LocationStore, StoreError, UpsertOutcome, VenueCursor, VenueQuery};

// One statement, serialised on the user_id primary key: a concurrent first
// insert is turned into the conditional update instead of a failure. No row
// comes back when the stored check-in is as new or newer. `xmax = 0` holds
// only for a freshly inserted tuple.
const UPSERT_IF_NEWER: &str = r#"
    INSERT INTO user_locations (user_id, venue_id, checkin_ts)
    VALUES ($1, $2, $3)
    ON CONFLICT (user_id) DO UPDATE
    SET venue_id = EXCLUDED.venue_id, checkin_ts = EXCLUDED.checkin_ts
    WHERE user_locations.checkin_ts < EXCLUDED.checkin_ts
    RETURNING (xmax = 0) AS inserted
"#;

const FIND_FRESH: &str = r#"
    SELECT user_id, venue_id, checkin_ts
    FROM user_locations
    WHERE user_id = $1 AND checkin_ts > $2
"#;

// Keyset pagination on user_id; $3 is NULL for the first page.
const VENUE_PAGE: &str = r#"
    SELECT user_id, venue_id, checkin_ts
    FROM user_locations
    WHERE venue_id = $1
      AND checkin_ts > $2
      AND ($3::TEXT IS NULL OR user_id > $3)
    ORDER BY user_id
    LIMIT $4
"#;

#[derive(Debug, Clone)]
pub struct PostgresLocationStore {
    pool: PgPool,
}

impl PostgresLocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl LocationStore for PostgresLocationStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            let row: Option<(bool,)> = sqlx::query_as(UPSERT_IF_NEWER)
                .bind(&record.user_id)
                .bind(&record.venue_id)
                .bind(record.checkin_ts)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Postgres)?;

            outcome_from_row(row.map(|(inserted,)| inserted), &record.user_id)
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        Box::pin(async move {
            sqlx::query_as::<_, LocationRecord>(FIND_FRESH)
                .bind(user_id)
                .bind(fresh_after)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Postgres)
        })
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        let cursor = PostgresVenueCursor {
            pool: self.pool.clone(),
            query,
            last_user_id: None,
        };
        Box::pin(async move { Ok(Box::new(cursor) as Box<dyn VenueCursor>) })
    }
}

struct PostgresVenueCursor {
    pool: PgPool,
    query: VenueQuery,
    last_user_id: Option<String>,
}

impl VenueCursor for PostgresVenueCursor {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>> {
        Box::pin(async move {
            let limit = i64::try_from(max).unwrap_or(i64::MAX);
            let batch = sqlx::query_as::<_, LocationRecord>(VENUE_PAGE)
                .bind(&self.query.venue_id)
                .bind(self.query.fresh_after)
                .bind(self.last_user_id.as_deref())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::Postgres)?;

            if let Some(last) = batch.last() {
                self.last_user_id = Some(last.user_id.clone());
            }
            Ok(batch)
        })
    }
}

/// `None` means the conflict update's guard rejected the write.
fn outcome_from_row(inserted: Option<bool>, user_id: &str) -> Result<UpsertOutcome, StoreError> {
    match inserted {
        Some(true) => Ok(UpsertOutcome::Inserted),
        Some(false) => Ok(UpsertOutcome::Updated),
        None => Err(StoreError::DuplicateKey {
            user_id: user_id.to_string(),
        }),
    }
}
