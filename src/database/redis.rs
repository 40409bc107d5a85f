//! Redis layout:
//!
//! - `user_location:{user_id}` hash with `venue_id` and `checkin_ts`;
//! - `venue_users:{venue_id}` sorted set of user ids scored by `checkin_ts`.
//!
//! The conditional write runs as one Lua script so the check and both index
//! updates are atomic on the server. The script touches keys derived inside
//! it, so the layout assumes a single (non-cluster) Redis deployment.

use std::collections::HashSet;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Script};
use futures_util::future::BoxFuture;

use super::{LocationRecord, LocationStore, StoreError, UpsertOutcome, VenueCursor, VenueQuery};

const USER_KEY_PREFIX: &str = "user_location:";
const VENUE_KEY_PREFIX: &str = "venue_users:";

const STATUS_REJECTED: i64 = 0;
const STATUS_UPDATED: i64 = 1;
const STATUS_INSERTED: i64 = 2;

// KEYS[1] user hash; ARGV: user_id, venue_id, checkin_ts, venue key prefix.
const UPSERT_SCRIPT: &str = r#"
local current = redis.call('HMGET', KEYS[1], 'venue_id', 'checkin_ts')
local incoming = tonumber(ARGV[3])
if not current[2] then
    redis.call('HSET', KEYS[1], 'venue_id', ARGV[2], 'checkin_ts', ARGV[3])
    redis.call('ZADD', ARGV[4] .. ARGV[2], incoming, ARGV[1])
    return 2
end
if tonumber(current[2]) < incoming then
    redis.call('ZREM', ARGV[4] .. current[1], ARGV[1])
    redis.call('HSET', KEYS[1], 'venue_id', ARGV[2], 'checkin_ts', ARGV[3])
    redis.call('ZADD', ARGV[4] .. ARGV[2], incoming, ARGV[1])
    return 1
end
return 0
"#;

#[derive(Clone)]
pub struct RedisLocationStore {
    conn: MultiplexedConnection,
    upsert: Script,
}

impl RedisLocationStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            upsert: Script::new(UPSERT_SCRIPT),
        }
    }
}

fn user_key(user_id: &str) -> String {
    format!("{USER_KEY_PREFIX}{user_id}")
}

fn venue_key(venue_id: &str) -> String {
    format!("{VENUE_KEY_PREFIX}{venue_id}")
}

fn outcome_from_status(status: i64, user_id: &str) -> Result<UpsertOutcome, StoreError> {
    match status {
        STATUS_UPDATED => Ok(UpsertOutcome::Updated),
        STATUS_INSERTED => Ok(UpsertOutcome::Inserted),
        STATUS_REJECTED => Err(StoreError::DuplicateKey {
            user_id: user_id.to_string(),
        }),
        other => Err(StoreError::Corrupt(format!(
            "upsert script returned unknown status {other}"
        ))),
    }
}

fn record_from_fields(
    user_id: &str,
    venue_id: Option<String>,
    checkin_ts: Option<i64>,
) -> Result<Option<LocationRecord>, StoreError> {
    match (venue_id, checkin_ts) {
        (Some(venue_id), Some(checkin_ts)) => Ok(Some(LocationRecord {
            user_id: user_id.to_string(),
            venue_id,
            checkin_ts,
        })),
        (None, None) => Ok(None),
        _ => Err(StoreError::Corrupt(format!(
            "location hash for {user_id} is missing a field"
        ))),
    }
}

impl LocationStore for RedisLocationStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let status: i64 = self
                .upsert
                .key(user_key(&record.user_id))
                .arg(&record.user_id)
                .arg(&record.venue_id)
                .arg(record.checkin_ts)
                .arg(VENUE_KEY_PREFIX)
                .invoke_async(&mut conn)
                .await?;

            outcome_from_status(status, &record.user_id)
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            // One HMGET so the key match and the freshness check see the same
            // version of the record.
            let (venue_id, checkin_ts): (Option<String>, Option<i64>) = ::redis::cmd("HMGET")
                .arg(user_key(user_id))
                .arg("venue_id")
                .arg("checkin_ts")
                .query_async(&mut conn)
                .await?;

            let record = record_from_fields(user_id, venue_id, checkin_ts)?;
            Ok(record.filter(|r| r.checkin_ts > fresh_after))
        })
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        let cursor = RedisVenueCursor {
            conn: self.conn.clone(),
            key: venue_key(&query.venue_id),
            keyset: Keyset::new(query.fresh_after),
            venue_id: query.venue_id,
        };
        Box::pin(async move { Ok(Box::new(cursor) as Box<dyn VenueCursor>) })
    }
}

/// Walks the venue's sorted set in `(score, member)` order, resuming after
/// the last entry examined. A user whose check-in moves them further along
/// the set is recognised and skipped.
struct RedisVenueCursor {
    conn: MultiplexedConnection,
    key: String,
    venue_id: String,
    keyset: Keyset,
}

impl VenueCursor for RedisVenueCursor {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>> {
        Box::pin(async move {
            let mut found = Vec::with_capacity(max);
            while found.len() < max {
                let Some((min_score, fetch)) = self.keyset.next_query(max - found.len()) else {
                    break;
                };
                let count = isize::try_from(fetch).unwrap_or(isize::MAX);
                let page: Vec<(String, f64)> = self
                    .conn
                    .zrangebyscore_limit_withscores(&self.key, &min_score, "+inf", 0, count)
                    .await?;
                let page = page
                    .into_iter()
                    .map(|(user_id, score)| (user_id, score as i64))
                    .collect();
                self.keyset.absorb(page, fetch, max, &mut found);
            }

            Ok(found
                .into_iter()
                .map(|(user_id, checkin_ts)| LocationRecord {
                    user_id,
                    venue_id: self.venue_id.clone(),
                    checkin_ts,
                })
                .collect())
        })
    }
}

/// Keyset position over a sorted set plus the members already handed out.
///
/// Pages are always read from the score of the last examined entry
/// (inclusive), so entries tied at that score come back at the head of the
/// page and are skipped by comparing `(score, member)`.
#[derive(Debug)]
struct Keyset {
    fresh_after: i64,
    last: Option<(i64, String)>,
    /// Examined entries sharing `last`'s score.
    behind: usize,
    /// Over-fetch added after a full page made no progress.
    slack: usize,
    seen: HashSet<String>,
    done: bool,
}

impl Keyset {
    fn new(fresh_after: i64) -> Self {
        Self {
            fresh_after,
            last: None,
            behind: 0,
            slack: 0,
            seen: HashSet::new(),
            done: false,
        }
    }

    /// Lower score bound and page size for the next read, `None` once the
    /// set is exhausted.
    fn next_query(&self, need: usize) -> Option<(String, usize)> {
        if self.done {
            return None;
        }
        let min_score = match &self.last {
            Some((score, _)) => score.to_string(),
            None => format!("({}", self.fresh_after),
        };
        Some((min_score, need + self.behind + self.slack))
    }

    fn absorb(&mut self, page: Vec<(String, i64)>, fetched: usize, max: usize, found: &mut Vec<(String, i64)>) {
        let full = page.len() >= fetched;
        let mut advanced = false;

        for (member, score) in page {
            if let Some((last_score, last_member)) = &self.last {
                if (score, member.as_str()) <= (*last_score, last_member.as_str()) {
                    continue;
                }
            }
            advanced = true;
            self.behind = match &self.last {
                Some((last_score, _)) if *last_score == score => self.behind + 1,
                _ => 1,
            };
            self.last = Some((score, member.clone()));

            if self.seen.insert(member.clone()) {
                found.push((member, score));
                if found.len() >= max {
                    return;
                }
            }
        }

        if !full {
            self.done = true;
        } else if advanced {
            self.slack = 0;
        } else {
            self.slack += fetched;
        }
    }
}
