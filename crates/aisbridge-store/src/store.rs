//! Append-only AIS history across day shards.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::shard;

/// One stored AIS position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisRecord {
    /// Row id.
    pub id: String,
    /// Event time, epoch milliseconds UTC. Primary ordering key.
    pub utc: i64,
    /// Protocol-formatted event time as emitted by the terminal.
    pub ts: String,
    /// Vessel MMSI.
    pub mmsi: i64,
    /// AIS message type.
    pub msg: i64,
    /// Decoded NMEA sentence.
    pub content: String,
    /// Insertion time, ISO8601.
    pub created_at: String,
}

impl AisRecord {
    /// Build a record for one decoded AIS frame.
    pub fn new(utc: i64, ts: impl Into<String>, mmsi: i64, msg: i64, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            utc,
            ts: ts.into(),
            mmsi,
            msg,
            content: content.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Timestamp ordering of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl QueryOrder {
    fn as_sql(self) -> &'static str {
        match self {
            QueryOrder::Asc => "ASC",
            QueryOrder::Desc => "DESC",
        }
    }
}

/// One page of a range query, plus the exact match count over the whole
/// range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// The requested page, in query order.
    pub rows: Vec<AisRecord>,
    /// Total matches across all shards, not just this page.
    pub total: u64,
}

/// Day-sharded store: one SQLite file per UTC day under a single directory.
///
/// Shards are created lazily on first append and never merged; pruning old
/// days is an external concern. Rows are immutable once written.
pub struct ShardedStore {
    dir: PathBuf,
    prefix: String,
}

impl ShardedStore {
    /// A store rooted at `dir`, shard files named `<prefix>-YYYY-MM-DD.db`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Append one record into the shard for its UTC day, creating the shard
    /// file and schema on first use. Failures propagate to the writer.
    pub fn append(&self, record: &AisRecord) -> Result<()> {
        let day = shard::day_of_ms(record.utc).ok_or(StoreError::InvalidTimestamp(record.utc))?;
        std::fs::create_dir_all(&self.dir)?;
        let path = shard::shard_path(&self.dir, &self.prefix, day);
        let conn = shard::open_or_create(&path)?;
        conn.execute(
            "INSERT INTO tbl_ais (id, mmsi, msg, content, utc, ts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.id,
                record.mmsi,
                record.msg,
                record.content,
                record.utc,
                record.ts,
                record.created_at
            ],
        )?;
        Ok(())
    }

    /// Paginated range query across every shard overlapping
    /// `[start_ms, end_ms]` (bounds inclusive).
    ///
    /// Two passes: the first sums per-shard match counts into `total`, the
    /// second walks shards in `order` direction carrying the remaining
    /// offset and page budget, so a page may start partway through one shard
    /// and finish in the next. `total` is not a snapshot: appends racing the
    /// query can make it a stale undercount relative to `rows`.
    ///
    /// Shards that are missing, unreadable or corrupt contribute zero rows
    /// and never fail the query.
    pub fn query_range(
        &self,
        start_ms: i64,
        end_ms: i64,
        offset: u64,
        limit: u64,
        order: QueryOrder,
    ) -> Result<Page> {
        let mut days = shard::days_between(start_ms, end_ms);
        if order == QueryOrder::Desc {
            days.reverse();
        }

        let mut total = 0u64;
        for day in &days {
            total += self.count_shard(*day, start_ms, end_ms);
        }

        let mut rows = Vec::new();
        let mut skip = offset;
        let mut need = limit;
        for day in &days {
            if need == 0 {
                break;
            }
            let count = self.count_shard(*day, start_ms, end_ms);
            if count == 0 {
                continue;
            }
            if skip >= count {
                skip -= count;
                continue;
            }
            let fetched = self.fetch_shard(*day, start_ms, end_ms, skip, need, order);
            need -= fetched.len() as u64;
            rows.extend(fetched);
            skip = 0;
        }

        Ok(Page { rows, total })
    }

    /// The single oldest record across all shards, or `None` when no shard
    /// holds data.
    ///
    /// Historical shards are preferred over the current UTC day's shard:
    /// days that have rolled over are authoritative, while today's shard is
    /// still being appended to.
    pub fn earliest(&self) -> Result<Option<AisRecord>> {
        let mut days = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    shard::parse_shard_filename(&self.prefix, &entry.file_name().to_string_lossy())
                })
                .collect::<Vec<_>>(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        days.sort_unstable();

        let today = Utc::now().date_naive();
        for day in days.iter().filter(|day| **day != today) {
            if let Some(record) = self.first_row(*day) {
                return Ok(Some(record));
            }
        }
        if days.contains(&today) {
            if let Some(record) = self.first_row(today) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Matching rows in one shard, or 0 when the shard is absent or broken.
    fn count_shard(&self, day: chrono::NaiveDate, start_ms: i64, end_ms: i64) -> u64 {
        let path = shard::shard_path(&self.dir, &self.prefix, day);
        if !path.exists() {
            return 0;
        }
        let count = shard::open_read_only(&path).and_then(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM tbl_ais WHERE utc BETWEEN ?1 AND ?2",
                rusqlite::params![start_ms, end_ms],
                |row| row.get::<_, i64>(0),
            )
        });
        match count {
            Ok(count) => count as u64,
            Err(err) => {
                warn!(shard = %path.display(), error = %err, "shard unreadable, treated as empty");
                0
            }
        }
    }

    /// One shard's contribution to the page. Broken shards yield nothing.
    fn fetch_shard(
        &self,
        day: chrono::NaiveDate,
        start_ms: i64,
        end_ms: i64,
        skip: u64,
        need: u64,
        order: QueryOrder,
    ) -> Vec<AisRecord> {
        let path = shard::shard_path(&self.dir, &self.prefix, day);
        if !path.exists() {
            return Vec::new();
        }
        let fetched = shard::open_read_only(&path).and_then(|conn| {
            let sql = format!(
                "SELECT id, mmsi, msg, content, utc, ts, created_at
                   FROM tbl_ais
                  WHERE utc BETWEEN ?1 AND ?2
                  ORDER BY utc {}
                  LIMIT ?3 OFFSET ?4",
                order.as_sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![
                    start_ms,
                    end_ms,
                    i64::try_from(need).unwrap_or(i64::MAX),
                    i64::try_from(skip).unwrap_or(i64::MAX)
                ],
                row_to_record,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        });
        match fetched {
            Ok(rows) => rows,
            Err(err) => {
                warn!(shard = %path.display(), error = %err, "shard unreadable, treated as empty");
                Vec::new()
            }
        }
    }

    /// Oldest row of one shard, `None` when empty or unreadable.
    fn first_row(&self, day: chrono::NaiveDate) -> Option<AisRecord> {
        let path = shard::shard_path(&self.dir, &self.prefix, day);
        let row = shard::open_read_only(&path).and_then(|conn| {
            conn.query_row(
                "SELECT id, mmsi, msg, content, utc, ts, created_at
                   FROM tbl_ais ORDER BY utc ASC LIMIT 1",
                [],
                row_to_record,
            )
        });
        match row {
            Ok(record) => Some(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(err) => {
                debug!(shard = %path.display(), error = %err, "skipping unreadable shard");
                None
            }
        }
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AisRecord> {
    Ok(AisRecord {
        id: row.get(0)?,
        mmsi: row.get(1)?,
        msg: row.get(2)?,
        content: row.get(3)?,
        utc: row.get(4)?,
        ts: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY1: i64 = 1745193600000; // 2025-04-21 00:00 UTC
    const DAY2: i64 = DAY1 + 86_400_000;
    const DAY3: i64 = DAY2 + 86_400_000;

    fn record_at(utc: i64) -> AisRecord {
        AisRecord::new(utc, "2025-04-21_00:00:00.000", 412_000_001, 1, "!AIVDM,test")
    }

    fn seeded_store(dir: &TempDir, per_day: &[(i64, usize)]) -> ShardedStore {
        let store = ShardedStore::new(dir.path(), "ais");
        for (day_start, count) in per_day {
            for i in 0..*count {
                store.append(&record_at(day_start + (i as i64) * 1000)).unwrap();
            }
        }
        store
    }

    #[test]
    fn append_creates_the_day_shard() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        store.append(&record_at(DAY1 + 5000)).unwrap();
        assert!(dir.path().join("ais-2025-04-21.db").exists());
    }

    #[test]
    fn append_routes_rows_to_their_own_day() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY1, 1), (DAY2, 1)]);
        assert!(dir.path().join("ais-2025-04-21.db").exists());
        assert!(dir.path().join("ais-2025-04-22.db").exists());

        // Each shard only answers for its own day.
        let page = store
            .query_range(DAY1, DAY1 + 86_399_999, 0, 100, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn append_rejects_unrepresentable_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        let err = store.append(&record_at(i64::MIN)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestamp(_)));
    }

    #[test]
    fn full_range_returns_union_with_exact_total() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY1, 4), (DAY3, 6)]);

        let page = store
            .query_range(DAY1, DAY3 + 86_399_999, 0, 1_000, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.rows.len(), 10);
        let timestamps: Vec<i64> = page.rows.iter().map(|r| r.utc).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn descending_order_reverses_rows_across_shards() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY1, 3), (DAY2, 3)]);

        let page = store
            .query_range(DAY1, DAY2 + 86_399_999, 0, 100, QueryOrder::Desc)
            .unwrap();
        let timestamps: Vec<i64> = page.rows.iter().map(|r| r.utc).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(timestamps, sorted);
        assert_eq!(page.rows[0].utc, DAY2 + 2000);
    }

    #[test]
    fn offset_straddles_a_shard_boundary() {
        let dir = TempDir::new().unwrap();
        // Shard A: 5 rows, shard B: 5 rows. offset=7 must land at B's local
        // offset 2.
        let store = seeded_store(&dir, &[(DAY1, 5), (DAY2, 5)]);

        let page = store
            .query_range(DAY1, DAY2 + 86_399_999, 7, 3, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.rows.len(), 3);
        let timestamps: Vec<i64> = page.rows.iter().map(|r| r.utc).collect();
        assert_eq!(timestamps, vec![DAY2 + 2000, DAY2 + 3000, DAY2 + 4000]);
    }

    #[test]
    fn descending_offset_straddles_a_shard_boundary() {
        let dir = TempDir::new().unwrap();
        // Newest-first: offset=6 consumes all 5 of DAY2's rows plus DAY1's
        // newest row, so the page starts at DAY1's local offset 1.
        let store = seeded_store(&dir, &[(DAY1, 5), (DAY2, 5)]);

        let page = store
            .query_range(DAY1, DAY2 + 86_399_999, 6, 3, QueryOrder::Desc)
            .unwrap();
        assert_eq!(page.total, 10);
        let timestamps: Vec<i64> = page.rows.iter().map(|r| r.utc).collect();
        assert_eq!(timestamps, vec![DAY1 + 3000, DAY1 + 2000, DAY1 + 1000]);
    }

    #[test]
    fn empty_middle_day_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        // Day counts 4 / 0 / 6; offset skips exactly the first shard.
        let store = seeded_store(&dir, &[(DAY1, 4), (DAY3, 6)]);

        let page = store
            .query_range(DAY1, DAY3 + 86_399_999, 4, 6, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.rows.len(), 6);
        assert!(page.rows.iter().all(|r| r.utc >= DAY3));
    }

    #[test]
    fn limit_caps_the_page_size() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY1, 4), (DAY3, 6)]);

        let page = store
            .query_range(DAY1, DAY3 + 86_399_999, 4, 5, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.rows.len(), 5);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        store.append(&record_at(DAY1 + 1000)).unwrap();
        store.append(&record_at(DAY1 + 2000)).unwrap();
        store.append(&record_at(DAY1 + 3000)).unwrap();

        let page = store
            .query_range(DAY1 + 1000, DAY1 + 3000, 0, 10, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 3);
    }

    #[test]
    fn query_on_empty_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path().join("never-written"), "ais");
        let page = store
            .query_range(DAY1, DAY3, 0, 10, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn corrupt_shard_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY1, 3)]);
        std::fs::write(dir.path().join("ais-2025-04-22.db"), b"not a database").unwrap();

        let page = store
            .query_range(DAY1, DAY2 + 86_399_999, 0, 100, QueryOrder::Asc)
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 3);
    }

    #[test]
    fn earliest_prefers_historical_shards() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        // A historical row (fixed past day) and a row for the current day.
        store.append(&record_at(DAY1 + 500)).unwrap();
        let now_ms = Utc::now().timestamp_millis();
        store.append(&record_at(now_ms - 1_000_000)).unwrap();

        let earliest = store.earliest().unwrap().unwrap();
        assert_eq!(earliest.utc, DAY1 + 500);
    }

    #[test]
    fn earliest_falls_back_to_today() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        let now_ms = Utc::now().timestamp_millis();
        store.append(&record_at(now_ms)).unwrap();

        let earliest = store.earliest().unwrap().unwrap();
        assert_eq!(earliest.utc, now_ms);
    }

    #[test]
    fn earliest_skips_an_empty_historical_shard() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[(DAY2, 2)]);
        // An older shard that exists but holds no rows.
        let empty = shard::shard_path(dir.path(), "ais", shard::day_of_ms(DAY1).unwrap());
        shard::open_or_create(&empty).unwrap();

        let earliest = store.earliest().unwrap().unwrap();
        assert_eq!(earliest.utc, DAY2);
    }

    #[test]
    fn earliest_is_none_without_shards() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path().join("missing"), "ais");
        assert!(store.earliest().unwrap().is_none());
    }

    #[test]
    fn earliest_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = ShardedStore::new(dir.path(), "ais");
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        assert!(store.earliest().unwrap().is_none());
    }
}
