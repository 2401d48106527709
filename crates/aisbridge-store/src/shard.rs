//! Shard naming and UTC day arithmetic.
//!
//! One SQLite file per UTC calendar day, named `<prefix>-YYYY-MM-DD.db`. A
//! shard for day D only ever holds rows whose timestamp falls within
//! [D 00:00, D+1 00:00) UTC.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OpenFlags};

/// Row schema shared by every shard. `utc` is the epoch-millisecond event
/// time and the only ordering key.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tbl_ais (
    id         TEXT PRIMARY KEY,
    mmsi       INTEGER NOT NULL,
    msg        INTEGER NOT NULL,
    content    TEXT NOT NULL,
    utc        INTEGER NOT NULL,
    ts         TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tbl_ais_utc ON tbl_ais(utc);
";

/// File name for the shard holding `day`.
pub fn shard_filename(prefix: &str, day: NaiveDate) -> String {
    format!("{prefix}-{}.db", day.format("%Y-%m-%d"))
}

/// Parse a directory entry back into its shard day. Returns `None` for
/// anything that does not match `<prefix>-YYYY-MM-DD.db`.
pub fn parse_shard_filename(prefix: &str, name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
    let date = rest.strip_suffix(".db")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// UTC calendar day a millisecond timestamp falls on.
pub fn day_of_ms(ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// All UTC days overlapping `[start_ms, end_ms]`, ascending. Empty when the
/// range is inverted or a bound is unrepresentable.
pub fn days_between(start_ms: i64, end_ms: i64) -> Vec<NaiveDate> {
    if start_ms > end_ms {
        return Vec::new();
    }
    let (Some(first), Some(last)) = (day_of_ms(start_ms), day_of_ms(end_ms)) else {
        return Vec::new();
    };
    let mut days = Vec::new();
    let mut day = first;
    while day <= last {
        days.push(day);
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    days
}

/// Full path of the shard for `day` under `dir`.
pub fn shard_path(dir: &Path, prefix: &str, day: NaiveDate) -> PathBuf {
    dir.join(shard_filename(prefix, day))
}

/// Open a shard read-only. The file must exist.
pub fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Open a shard for writing, creating the file and schema on first use.
pub fn open_or_create(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_deterministic() {
        let day = NaiveDate::from_ymd_opt(2025, 4, 21).unwrap();
        assert_eq!(shard_filename("ais", day), "ais-2025-04-21.db");
    }

    #[test]
    fn filename_parses_back() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let name = shard_filename("ais", day);
        assert_eq!(parse_shard_filename("ais", &name), Some(day));
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert_eq!(parse_shard_filename("ais", "log-2025-04-21.db"), None);
        assert_eq!(parse_shard_filename("ais", "ais-2025-04-21.db.bak"), None);
        assert_eq!(parse_shard_filename("ais", "ais-2025-13-41.db"), None);
        assert_eq!(parse_shard_filename("ais", "ais.db"), None);
    }

    #[test]
    fn day_of_ms_maps_to_utc_day() {
        // 2025-04-21 23:59:59.999 UTC
        let day = day_of_ms(1745279999999).unwrap();
        assert_eq!(day, NaiveDate::from_ymd_opt(2025, 4, 21).unwrap());
        // One millisecond later rolls the day over.
        let next = day_of_ms(1745280000000).unwrap();
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 4, 22).unwrap());
    }

    #[test]
    fn days_between_single_day() {
        let start = 1745193600000; // 2025-04-21 00:00 UTC
        let days = days_between(start, start + 3_600_000);
        assert_eq!(days.len(), 1);
    }

    #[test]
    fn days_between_spans_month_boundary() {
        // 2025-04-30 12:00 → 2025-05-02 12:00 UTC
        let days = days_between(1746014400000, 1746187200000);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
                NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn days_between_inverted_range_is_empty() {
        assert!(days_between(2_000, 1_000).is_empty());
    }
}
