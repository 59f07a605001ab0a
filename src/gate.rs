//! Cooldown gate: decides whether a request may trigger a new pipeline run.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::AppError;
use crate::sheets::{write_sheet, SheetStore, ValueInput, METADATA_SHEET};

pub const METADATA_HEADER: [&str; 2] = ["Last Run (UTC)", "Last Summary"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Last successful run as persisted in the metadata sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    pub last_run: Option<DateTime<Utc>>,
    pub last_summary: String,
}

impl RunMetadata {
    /// Read the single metadata row. A missing sheet, an empty sheet or an
    /// unparseable timestamp all yield `last_run: None`.
    pub async fn load(store: &dyn SheetStore) -> Result<Self, AppError> {
        let Some(table) = store.read_table(METADATA_SHEET).await? else {
            return Ok(RunMetadata::default());
        };
        let Some(row) = table.rows.first() else {
            return Ok(RunMetadata::default());
        };

        let raw = table.cell(row, METADATA_HEADER[0]);
        let last_run = parse_timestamp(raw);
        if last_run.is_none() && !raw.is_empty() {
            tracing::warn!("Ignoring unparseable last run timestamp '{}'", raw);
        }
        Ok(RunMetadata {
            last_run,
            last_summary: table.cell(row, METADATA_HEADER[1]).to_string(),
        })
    }

    /// Overwrite the metadata sheet with this run. Written RAW so the
    /// timestamp and summary read back exactly as stored.
    pub async fn save(&self, store: &dyn SheetStore) -> Result<(), AppError> {
        let stamp = self.last_run.map(format_timestamp).unwrap_or_default();
        write_sheet(
            store,
            METADATA_SHEET,
            &METADATA_HEADER,
            vec![vec![stamp, self.last_summary.clone()]],
            ValueInput::Raw,
        )
        .await
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Ready,
    Cooling {
        summary: String,
        remaining_hours: f64,
        last_run: DateTime<Utc>,
    },
}

/// Hours since `last_run`; a timestamp in the future counts as zero.
pub fn elapsed_hours(last_run: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - last_run).num_milliseconds() as f64 / 1000.0;
    (secs / 3600.0).max(0.0)
}

pub fn check(metadata: &RunMetadata, now: DateTime<Utc>, cooldown_hours: f64) -> GateState {
    let Some(last_run) = metadata.last_run else {
        return GateState::Ready;
    };
    let elapsed = elapsed_hours(last_run, now);
    if elapsed < cooldown_hours {
        GateState::Cooling {
            summary: metadata.last_summary.clone(),
            remaining_hours: cooldown_hours - elapsed,
            last_run,
        }
    } else {
        GateState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::MemorySheetStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn two_hours_ago_is_cooling() {
        let meta = RunMetadata {
            last_run: Some(now() - Duration::hours(2)),
            last_summary: "old".into(),
        };
        match check(&meta, now(), 3.0) {
            GateState::Cooling { summary, remaining_hours, .. } => {
                assert_eq!(summary, "old");
                assert!(remaining_hours > 0.0);
                assert!((remaining_hours - 1.0).abs() < 1e-9);
            }
            other => panic!("expected cooling, got {:?}", other),
        }
    }

    #[test]
    fn four_hours_ago_and_missing_are_ready() {
        let meta = RunMetadata {
            last_run: Some(now() - Duration::hours(4)),
            last_summary: "old".into(),
        };
        assert_eq!(check(&meta, now(), 3.0), GateState::Ready);
        assert_eq!(check(&RunMetadata::default(), now(), 3.0), GateState::Ready);
        // exactly at the boundary
        let meta = RunMetadata { last_run: Some(now() - Duration::hours(3)), ..meta };
        assert_eq!(check(&meta, now(), 3.0), GateState::Ready);
    }

    #[test]
    fn future_timestamp_counts_as_just_ran() {
        let meta = RunMetadata {
            last_run: Some(now() + Duration::hours(5)),
            last_summary: "s".into(),
        };
        match check(&meta, now(), 3.0) {
            GateState::Cooling { remaining_hours, .. } => assert_eq!(remaining_hours, 3.0),
            other => panic!("expected cooling, got {:?}", other),
        }
    }

    #[test]
    fn zero_cooldown_is_always_ready() {
        let meta = RunMetadata { last_run: Some(now()), last_summary: "s".into() };
        assert_eq!(check(&meta, now(), 0.0), GateState::Ready);
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = MemorySheetStore::new();
        assert_eq!(RunMetadata::load(&store).await.unwrap(), RunMetadata::default());

        let meta = RunMetadata { last_run: Some(now()), last_summary: "briefing".into() };
        meta.save(&store).await.unwrap();

        let table = store.read_table(METADATA_SHEET).await.unwrap().unwrap();
        assert_eq!(table.rows[0][0], "2025-03-04 12:00:00");
        assert_eq!(store.last_value_input(METADATA_SHEET).await, Some(ValueInput::Raw));
        assert_eq!(RunMetadata::load(&store).await.unwrap(), meta);
    }

    #[tokio::test]
    async fn garbage_timestamp_reads_as_never_run() {
        let store = MemorySheetStore::new();
        write_sheet(
            &store,
            METADATA_SHEET,
            &METADATA_HEADER,
            vec![vec!["yesterday-ish".into(), "stale".into()]],
            ValueInput::Raw,
        )
        .await
        .unwrap();
        let meta = RunMetadata::load(&store).await.unwrap();
        assert!(meta.last_run.is_none());
        assert_eq!(check(&meta, now(), 3.0), GateState::Ready);
    }
}
