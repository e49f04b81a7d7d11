use crate::error::DispatchError;
use crate::model::{IncidentType, Priority, Status};
use crate::store::{IncidentStore, Tally, TimeWindow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Today,
    Week,
    Month,
}

impl FromStr for Period {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(DispatchError::validation(
                "period",
                format!("expected today, week or month, got '{other}'"),
            )),
        }
    }
}

pub fn window(period: Period, now: DateTime<Utc>) -> TimeWindow {
    let start = match period {
        Period::Today => now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now),
        Period::Week => now - Duration::days(7),
        Period::Month => now - Duration::days(30),
    };
    TimeWindow { start, end: now }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub period: Period,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total: u64,
    /// Everything not yet Resolved or Closed.
    pub active: u64,
    pub by_status: BTreeMap<Status, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
    pub by_type: BTreeMap<IncidentType, u64>,
    pub average_resolution_minutes: Option<f64>,
}

/// Folds store counts into zero-filled buckets.
pub fn summarize(period: Period, window: TimeWindow, tally: &Tally) -> Snapshot {
    let mut by_status: BTreeMap<Status, u64> = Status::ALL.iter().map(|s| (*s, 0)).collect();
    let mut by_priority: BTreeMap<Priority, u64> = Priority::ALL.iter().map(|p| (*p, 0)).collect();
    let mut by_type: BTreeMap<IncidentType, u64> =
        IncidentType::ALL.iter().map(|t| (*t, 0)).collect();

    let mut total = 0;
    let mut active = 0;
    for row in &tally.rows {
        total += row.count;
        if !row.status.is_finished() {
            active += row.count;
        }
        *by_status.entry(row.status).or_default() += row.count;
        *by_priority.entry(row.priority).or_default() += row.count;
        *by_type.entry(row.incident_type).or_default() += row.count;
    }

    Snapshot {
        period,
        window_start: window.start,
        window_end: window.end,
        total,
        active,
        by_status,
        by_priority,
        by_type,
        average_resolution_minutes: tally.mean_completion_ms.map(|ms| ms / 60_000.0),
    }
}

pub fn aggregate(
    store: &impl IncidentStore,
    period: Period,
    now: DateTime<Utc>,
) -> Result<Snapshot, DispatchError> {
    let window = window(period, now);
    let tally = store.tally(&window)?;
    Ok(summarize(period, window, &tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, TallyRow};
    use crate::test_support::{db_path, sample_incident};
    use chrono::TimeZone;

    #[test]
    fn windows_end_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        assert_eq!(
            window(Period::Today, now).start,
            Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window(Period::Week, now).start,
            Utc.with_ymd_and_hms(2024, 5, 3, 15, 30, 0).unwrap()
        );
        assert_eq!(
            window(Period::Month, now).start,
            Utc.with_ymd_and_hms(2024, 4, 10, 15, 30, 0).unwrap()
        );
        assert_eq!(window(Period::Month, now).end, now);
    }

    #[test]
    fn rejects_unknown_period() {
        assert!(matches!(
            "year".parse::<Period>(),
            Err(DispatchError::Validation(errors)) if errors[0].field == "period"
        ));
    }

    #[test]
    fn empty_store_yields_zeroed_buckets() {
        let store = SqliteStore::open(db_path("stats-empty")).expect("open");
        let snapshot = aggregate(&store, Period::Week, Utc::now()).expect("stats");
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.by_status.len(), Status::ALL.len());
        assert!(snapshot.by_status.values().all(|v| *v == 0));
        assert!(snapshot.by_priority.values().all(|v| *v == 0));
        assert_eq!(snapshot.by_type.len(), IncidentType::ALL.len());
        assert_eq!(snapshot.average_resolution_minutes, None);
    }

    #[test]
    fn summarize_counts_each_dimension() {
        let now = Utc::now();
        let tally = Tally {
            rows: vec![
                TallyRow {
                    status: Status::Reported,
                    priority: Priority::High,
                    incident_type: IncidentType::Human,
                    count: 2,
                },
                TallyRow {
                    status: Status::Resolved,
                    priority: Priority::High,
                    incident_type: IncidentType::Animal,
                    count: 3,
                },
            ],
            mean_completion_ms: Some(90_000.0),
        };
        let snapshot = summarize(Period::Today, window(Period::Today, now), &tally);
        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.active, 2);
        assert_eq!(snapshot.by_status[&Status::Resolved], 3);
        assert_eq!(snapshot.by_priority[&Priority::High], 5);
        assert_eq!(snapshot.by_priority[&Priority::Low], 0);
        assert_eq!(snapshot.by_type[&IncidentType::Animal], 3);
        assert_eq!(snapshot.average_resolution_minutes, Some(1.5));
    }

    #[test]
    fn aggregate_reads_only_the_window() {
        let store = SqliteStore::open(db_path("stats-window")).expect("open");
        let now = Utc::now();
        let mut fresh = sample_incident(IncidentType::Equipment);
        fresh.created_at = now - Duration::days(2);
        store.insert(&fresh, &[]).expect("insert");
        let mut stale = sample_incident(IncidentType::Equipment);
        stale.created_at = now - Duration::days(20);
        store.insert(&stale, &[]).expect("insert");

        let week = aggregate(&store, Period::Week, now).expect("week");
        let month = aggregate(&store, Period::Month, now).expect("month");
        assert_eq!(week.total, 1);
        assert_eq!(month.total, 2);
        assert_eq!(month.by_type[&IncidentType::Equipment], 2);
    }

    #[test]
    fn snapshot_serializes_bucket_names() {
        let snapshot = summarize(Period::Month, window(Period::Month, Utc::now()), &Tally::default());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["period"], "month");
        assert_eq!(value["byStatus"]["InProgress"], 0);
        assert_eq!(value["byType"]["NaturalDisaster"], 0);
    }
}
