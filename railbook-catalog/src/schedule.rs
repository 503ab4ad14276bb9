use chrono::{DateTime, Duration, Utc};

use crate::network::Route;

/// The occupation window a trip claims on its train: departure through
/// arrival plus the turnaround before the train can run again.
pub fn trip_window(route: &Route, departure: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = departure + Duration::minutes(route.duration_minutes + route.turnaround_minutes);
    (departure, end)
}

/// Interval-overlap check used by the trip-scheduling guard: a train cannot
/// run two trips whose windows intersect. Same technique as ticket-segment
/// overlap, applied to time instead of stop indices.
pub fn windows_overlap(
    a: (DateTime<Utc>, DateTime<Utc>),
    b: (DateTime<Utc>, DateTime<Utc>),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// True when a candidate (route, departure) would collide with any of the
/// train's existing trip windows.
pub fn schedule_conflict(
    existing: &[(DateTime<Utc>, DateTime<Utc>)],
    route: &Route,
    departure: DateTime<Utc>,
) -> bool {
    let candidate = trip_window(route, departure);
    existing.iter().any(|w| windows_overlap(*w, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn route(duration: i64, turnaround: i64) -> Route {
        Route {
            id: Uuid::new_v4(),
            name: "SG-HN".into(),
            per_km_rate: 1000.0,
            station_fee: 10_000,
            duration_minutes: duration,
            turnaround_minutes: turnaround,
            stops: vec![],
        }
    }

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn window_includes_turnaround() {
        let r = route(120, 30);
        let (start, end) = trip_window(&r, at(8));
        assert_eq!(start, at(8));
        assert_eq!(end, at(10) + chrono::Duration::minutes(30));
    }

    #[test]
    fn detects_overlapping_trips() {
        let r = route(120, 30);
        let existing = vec![trip_window(&r, at(8))]; // 08:00 - 10:30
        assert!(schedule_conflict(&existing, &r, at(9)));
        assert!(schedule_conflict(&existing, &r, at(10)));
        // A departure exactly at the window end is allowed.
        assert!(!schedule_conflict(
            &existing,
            &r,
            at(10) + chrono::Duration::minutes(30)
        ));
        // A trip that ends exactly at an existing departure is allowed.
        assert!(!schedule_conflict(
            &existing,
            &r,
            at(8) - chrono::Duration::minutes(150)
        ));
    }
}
