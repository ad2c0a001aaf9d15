use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::models::{EnrollmentRecord, HeadlineMetrics, RecurrenceDistribution, UserRecord};

pub const ACTIVE_WINDOW_DAYS: i64 = 30;

impl HeadlineMetrics {
    /// Dashboard headline figures. `now` anchors the active-user window.
    pub fn compute(
        users: &[UserRecord],
        enrollments: &[EnrollmentRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let total_enrollments = enrollments.len();
        let active_since = now - Duration::days(ACTIVE_WINDOW_DAYS);

        let mut completed_courses = 0;
        let mut per_user: HashMap<&str, usize> = HashMap::new();
        let mut active: HashSet<&str> = HashSet::new();
        let mut finishers: HashSet<&str> = HashSet::new();
        let mut timed = 0usize;
        let mut total_minutes = 0.0f64;

        for enrollment in enrollments {
            let email = enrollment.email.as_str();
            *per_user.entry(email).or_insert(0) += 1;

            if enrollment.is_completed {
                completed_courses += 1;
                finishers.insert(email);
            }

            let started = enrollment.started_on.as_deref().and_then(parse_timestamp);
            if started.is_some_and(|started| started >= active_since) {
                active.insert(email);
            }

            if let Some(minutes) = enrollment.time_minutes {
                timed += 1;
                total_minutes += minutes;
            }
        }

        let mut recurrence = RecurrenceDistribution::default();
        for count in per_user.values() {
            recurrence.record(*count);
        }

        let unique_users_with_courses = per_user.len();
        let avg_time_minutes = if timed == 0 {
            0
        } else {
            (total_minutes / timed as f64).round() as u64
        };

        Self {
            total_users: users.len(),
            total_enrollments,
            completed_courses,
            completion_rate: percentage(completed_courses, total_enrollments),
            active_users: active.len(),
            users_with_completed_courses: finishers.len(),
            unique_users_with_courses,
            avg_courses_per_user: ratio(total_enrollments, unique_users_with_courses),
            recurrence,
            avg_time_minutes,
            avg_time_on_course: format_minutes(avg_time_minutes),
            total_time_hours: (total_minutes / 60.0).round() as u64,
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percentage with one decimal; zero when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_tenth(part as f64 / whole as f64 * 100.0)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_tenth(numerator as f64 / denominator as f64)
}

/// `"1h 5m"` from 60 minutes up, `"45m"` below.
pub fn format_minutes(minutes: u64) -> String {
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

/// Reads an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` timestamp
/// (taken as UTC), or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(timestamp.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|timestamp| timestamp.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn enrollment(
        email: &str,
        started_on: &str,
        completed: bool,
        minutes: Option<f64>,
    ) -> EnrollmentRecord {
        EnrollmentRecord {
            email: email.to_string(),
            started_on: Some(started_on.to_string()),
            is_completed: completed,
            time_minutes: minutes,
            ..Default::default()
        }
    }

    #[test]
    fn formats_minutes_and_hours() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(59), "59m");
        assert_eq!(format_minutes(60), "1h 0m");
        assert_eq!(format_minutes(135), "2h 15m");
    }

    #[test]
    fn parses_dates_and_timestamps() {
        let date = parse_timestamp("2024-06-01").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let offset = parse_timestamp("2024-06-01T10:00:00+02:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
        let naive = parse_timestamp("2024-06-01T10:00:00").unwrap();
        assert_eq!(naive, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        assert!(parse_timestamp("June").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn empty_inputs_produce_zeroes() {
        let metrics = HeadlineMetrics::compute(&[], &[], reference_time());
        assert_eq!(metrics.total_users, 0);
        assert_eq!(metrics.completion_rate, 0.0);
        assert_eq!(metrics.avg_courses_per_user, 0.0);
        assert_eq!(metrics.avg_time_on_course, "0m");
        assert_eq!(metrics.recurrence, RecurrenceDistribution::default());
    }

    #[test]
    fn computes_headline_figures() {
        let users = vec![UserRecord::default(), UserRecord::default()];
        let enrollments = vec![
            enrollment("a", "2024-06-25", true, Some(30.0)),
            enrollment("a", "2024-01-10", false, None),
            enrollment("b", "2024-05-31T12:00:00Z", false, Some(95.0)),
            enrollment("c", "2024-05-31T11:59:59Z", true, None),
            enrollment("c", "not a date", false, None),
            enrollment("c", "2024-02-01", false, None),
        ];

        let metrics = HeadlineMetrics::compute(&users, &enrollments, reference_time());
        assert_eq!(metrics.total_users, 2);
        assert_eq!(metrics.total_enrollments, 6);
        assert_eq!(metrics.completed_courses, 2);
        assert_eq!(metrics.completion_rate, 33.3);
        assert_eq!(metrics.active_users, 2);
        assert_eq!(metrics.users_with_completed_courses, 2);
        assert_eq!(metrics.unique_users_with_courses, 3);
        assert_eq!(metrics.avg_courses_per_user, 2.0);
        assert_eq!(
            metrics.recurrence,
            RecurrenceDistribution {
                one_course: 1,
                two_courses: 1,
                three_plus: 1,
            }
        );
        assert_eq!(metrics.avg_time_minutes, 63);
        assert_eq!(metrics.avg_time_on_course, "1h 3m");
        assert_eq!(metrics.total_time_hours, 2);
    }

    #[test]
    fn active_window_moves_with_reference_time() {
        let enrollments = vec![enrollment("a", "2024-06-25", false, None)];
        let later = reference_time() + Duration::days(60);
        assert_eq!(HeadlineMetrics::compute(&[], &enrollments, reference_time()).active_users, 1);
        assert_eq!(HeadlineMetrics::compute(&[], &enrollments, later).active_users, 0);
    }

    #[test]
    fn enrollments_starting_after_now_count_as_active() {
        let enrollments = vec![enrollment("a", "2024-07-15", false, None)];
        let metrics = HeadlineMetrics::compute(&[], &enrollments, reference_time());
        assert_eq!(metrics.active_users, 1);
    }
}
