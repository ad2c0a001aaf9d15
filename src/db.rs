use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{EnrollmentRecord, UserRecord};
use crate::source;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Date columns take the leading `YYYY-MM-DD` of the stored string.
fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    let date = value.get(..10).unwrap_or(value);
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            if !value.is_empty() {
                tracing::warn!(value, "unparseable date stored as NULL");
            }
            None
        }
    }
}

async fn upsert_user(pool: &PgPool, user: &UserRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO enrollment_insights.users
        (email, country, organization, organization_type, registered_date)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET country = EXCLUDED.country,
            organization = EXCLUDED.organization,
            organization_type = EXCLUDED.organization_type,
            registered_date = EXCLUDED.registered_date
        "#,
    )
    .bind(&user.email)
    .bind(&user.country)
    .bind(&user.organization)
    .bind(&user.organization_type)
    .bind(parse_date(user.registered_date.as_deref()))
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_enrollment(
    pool: &PgPool,
    enrollment: &EnrollmentRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO enrollment_insights.enrollments
        (id, email, course_title, country, organization_type, started_on,
         is_completed, time_minutes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&enrollment.email)
    .bind(&enrollment.course_title)
    .bind(&enrollment.country)
    .bind(&enrollment.organization_type)
    .bind(parse_date(enrollment.started_on.as_deref()))
    .bind(enrollment.is_completed)
    .bind(enrollment.time_minutes)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Identical rows within one import get increasing suffixes, so re-running
/// the same import inserts nothing new.
fn source_keys(enrollments: &[EnrollmentRecord]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    enrollments
        .iter()
        .map(|e| {
            let base = format!(
                "{}|{}|{}",
                e.email,
                e.course_title.as_deref().unwrap_or_default(),
                e.started_on.as_deref().unwrap_or_default()
            );
            let occurrence = seen.entry(base.clone()).or_insert(0);
            *occurrence += 1;
            format!("{base}|{occurrence}")
        })
        .collect()
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        ("lucia.gomez@example.org", "Argentina", "Huerta Viva", "NGO", "2024-01-15"),
        ("mateo.rios@example.org", "Argentina", "Huerta Viva", "NGO", "2024-02-03"),
        ("ana.silva@example.org", "Brazil", "Escola Verde", "School", "2024-02-20"),
        ("diego.paz@example.org", "Chile", "", "", "2024-03-11"),
    ];

    for (email, country, organization, organization_type, registered) in users {
        let blank = |value: &str| (!value.is_empty()).then(|| value.to_string());
        upsert_user(
            pool,
            &UserRecord {
                email: email.to_string(),
                country: Some(country.to_string()),
                organization: blank(organization),
                organization_type: blank(organization_type),
                registered_date: Some(registered.to_string()),
            },
        )
        .await?;
    }

    let enrollments = vec![
        (
            "lucia.gomez@example.org",
            "Composting Basics",
            "Argentina",
            "NGO",
            "2024-01-20",
            true,
            Some(95.0),
        ),
        (
            "lucia.gomez@example.org",
            "Seed Saving",
            "Argentina",
            "NGO",
            "2024-03-02",
            false,
            Some(20.0),
        ),
        (
            "lucia.gomez@example.org",
            "Water Harvesting",
            "Argentina",
            "NGO",
            "2024-04-18",
            true,
            None,
        ),
        (
            "mateo.rios@example.org",
            "Composting Basics",
            "Argentina",
            "NGO",
            "2024-02-05",
            false,
            Some(12.0),
        ),
        (
            "ana.silva@example.org",
            "Composting Basics",
            "Brazil",
            "School",
            "2024-02-25",
            true,
            Some(70.0),
        ),
        (
            "ana.silva@example.org",
            "Seed Saving",
            "Brazil",
            "School",
            "2024-03-30",
            true,
            Some(48.0),
        ),
    ];

    let records: Vec<EnrollmentRecord> = enrollments
        .into_iter()
        .map(
            |(email, title, country, organization_type, started_on, is_completed, time_minutes)| {
                EnrollmentRecord {
                    email: email.to_string(),
                    course_title: Some(title.to_string()),
                    country: Some(country.to_string()),
                    organization_type: Some(organization_type.to_string()),
                    started_on: Some(started_on.to_string()),
                    is_completed,
                    time_minutes,
                }
            },
        )
        .collect();

    for (record, key) in records.iter().zip(source_keys(&records)) {
        insert_enrollment(pool, record, &format!("seed|{key}")).await?;
    }

    Ok(())
}

pub async fn import_users(pool: &PgPool, path: &std::path::Path) -> anyhow::Result<usize> {
    let users = source::load_users(path)
        .with_context(|| format!("failed to read users from {}", path.display()))?;

    let mut imported = 0usize;
    for user in users.iter().filter(|u| !u.email.is_empty()) {
        upsert_user(pool, user).await?;
        imported += 1;
    }

    if imported < users.len() {
        tracing::warn!(skipped = users.len() - imported, "users without email skipped");
    }
    Ok(imported)
}

pub async fn import_enrollments(pool: &PgPool, path: &std::path::Path) -> anyhow::Result<usize> {
    let enrollments = source::load_enrollments(path)
        .with_context(|| format!("failed to read enrollments from {}", path.display()))?;

    let mut inserted = 0usize;
    for (enrollment, key) in enrollments.iter().zip(source_keys(&enrollments)) {
        if insert_enrollment(pool, enrollment, &format!("import|{key}")).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_users(pool: &PgPool) -> anyhow::Result<Vec<UserRecord>> {
    let rows = sqlx::query(
        "SELECT email, country, organization, organization_type, registered_date \
         FROM enrollment_insights.users ORDER BY email",
    )
    .fetch_all(pool)
    .await?;

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let registered: Option<NaiveDate> = row.get("registered_date");
        users.push(UserRecord {
            email: row.get("email"),
            country: row.get("country"),
            organization: row.get("organization"),
            organization_type: row.get("organization_type"),
            registered_date: registered.map(|date| date.to_string()),
        });
    }

    Ok(users)
}

pub async fn fetch_enrollments(pool: &PgPool) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let rows = sqlx::query(
        "SELECT email, course_title, country, organization_type, started_on, \
         is_completed, time_minutes \
         FROM enrollment_insights.enrollments ORDER BY source_key",
    )
    .fetch_all(pool)
    .await?;

    let mut enrollments = Vec::with_capacity(rows.len());
    for row in rows {
        let started_on: Option<NaiveDate> = row.get("started_on");
        enrollments.push(EnrollmentRecord {
            email: row.get("email"),
            course_title: row.get("course_title"),
            country: row.get("country"),
            organization_type: row.get("organization_type"),
            started_on: started_on.map(|date| date.to_string()),
            is_completed: row.get("is_completed"),
            time_minutes: row.get("time_minutes"),
        });
    }

    Ok(enrollments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_keep_the_day_prefix() {
        assert_eq!(
            parse_date(Some("2024-03-01T08:00:00Z")),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date(Some("2024-03-01")), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date(Some("soon")), None);
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn duplicate_rows_get_distinct_source_keys() {
        let row = EnrollmentRecord {
            email: "a@x.org".to_string(),
            course_title: Some("Intro".to_string()),
            started_on: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let keys = source_keys(&[row.clone(), row]);
        assert_eq!(keys, vec!["a@x.org|Intro|2024-01-01|1", "a@x.org|Intro|2024-01-01|2"]);
    }
}
