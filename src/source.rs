use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::filter::Dataset;
use crate::models::{EnrollmentRecord, UserRecord};

pub const USERS_STEM: &str = "users";
pub const ENROLLMENTS_STEM: &str = "courses";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("CSV parse error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("No {0}.json or {0}.csv found in {1}")]
    Missing(&'static str, PathBuf),

    #[error("Unsupported data file format: {0}")]
    UnsupportedFormat(PathBuf),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Reads a record collection from a `.json` array or a `.csv` file with a
/// header row. Absent columns and fields fall back to their defaults.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => {
            let raw = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| SourceError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("csv") => {
            let csv_error = |source| SourceError::Csv {
                path: path.to_path_buf(),
                source,
            };
            let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
            let mut records = Vec::new();
            for row in reader.deserialize::<T>() {
                records.push(row.map_err(csv_error)?);
            }
            Ok(records)
        }
        _ => Err(SourceError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn locate(dir: &Path, stem: &'static str) -> Result<PathBuf> {
    ["json", "csv"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
        .ok_or_else(|| SourceError::Missing(stem, dir.to_path_buf()))
}

pub fn load_users(path: &Path) -> Result<Vec<UserRecord>> {
    let users: Vec<UserRecord> = read_records(path)?;
    tracing::debug!(path = %path.display(), count = users.len(), "users read");
    Ok(users)
}

pub fn load_enrollments(path: &Path) -> Result<Vec<EnrollmentRecord>> {
    let enrollments: Vec<EnrollmentRecord> = read_records(path)?;
    let untitled = enrollments
        .iter()
        .filter(|e| e.course_title.as_deref().map_or(true, |t| t.trim().is_empty()))
        .count();
    if untitled > 0 {
        tracing::warn!(
            path = %path.display(),
            untitled,
            "enrollments without a course title are left out of course rankings"
        );
    }
    tracing::debug!(path = %path.display(), count = enrollments.len(), "enrollments read");
    Ok(enrollments)
}

/// Loads `users.{json,csv}` and `courses.{json,csv}` from `dir`.
pub fn load_dir(dir: &Path) -> Result<Dataset> {
    let users = load_users(&locate(dir, USERS_STEM)?)?;
    let enrollments = load_enrollments(&locate(dir, ENROLLMENTS_STEM)?)?;
    Ok(Dataset::new(users, enrollments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"[
                {"email": "a@x.org", "country": "AR", "organization": "Acme",
                 "organization_type": "NGO", "registered_date": "2024-01-03"},
                {"email": "b@x.org", "country": null}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("courses.json"),
            r#"[
                {"email": "a@x.org", "course_title": "Intro", "started_on": "2024-02-01",
                 "is_completed": true, "time_minutes": 42},
                {"email": "b@x.org"}
            ]"#,
        )
        .unwrap();

        let dataset = load_dir(dir.path()).unwrap();
        assert_eq!(dataset.users().len(), 2);
        assert_eq!(dataset.users()[1].country, None);
        assert_eq!(dataset.enrollments()[0].time_minutes, Some(42.0));
        assert!(!dataset.enrollments()[1].is_completed);
    }

    #[test]
    fn loads_csv_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.csv");
        std::fs::write(
            &path,
            "email,course_title,country,organization_type,started_on,is_completed,time_minutes\n\
             a@x.org,Intro,AR,NGO,2024-02-01,true,15\n\
             b@x.org,,,,,false,\n",
        )
        .unwrap();

        let enrollments = load_enrollments(&path).unwrap();
        assert_eq!(enrollments.len(), 2);
        assert_eq!(enrollments[0].time_minutes, Some(15.0));
        assert_eq!(enrollments[1].course_title, None);
        assert_eq!(enrollments[1].time_minutes, None);
    }

    #[test]
    fn null_email_and_completion_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.json");
        std::fs::write(
            &path,
            r#"[
                {"email": "a@x.org", "course_title": "Intro", "is_completed": null},
                {"email": null, "course_title": "Intro", "is_completed": true},
                {"email": "b@x.org", "is_completed": false}
            ]"#,
        )
        .unwrap();

        let enrollments = load_enrollments(&path).unwrap();
        assert_eq!(enrollments.len(), 3);
        assert!(!enrollments[0].is_completed);
        assert_eq!(enrollments[1].email, "");
        assert!(enrollments[1].is_completed);

        let users_path = dir.path().join("users.json");
        std::fs::write(&users_path, r#"[{"email": null, "country": "AR"}]"#).unwrap();
        let users = load_users(&users_path).unwrap();
        assert_eq!(users[0].email, "");
        assert_eq!(users[0].country.as_deref(), Some("AR"));
    }

    #[test]
    fn empty_csv_bool_cell_reads_as_not_completed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.csv");
        std::fs::write(
            &path,
            "email,course_title,is_completed\n\
             a@x.org,Intro,\n\
             ,Intro,true\n",
        )
        .unwrap();

        let enrollments = load_enrollments(&path).unwrap();
        assert_eq!(enrollments.len(), 2);
        assert!(!enrollments[0].is_completed);
        assert_eq!(enrollments[1].email, "");
        assert!(enrollments[1].is_completed);
    }

    #[test]
    fn reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::Missing(USERS_STEM, _)));
    }

    #[test]
    fn bundled_sample_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let dataset = load_dir(&dir).unwrap();
        assert_eq!(dataset.users().len(), 5);
        assert_eq!(dataset.enrollments().len(), 7);
        assert_eq!(dataset.countries(), vec!["all", "Argentina", "Brazil", "Chile"]);
        assert_eq!(dataset.organization_types(), vec!["all", "NGO", "School"]);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = read_records::<UserRecord>(Path::new("users.xlsx")).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(_)));
    }
}
