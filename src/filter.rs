use std::collections::BTreeSet;

use crate::models::{EnrollmentRecord, UserRecord};

/// Option value meaning "do not filter on this dimension".
pub const ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Country,
    OrganizationType,
}

/// Records that can be narrowed by a filter dimension.
pub trait Dimensioned {
    fn dimension(&self, dimension: Dimension) -> Option<&str>;
}

impl Dimensioned for UserRecord {
    fn dimension(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Country => self.country.as_deref(),
            Dimension::OrganizationType => self.organization_type.as_deref(),
        }
    }
}

impl Dimensioned for EnrollmentRecord {
    fn dimension(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Country => self.country.as_deref(),
            Dimension::OrganizationType => self.organization_type.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub country: Option<String>,
    pub organization_type: Option<String>,
}

impl Filters {
    pub fn new(country: Option<&str>, organization_type: Option<&str>) -> Self {
        Self {
            country: country.map(str::to_string),
            organization_type: organization_type.map(str::to_string),
        }
    }

    fn active(&self) -> impl Iterator<Item = (Dimension, &str)> {
        [
            (Dimension::Country, self.country.as_deref()),
            (Dimension::OrganizationType, self.organization_type.as_deref()),
        ]
        .into_iter()
        .filter_map(|(dimension, value)| match value {
            Some(value) if value != ALL => Some((dimension, value)),
            _ => None,
        })
    }

    pub fn is_unfiltered(&self) -> bool {
        self.active().next().is_none()
    }

    pub fn label(&self) -> String {
        if self.is_unfiltered() {
            return "all records".to_string();
        }
        let parts: Vec<String> = self
            .active()
            .map(|(dimension, value)| match dimension {
                Dimension::Country => format!("country {value}"),
                Dimension::OrganizationType => format!("organization type {value}"),
            })
            .collect();
        parts.join(", ")
    }
}

/// Keeps the records whose value on `dimension` equals `value`. `None` and
/// the `"all"` sentinel keep everything.
pub fn filter_by<T: Dimensioned + Clone>(
    records: &[T],
    dimension: Dimension,
    value: Option<&str>,
) -> Vec<T> {
    match value {
        None | Some(ALL) => records.to_vec(),
        Some(value) => records
            .iter()
            .filter(|record| record.dimension(dimension) == Some(value))
            .cloned()
            .collect(),
    }
}

pub fn apply_filters<T: Dimensioned + Clone>(records: &[T], filters: &Filters) -> Vec<T> {
    filters
        .active()
        .fold(records.to_vec(), |narrowed, (dimension, value)| {
            filter_by(&narrowed, dimension, Some(value))
        })
}

/// Sorted distinct non-empty values, prefixed with `"all"`. Sorting is
/// case-sensitive and byte-wise.
pub fn distinct_values<'a, T, F>(records: &'a [T], field: F) -> Vec<String>
where
    F: Fn(&'a T) -> Option<&'a str>,
{
    let values: BTreeSet<&str> = records
        .iter()
        .filter_map(field)
        .filter(|value| !value.is_empty())
        .collect();

    std::iter::once(ALL.to_string())
        .chain(values.into_iter().map(str::to_string))
        .collect()
}

/// Both collections, loaded once and handed to every aggregation.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    users: Vec<UserRecord>,
    enrollments: Vec<EnrollmentRecord>,
}

/// A filtered copy of the dataset. Users and enrollments are filtered on
/// their own fields, never through each other.
#[derive(Debug, Clone, Default)]
pub struct View {
    pub users: Vec<UserRecord>,
    pub enrollments: Vec<EnrollmentRecord>,
}

impl Dataset {
    pub fn new(users: Vec<UserRecord>, enrollments: Vec<EnrollmentRecord>) -> Self {
        tracing::info!(
            users = users.len(),
            enrollments = enrollments.len(),
            "dataset loaded"
        );
        Self { users, enrollments }
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn enrollments(&self) -> &[EnrollmentRecord] {
        &self.enrollments
    }

    pub fn filtered(&self, filters: &Filters) -> View {
        let view = View {
            users: apply_filters(&self.users, filters),
            enrollments: apply_filters(&self.enrollments, filters),
        };
        tracing::debug!(
            filters = %filters.label(),
            users = view.users.len(),
            enrollments = view.enrollments.len(),
            "filters applied"
        );
        view
    }

    pub fn countries(&self) -> Vec<String> {
        distinct_values(&self.users, |user| user.country.as_deref())
    }

    pub fn organization_types(&self) -> Vec<String> {
        distinct_values(&self.users, |user| user.organization_type.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, country: &str, organization_type: &str) -> UserRecord {
        UserRecord {
            email: email.to_string(),
            country: Some(country.to_string()),
            organization_type: Some(organization_type.to_string()),
            ..Default::default()
        }
    }

    fn enrollment(email: &str, country: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            email: email.to_string(),
            country: Some(country.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn all_sentinel_keeps_every_record() {
        let users = vec![user("a", "US", "NGO"), user("b", "CA", "School")];
        assert_eq!(filter_by(&users, Dimension::Country, Some(ALL)), users);
        assert_eq!(filter_by(&users, Dimension::Country, None), users);
        assert_eq!(apply_filters(&users, &Filters::default()), users);
    }

    #[test]
    fn filters_combine_dimensions() {
        let users = vec![
            user("a", "US", "NGO"),
            user("b", "US", "School"),
            user("c", "CA", "NGO"),
        ];
        let filters = Filters::new(Some("US"), Some("NGO"));
        let result = apply_filters(&users, &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].email, "a");
    }

    #[test]
    fn records_without_the_field_are_dropped() {
        let users = vec![
            UserRecord {
                email: "x".to_string(),
                ..Default::default()
            },
            user("a", "US", "NGO"),
        ];
        let result = filter_by(&users, Dimension::Country, Some("US"));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn enrollments_filter_on_their_own_country() {
        let dataset = Dataset::new(
            vec![user("a", "US", "NGO")],
            vec![enrollment("a", "CA"), enrollment("a", "US")],
        );
        let view = dataset.filtered(&Filters::new(Some("CA"), None));
        assert!(view.users.is_empty());
        assert_eq!(view.enrollments.len(), 1);
        assert_eq!(view.enrollments[0].country.as_deref(), Some("CA"));
    }

    #[test]
    fn distinct_values_are_case_sensitive_and_skip_empty() {
        let users = vec![
            user("a", "US", "NGO"),
            user("b", "us", "NGO"),
            user("c", "CA", "NGO"),
            user("d", "", "NGO"),
        ];
        let values = distinct_values(&users, |u| u.country.as_deref());
        assert_eq!(values, vec!["all", "CA", "US", "us"]);
    }

    #[test]
    fn option_lists_ignore_filters() {
        let dataset = Dataset::new(
            vec![user("a", "US", "NGO"), user("b", "CA", "School")],
            Vec::new(),
        );
        let _ = dataset.filtered(&Filters::new(Some("US"), None));
        assert_eq!(dataset.countries(), vec!["all", "CA", "US"]);
        assert_eq!(dataset.organization_types(), vec!["all", "NGO", "School"]);
    }

    #[test]
    fn label_describes_active_filters() {
        assert_eq!(Filters::default().label(), "all records");
        assert!(Filters::new(Some(ALL), Some(ALL)).is_unfiltered());
        assert_eq!(
            Filters::new(Some("US"), Some("NGO")).label(),
            "country US, organization type NGO"
        );
    }
}
