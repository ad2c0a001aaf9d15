use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::models::{
    CourseStat, EngagementSummary, EngagementTier, EnrollmentRecord, MonthCount, MonthProgress,
    NamedCount, OrganizationOverview, OrganizationStat, OrganizationTotals, RegistrationMonth,
    TypeProgress, UserRecord,
};

pub const DEFAULT_COURSE_LIMIT: usize = 10;
pub const COURSE_NAME_WIDTH: usize = 35;
pub const ORGANIZATION_LIMIT: usize = 15;
pub const ORGANIZATION_NAME_WIDTH: usize = 30;

const UNKNOWN: &str = "Unknown";
const INDIVIDUAL: &str = "Individual";

/// Groups keyed by string, remembering the order keys were first seen so
/// that a stable sort afterwards breaks ties by first appearance.
struct Tally<V> {
    index: HashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V: Default> Tally<V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut V {
        let position = match self.index.get(key) {
            Some(position) => *position,
            None => {
                self.entries.push((key.to_string(), V::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    fn into_entries(self) -> Vec<(String, V)> {
        self.entries
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    started: usize,
    completed: usize,
}

impl Progress {
    fn record(&mut self, completed: bool) {
        self.started += 1;
        if completed {
            self.completed += 1;
        }
    }
}

/// Whole-number percentage of `part` over `whole`; zero when `whole` is zero.
pub fn rate(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

/// Cuts `name` to `width` characters and marks the cut with `...`.
pub fn truncate_name(name: &str, width: usize) -> String {
    if name.chars().count() > width {
        let mut short: String = name.chars().take(width).collect();
        short.push_str("...");
        short
    } else {
        name.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Year-month key: the first seven characters of the date string.
pub fn month_key(date: &str) -> Option<String> {
    if date.is_empty() {
        None
    } else {
        Some(date.chars().take(7).collect())
    }
}

pub fn group_by_month<'a, T, F>(records: &'a [T], date: F) -> Vec<MonthCount>
where
    F: Fn(&'a T) -> Option<&'a str>,
{
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for month in records.iter().filter_map(|r| date(r).and_then(month_key)) {
        *months.entry(month).or_insert(0) += 1;
    }

    months
        .into_iter()
        .map(|(month, count)| MonthCount { month, count })
        .collect()
}

pub fn group_enrollments_by_month(enrollments: &[EnrollmentRecord]) -> Vec<MonthProgress> {
    let mut months: BTreeMap<String, Progress> = BTreeMap::new();
    for enrollment in enrollments {
        if let Some(month) = enrollment.started_on.as_deref().and_then(month_key) {
            months.entry(month).or_default().record(enrollment.is_completed);
        }
    }

    months
        .into_iter()
        .map(|(month, progress)| MonthProgress {
            month,
            started: progress.started,
            completed: progress.completed,
        })
        .collect()
}

/// Registrations per month, split by whether the user has any enrollment.
pub fn registrations_by_month(
    users: &[UserRecord],
    enrollments: &[EnrollmentRecord],
) -> Vec<RegistrationMonth> {
    let enrolled: HashSet<&str> = enrollments.iter().map(|e| e.email.as_str()).collect();
    let mut months: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for user in users {
        let Some(month) = user.registered_date.as_deref().and_then(month_key) else {
            continue;
        };
        let entry = months.entry(month).or_insert((0, 0));
        if enrolled.contains(user.email.as_str()) {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    months
        .into_iter()
        .map(|(month, (with_courses, without_courses))| RegistrationMonth {
            month,
            with_courses,
            without_courses,
            total: with_courses + without_courses,
        })
        .collect()
}

/// Top `limit` values of a field by occurrence. Missing and empty values
/// count as `"Unknown"`; equal counts keep first-seen order.
pub fn group_by_field<'a, T, F>(records: &'a [T], field: F, limit: usize) -> Vec<NamedCount>
where
    F: Fn(&'a T) -> Option<&'a str>,
{
    let mut tally: Tally<usize> = Tally::new();
    for record in records {
        *tally.entry(non_empty(field(record)).unwrap_or(UNKNOWN)) += 1;
    }

    let mut counts: Vec<NamedCount> = tally
        .into_entries()
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

/// Course ranking by enrollments. Titles are trimmed before grouping and
/// blank titles are left out entirely.
pub fn top_courses(enrollments: &[EnrollmentRecord], limit: usize) -> Vec<CourseStat> {
    let mut tally: Tally<Progress> = Tally::new();
    for enrollment in enrollments {
        let title = enrollment.course_title.as_deref().map(str::trim).unwrap_or("");
        if title.is_empty() {
            continue;
        }
        tally.entry(title).record(enrollment.is_completed);
    }

    let mut courses: Vec<CourseStat> = tally
        .into_entries()
        .into_iter()
        .map(|(title, progress)| CourseStat {
            name: truncate_name(&title, COURSE_NAME_WIDTH),
            full_name: title,
            started: progress.started,
            completed: progress.completed,
            rate: rate(progress.completed, progress.started),
        })
        .collect();
    courses.sort_by(|a, b| b.started.cmp(&a.started));
    courses.truncate(limit);
    courses
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

pub fn sort_courses_by_rate(courses: &[CourseStat], order: SortOrder) -> Vec<CourseStat> {
    let mut sorted = courses.to_vec();
    match order {
        SortOrder::Ascending => sorted.sort_by(|a, b| a.rate.cmp(&b.rate)),
        SortOrder::Descending => sorted.sort_by(|a, b| b.rate.cmp(&a.rate)),
    }
    sorted
}

/// Completion rate per engagement tier. Always returns the three tiers in
/// order, empty ones included.
pub fn completion_by_engagement(enrollments: &[EnrollmentRecord]) -> Vec<EngagementSummary> {
    let mut per_user: HashMap<&str, Progress> = HashMap::new();
    for enrollment in enrollments {
        per_user
            .entry(enrollment.email.as_str())
            .or_default()
            .record(enrollment.is_completed);
    }

    let mut tiers: HashMap<EngagementTier, (usize, Progress)> = HashMap::new();
    for progress in per_user.values() {
        let tier = tiers
            .entry(EngagementTier::for_count(progress.started))
            .or_default();
        tier.0 += 1;
        tier.1.started += progress.started;
        tier.1.completed += progress.completed;
    }

    EngagementTier::ALL
        .iter()
        .map(|tier| {
            let (users, progress) = tiers.get(tier).copied().unwrap_or_default();
            EngagementSummary {
                tier: *tier,
                name: tier.label().to_string(),
                users,
                total_courses: progress.started,
                completed_courses: progress.completed,
                completion_rate: rate(progress.completed, progress.started),
            }
        })
        .collect()
}

pub fn organization_overview(users: &[UserRecord]) -> OrganizationOverview {
    let organizations: HashSet<&str> = users
        .iter()
        .filter_map(|u| non_empty(u.organization.as_deref()))
        .collect();
    let organization_types: HashSet<&str> = users
        .iter()
        .filter_map(|u| non_empty(u.organization_type.as_deref()))
        .collect();
    let users_with_organization = users
        .iter()
        .filter(|u| non_empty(u.organization.as_deref()).is_some())
        .count();

    OrganizationOverview {
        total_organizations: organizations.len(),
        total_organization_types: organization_types.len(),
        users_with_organization,
        users_without_organization: users.len() - users_with_organization,
    }
}

/// Users per organization type; users without a type count as `"Individual"`.
pub fn users_by_organization_type(users: &[UserRecord]) -> Vec<NamedCount> {
    let mut tally: Tally<usize> = Tally::new();
    for user in users {
        *tally.entry(non_empty(user.organization_type.as_deref()).unwrap_or(INDIVIDUAL)) += 1;
    }

    let mut counts: Vec<NamedCount> = tally
        .into_entries()
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn enrollments_by_organization_type(enrollments: &[EnrollmentRecord]) -> Vec<TypeProgress> {
    let mut tally: Tally<Progress> = Tally::new();
    for enrollment in enrollments {
        tally
            .entry(non_empty(enrollment.organization_type.as_deref()).unwrap_or(INDIVIDUAL))
            .record(enrollment.is_completed);
    }

    let mut types: Vec<TypeProgress> = tally
        .into_entries()
        .into_iter()
        .map(|(organization_type, progress)| TypeProgress {
            organization_type,
            started: progress.started,
            completed: progress.completed,
            rate: rate(progress.completed, progress.started),
        })
        .collect();
    types.sort_by(|a, b| b.started.cmp(&a.started));
    types
}

#[derive(Debug, Default)]
struct OrganizationGroup {
    organization_type: Option<String>,
    users: usize,
    enrollments: Progress,
}

/// Largest organizations by headcount with their enrollment rollup.
///
/// Enrollments are attributed through an email to organization index, so
/// each enrollment is visited once. An email listed under several
/// organizations counts toward each of them. Users without an organization
/// are not grouped; see [`organization_overview`] for that headcount.
pub fn top_organizations(
    users: &[UserRecord],
    enrollments: &[EnrollmentRecord],
    limit: usize,
) -> Vec<OrganizationStat> {
    let mut tally: Tally<OrganizationGroup> = Tally::new();
    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();

    for user in users {
        let Some(organization) = non_empty(user.organization.as_deref()) else {
            continue;
        };
        let group = tally.entry(organization);
        if group.users == 0 {
            group.organization_type = user.organization_type.clone();
        }
        group.users += 1;

        let position = tally.index[organization];
        let organizations = members.entry(user.email.as_str()).or_default();
        if !organizations.contains(&position) {
            organizations.push(position);
        }
    }

    let mut entries = tally.into_entries();
    for enrollment in enrollments {
        if let Some(organizations) = members.get(enrollment.email.as_str()) {
            for position in organizations {
                entries[*position].1.enrollments.record(enrollment.is_completed);
            }
        }
    }

    let mut organizations: Vec<OrganizationStat> = entries
        .into_iter()
        .map(|(organization, group)| OrganizationStat {
            name: truncate_name(&organization, ORGANIZATION_NAME_WIDTH),
            full_name: organization,
            organization_type: group
                .organization_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            users: group.users,
            enrollments: group.enrollments.started,
            completed: group.enrollments.completed,
            rate: rate(group.enrollments.completed, group.enrollments.started),
        })
        .collect();
    organizations.sort_by(|a, b| b.users.cmp(&a.users));
    organizations.truncate(limit);
    organizations
}

/// Reorders an organization table by headcount; equal headcounts keep
/// their current order.
pub fn sort_organizations_by_users(
    organizations: &[OrganizationStat],
    order: SortOrder,
) -> Vec<OrganizationStat> {
    let mut sorted = organizations.to_vec();
    match order {
        SortOrder::Ascending => sorted.sort_by(|a, b| a.users.cmp(&b.users)),
        SortOrder::Descending => sorted.sort_by(|a, b| b.users.cmp(&a.users)),
    }
    sorted
}

/// Sums the rows of an organization table into its closing total line.
pub fn organization_totals(organizations: &[OrganizationStat]) -> OrganizationTotals {
    let users = organizations.iter().map(|o| o.users).sum();
    let enrollments = organizations.iter().map(|o| o.enrollments).sum();
    let completed = organizations.iter().map(|o| o.completed).sum();

    OrganizationTotals {
        users,
        enrollments,
        completed,
        rate: rate(completed, enrollments),
    }
}
