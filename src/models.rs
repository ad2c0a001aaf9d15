use serde::{Deserialize, Deserializer, Serialize};

/// Reads `null` or an empty CSV cell as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub organization_type: Option<String>,
    #[serde(default)]
    pub registered_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub organization_type: Option<String>,
    #[serde(default)]
    pub started_on: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_completed: bool,
    #[serde(default)]
    pub time_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthProgress {
    pub month: String,
    pub started: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationMonth {
    pub month: String,
    pub with_courses: usize,
    pub without_courses: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseStat {
    /// Display name, cut at 35 characters.
    pub name: String,
    pub full_name: String,
    pub started: usize,
    pub completed: usize,
    /// Whole-number percentage in `0..=100`.
    pub rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngagementTier {
    One,
    Two,
    ThreePlus,
}

impl EngagementTier {
    pub const ALL: [EngagementTier; 3] = [Self::One, Self::Two, Self::ThreePlus];

    pub fn for_count(total: usize) -> Self {
        match total {
            1 => Self::One,
            2 => Self::Two,
            _ => Self::ThreePlus,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::One => "1 curso",
            Self::Two => "2 cursos",
            Self::ThreePlus => "3+ cursos",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementSummary {
    pub tier: EngagementTier,
    pub name: String,
    pub users: usize,
    pub total_courses: usize,
    pub completed_courses: usize,
    pub completion_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationStat {
    /// Display name, cut at 30 characters.
    pub name: String,
    pub full_name: String,
    pub organization_type: String,
    pub users: usize,
    pub enrollments: usize,
    pub completed: usize,
    pub rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationTotals {
    pub users: usize,
    pub enrollments: usize,
    pub completed: usize,
    pub rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationOverview {
    pub total_organizations: usize,
    pub total_organization_types: usize,
    pub users_with_organization: usize,
    pub users_without_organization: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeProgress {
    pub organization_type: String,
    pub started: usize,
    pub completed: usize,
    pub rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecurrenceDistribution {
    pub one_course: usize,
    pub two_courses: usize,
    pub three_plus: usize,
}

impl RecurrenceDistribution {
    pub fn record(&mut self, enrollments: usize) {
        match EngagementTier::for_count(enrollments) {
            EngagementTier::One => self.one_course += 1,
            EngagementTier::Two => self.two_courses += 1,
            EngagementTier::ThreePlus => self.three_plus += 1,
        }
    }

    /// Labelled rows in tier order, as the recurrence chart shows them.
    pub fn rows(&self) -> Vec<NamedCount> {
        EngagementTier::ALL
            .iter()
            .map(|tier| NamedCount {
                name: tier.label().to_string(),
                count: match tier {
                    EngagementTier::One => self.one_course,
                    EngagementTier::Two => self.two_courses,
                    EngagementTier::ThreePlus => self.three_plus,
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineMetrics {
    pub total_users: usize,
    pub total_enrollments: usize,
    pub completed_courses: usize,
    /// Percentage with one decimal.
    pub completion_rate: f64,
    pub active_users: usize,
    pub users_with_completed_courses: usize,
    pub unique_users_with_courses: usize,
    pub avg_courses_per_user: f64,
    pub recurrence: RecurrenceDistribution,
    pub avg_time_minutes: u64,
    pub avg_time_on_course: String,
    pub total_time_hours: u64,
}
