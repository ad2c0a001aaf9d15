use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{self, SortOrder};
use crate::filter::{Filters, View};
use crate::models::{
    CourseStat, EngagementSummary, HeadlineMetrics, MonthCount, MonthProgress, NamedCount,
    OrganizationOverview, OrganizationStat, OrganizationTotals, RegistrationMonth, TypeProgress,
};

pub const COUNTRY_LIMIT: usize = 8;

/// How the ranked tables are cut and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub course_limit: usize,
    pub course_order: SortOrder,
    pub organization_order: SortOrder,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            course_limit: aggregate::DEFAULT_COURSE_LIMIT,
            course_order: SortOrder::Descending,
            organization_order: SortOrder::Descending,
        }
    }
}

/// Every series the dashboard renders for one filter combination.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub scope: String,
    pub generated_at: DateTime<Utc>,
    pub metrics: HeadlineMetrics,
    pub registrations_by_month: Vec<RegistrationMonth>,
    pub users_by_month: Vec<MonthCount>,
    pub enrollments_by_month: Vec<MonthProgress>,
    pub top_courses: Vec<CourseStat>,
    pub course_order: SortOrder,
    /// `top_courses` reordered by completion rate in `course_order`.
    pub courses_by_rate: Vec<CourseStat>,
    pub users_by_country: Vec<NamedCount>,
    pub recurrence: Vec<NamedCount>,
    pub engagement: Vec<EngagementSummary>,
    pub organization_overview: OrganizationOverview,
    pub users_by_organization_type: Vec<NamedCount>,
    pub enrollments_by_organization_type: Vec<TypeProgress>,
    pub organization_order: SortOrder,
    /// The largest organizations, ordered by headcount in `organization_order`.
    pub top_organizations: Vec<OrganizationStat>,
    pub organization_totals: OrganizationTotals,
}

impl Dashboard {
    pub fn build(view: &View, filters: &Filters, now: DateTime<Utc>, layout: Layout) -> Self {
        let metrics = HeadlineMetrics::compute(&view.users, &view.enrollments, now);
        let top_courses = aggregate::top_courses(&view.enrollments, layout.course_limit);
        let top_organizations = aggregate::top_organizations(
            &view.users,
            &view.enrollments,
            aggregate::ORGANIZATION_LIMIT,
        );

        Self {
            scope: filters.label(),
            generated_at: now,
            recurrence: metrics.recurrence.rows(),
            metrics,
            registrations_by_month: aggregate::registrations_by_month(
                &view.users,
                &view.enrollments,
            ),
            users_by_month: aggregate::group_by_month(&view.users, |u| {
                u.registered_date.as_deref()
            }),
            enrollments_by_month: aggregate::group_enrollments_by_month(&view.enrollments),
            course_order: layout.course_order,
            courses_by_rate: aggregate::sort_courses_by_rate(&top_courses, layout.course_order),
            top_courses,
            users_by_country: aggregate::group_by_field(
                &view.users,
                |u| u.country.as_deref(),
                COUNTRY_LIMIT,
            ),
            engagement: aggregate::completion_by_engagement(&view.enrollments),
            organization_overview: aggregate::organization_overview(&view.users),
            users_by_organization_type: aggregate::users_by_organization_type(&view.users),
            enrollments_by_organization_type: aggregate::enrollments_by_organization_type(
                &view.enrollments,
            ),
            organization_totals: aggregate::organization_totals(&top_organizations),
            organization_order: layout.organization_order,
            top_organizations: aggregate::sort_organizations_by_users(
                &top_organizations,
                layout.organization_order,
            ),
        }
    }
}

pub fn render_markdown(dashboard: &Dashboard) -> String {
    let mut output = String::new();
    let metrics = &dashboard.metrics;

    let _ = writeln!(output, "# Enrollment Insights Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        dashboard.scope,
        dashboard.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(output, "- Users: {}", metrics.total_users);
    let _ = writeln!(
        output,
        "- Enrollments: {} ({} completed, {:.1}% completion)",
        metrics.total_enrollments, metrics.completed_courses, metrics.completion_rate
    );
    let _ = writeln!(output, "- Active users (30 days): {}", metrics.active_users);
    let _ = writeln!(
        output,
        "- Users with a completed course: {}",
        metrics.users_with_completed_courses
    );
    let _ = writeln!(
        output,
        "- Courses per enrolled user: {:.1} across {} users",
        metrics.avg_courses_per_user, metrics.unique_users_with_courses
    );
    let _ = writeln!(
        output,
        "- Average time on course: {} ({}h in total)",
        metrics.avg_time_on_course, metrics.total_time_hours
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Registrations by Month");
    if dashboard.registrations_by_month.is_empty() {
        let _ = writeln!(output, "No registrations recorded.");
    } else {
        let _ = writeln!(output, "| Month | With courses | Without courses | Total |");
        let _ = writeln!(output, "|---|---|---|---|");
        for month in &dashboard.registrations_by_month {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                month.month, month.with_courses, month.without_courses, month.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Enrollments by Month");
    if dashboard.enrollments_by_month.is_empty() {
        let _ = writeln!(output, "No enrollments recorded.");
    } else {
        for month in &dashboard.enrollments_by_month {
            let _ = writeln!(
                output,
                "- {}: {} started, {} completed",
                month.month, month.started, month.completed
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Courses");
    if dashboard.top_courses.is_empty() {
        let _ = writeln!(output, "No titled courses in this selection.");
    } else {
        let _ = writeln!(output, "| Course | Started | Completed | Rate |");
        let _ = writeln!(output, "|---|---|---|---|");
        for course in &dashboard.courses_by_rate {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {}% |",
                course.name, course.started, course.completed, course.rate
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Users by Country");
    for country in &dashboard.users_by_country {
        let _ = writeln!(output, "- {}: {}", country.name, country.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement");
    for (recurrence, tier) in dashboard.recurrence.iter().zip(&dashboard.engagement) {
        let _ = writeln!(
            output,
            "- {}: {} users, {}/{} completed ({}%)",
            recurrence.name,
            recurrence.count,
            tier.completed_courses,
            tier.total_courses,
            tier.completion_rate
        );
    }

    let overview = &dashboard.organization_overview;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Organizations");
    let _ = writeln!(
        output,
        "{} organizations across {} types; {} users with an organization, {} without.",
        overview.total_organizations,
        overview.total_organization_types,
        overview.users_with_organization,
        overview.users_without_organization
    );
    let _ = writeln!(output);
    for kind in &dashboard.enrollments_by_organization_type {
        let _ = writeln!(
            output,
            "- {}: {} started, {} completed ({}%)",
            kind.organization_type, kind.started, kind.completed, kind.rate
        );
    }

    if !dashboard.top_organizations.is_empty() {
        let totals = &dashboard.organization_totals;
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "| Organization | Type | Users | Enrollments | Completed | Rate |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for org in &dashboard.top_organizations {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {}% |",
                org.name,
                org.organization_type,
                org.users,
                org.enrollments,
                org.completed,
                org.rate
            );
        }
        let _ = writeln!(
            output,
            "| TOTAL | - | {} | {} | {} | {}% |",
            totals.users, totals.enrollments, totals.completed, totals.rate
        );
    }

    output
}
