use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod db;
mod filter;
mod metrics;
mod models;
mod report;
mod source;

use aggregate::SortOrder;
use filter::{Dataset, Filters};
use report::{Dashboard, Layout};

#[derive(Parser)]
#[command(name = "enrollment-insights")]
#[command(about = "User and course enrollment analytics", long_about = None)]
struct Cli {
    /// Read users.json and courses.json (or .csv) from this directory
    /// instead of Postgres
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Ascending,
            Order::Desc => SortOrder::Descending,
        }
    }
}

#[derive(Args)]
struct Scope {
    #[arg(long, default_value = filter::ALL)]
    country: String,
    #[arg(long, default_value = filter::ALL)]
    organization_type: String,
    /// Reference time for the 30-day active window (RFC 3339)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = aggregate::DEFAULT_COURSE_LIMIT)]
    limit: usize,
    /// Order of the course table by completion rate
    #[arg(long, value_enum, default_value_t = Order::Desc)]
    rate_order: Order,
    /// Order of the organization table by users
    #[arg(long, value_enum, default_value_t = Order::Desc)]
    users_order: Order,
}

impl Scope {
    fn filters(&self) -> Filters {
        Filters::new(Some(self.country.as_str()), Some(self.organization_type.as_str()))
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn layout(&self) -> Layout {
        Layout {
            course_limit: self.limit,
            course_order: self.rate_order.into(),
            organization_order: self.users_order.into(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import users and enrollments from JSON or CSV files
    Import {
        #[arg(long)]
        users: Option<PathBuf>,
        #[arg(long)]
        enrollments: Option<PathBuf>,
    },
    /// List the available filter values
    Options,
    /// Print headline metrics and top courses
    Summary {
        #[command(flatten)]
        scope: Scope,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write every dashboard series as JSON
    Export {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "dashboard.json")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set unless --data-dir is given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_dataset(data_dir: Option<&Path>) -> anyhow::Result<Dataset> {
    match data_dir {
        Some(dir) => source::load_dir(dir)
            .with_context(|| format!("failed to load dataset from {}", dir.display())),
        None => {
            let pool = connect().await?;
            let users = db::fetch_users(&pool).await?;
            let enrollments = db::fetch_enrollments(&pool).await?;
            Ok(Dataset::new(users, enrollments))
        }
    }
}

fn dashboard(dataset: &Dataset, scope: &Scope) -> Dashboard {
    let filters = scope.filters();
    Dashboard::build(&dataset.filtered(&filters), &filters, scope.now(), scope.layout())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect().await?).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { users, enrollments } => {
            if users.is_none() && enrollments.is_none() {
                anyhow::bail!("pass --users, --enrollments or both");
            }
            let pool = connect().await?;
            if let Some(path) = users {
                let imported = db::import_users(&pool, &path).await?;
                println!("Imported {imported} users from {}.", path.display());
            }
            if let Some(path) = enrollments {
                let inserted = db::import_enrollments(&pool, &path).await?;
                println!("Inserted {inserted} enrollments from {}.", path.display());
            }
        }
        Commands::Options => {
            let dataset = load_dataset(data_dir).await?;
            println!(
                "{} users, {} enrollments loaded.",
                dataset.users().len(),
                dataset.enrollments().len()
            );
            println!("Countries: {}", dataset.countries().join(", "));
            println!(
                "Organization types: {}",
                dataset.organization_types().join(", ")
            );
        }
        Commands::Summary { scope } => {
            let dataset = load_dataset(data_dir).await?;
            let dashboard = dashboard(&dataset, &scope);
            let headline = &dashboard.metrics;

            println!("Summary for {}:", dashboard.scope);
            println!(
                "- {} users, {} enrollments, {} completed ({:.1}%)",
                headline.total_users,
                headline.total_enrollments,
                headline.completed_courses,
                headline.completion_rate
            );
            println!(
                "- {} active in the last {} days",
                headline.active_users,
                metrics::ACTIVE_WINDOW_DAYS
            );
            println!(
                "- {:.1} courses per enrolled user, average time {}",
                headline.avg_courses_per_user, headline.avg_time_on_course
            );

            if dashboard.top_courses.is_empty() {
                println!("No courses found for this selection.");
                return Ok(());
            }

            println!("Top courses by completion rate:");
            for course in &dashboard.courses_by_rate {
                println!(
                    "- {} started {}, completed {} ({}%)",
                    course.name, course.started, course.completed, course.rate
                );
            }
        }
        Commands::Report { scope, out } => {
            let dataset = load_dataset(data_dir).await?;
            let report = report::render_markdown(&dashboard(&dataset, &scope));
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { scope, out } => {
            let dataset = load_dataset(data_dir).await?;
            let json = serde_json::to_string_pretty(&dashboard(&dataset, &scope))?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Dashboard written to {}.", out.display());
        }
    }

    Ok(())
}
