use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use field_console::dashboard::{self, QueueTab};
use field_console::db::{self, PgStorage};
use field_console::grading::{self, ManualGrades};
use field_console::models::{
    Attachment, GradingConfig, JobCorrections, Outcome, Role, SessionUser, TransmissionDraft,
};
use field_console::report;
use field_console::telemetry::{self, LogFormat};
use field_console::workflow::Decision;
use field_console::{Console, PolicyError, Replica, Slice, Storage, DEFAULT_NAMESPACE};

const REVIEWERS: [Role; 2] = [Role::Supervisor, Role::DeptHead];

#[derive(Parser)]
#[command(name = "field-console")]
#[command(about = "Field performance console for AA2000 field operations", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    /// Key prefix shared by every replica of the same console
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    #[arg(long, env = "CONSOLE_NAME", global = true)]
    name: Option<String>,
    #[arg(long, env = "CONSOLE_ROLE", global = true)]
    role: Option<Role>,
    #[arg(long, env = "CONSOLE_PASSKEY", hide_env_values = true, global = true)]
    passkey: Option<String>,
    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,
    /// Emit JSON log lines instead of compact text
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Install the default accounts when the registry is empty
    Seed,
    /// Bulk-provision identities from a CSV file
    ImportRegistry {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Open a session: audits the login and posts a welcome notification
    Login,
    /// Close the session
    Logout,
    /// Print the completion checklist of a job classification
    Checklist {
        #[arg(long, default_value = "Installation")]
        job_type: String,
    },
    /// Transmit a field activity log for review
    Submit {
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        client_site: String,
        #[arg(long, default_value = "Preventive Maintenance")]
        job_type: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = grading::NOMINAL_STATUS)]
        status: String,
        #[arg(long)]
        report: String,
        /// Evidence as name[:type[:size]], repeatable
        #[arg(long = "attachment")]
        attachments: Vec<Attachment>,
        /// Number of checklist items completed
        #[arg(long, default_value_t = 0)]
        checklist: usize,
    },
    /// Own submissions, current standing and incentive payout
    Overview,
    /// Supervisor review queue
    Queue {
        #[arg(long, default_value = "pending")]
        tab: QueueTab,
    },
    /// Validate a pending transmission
    Validate {
        id: String,
        /// Ratings from 0 to 5; omitted ones default to the attached suggestion
        #[arg(long, value_parser = parse_rating)]
        performance: Option<f64>,
        #[arg(long, value_parser = parse_rating)]
        proficiency: Option<f64>,
        #[arg(long, value_parser = parse_rating)]
        professionalism: Option<f64>,
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long)]
        client_site: Option<String>,
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long)]
        system_status: Option<String>,
        /// Supervisor comment; required when correcting job data
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Reject a pending transmission
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Post a department announcement
    Announce { message: String },
    /// Remove a department announcement
    Retract { id: String },
    /// Active announcements of the session's department
    Announcements,
    /// Notifications addressed to the session user
    Notifications,
    /// Dismiss one of the session user's notifications
    Dismiss { id: String },
    /// Graded standings, best first
    Standings {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Provision a new identity with the default passkey
    Provision {
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        department: String,
    },
    /// Rename an identity or change its role
    EditUser {
        #[arg(long)]
        user: String,
        #[arg(long)]
        new_name: String,
        #[arg(long)]
        role: Role,
    },
    /// Move an identity to another department
    Transfer {
        #[arg(long)]
        user: String,
        #[arg(long)]
        department: String,
    },
    /// Revoke an identity and purge its workflow data
    Archive {
        #[arg(long)]
        user: String,
    },
    /// Create a department
    AddDepartment {
        #[arg(long)]
        name: String,
        #[arg(long)]
        key: String,
    },
    /// Show or change the grading coefficients
    Weights {
        #[arg(long)]
        perf: Option<u32>,
        #[arg(long)]
        prof: Option<u32>,
        #[arg(long)]
        beh: Option<u32>,
        #[arg(long, conflicts_with_all = ["perf", "prof", "beh"])]
        reset: bool,
    },
    /// Export the audit trail as markdown
    AuditReport {
        #[arg(long, default_value = "audit-trail.md")]
        out: PathBuf,
    },
    /// Follow changes made by other consoles
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    telemetry::init(cli.log_level, format).context("failed to install tracing subscriber")?;

    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;
    let storage = PgStorage::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    if matches!(cli.command, Commands::InitDb) {
        db::init_db(storage.pool()).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let storage: Arc<dyn Storage> = Arc::new(storage);
    let mut replica = Replica::open(storage, cli.namespace.clone())
        .await
        .context("failed to load console state")?;

    // Failed operations may still have audited something.
    let outcome = run(&cli, &mut replica).await;
    replica
        .commit()
        .await
        .context("failed to persist console state")?;
    outcome
}

async fn run(cli: &Cli, replica: &mut Replica) -> anyhow::Result<()> {
    match &cli.command {
        Commands::InitDb => {}
        Commands::Seed => {
            if replica.console_mut().seed_defaults() {
                println!("Default accounts installed.");
            } else {
                println!("Registry already populated.");
            }
        }
        Commands::ImportRegistry { csv } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            let file = std::fs::File::open(csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let inserted = replica.console_mut().import_registry(&admin, file)?;
            println!("Provisioned {inserted} identities from {}.", csv.display());
        }
        Commands::Login => {
            let (name, role, passkey) = credentials(cli)?;
            let user = replica.console_mut().authenticate(name, role, passkey)?;
            println!(
                "Session established for {} ({}, {}), id {}.",
                user.name,
                user.role,
                user.department.as_deref().unwrap_or("no department"),
                user.id
            );
        }
        Commands::Logout => {
            let user = session(cli, replica.console_mut(), &[])?;
            replica.console_mut().logout(&user);
            println!("Session terminated.");
        }
        Commands::Checklist { job_type } => {
            for (index, item) in grading::checklist_for(job_type).iter().enumerate() {
                println!("{}. {item}", index + 1);
            }
        }
        Commands::Submit {
            job_id,
            client_site,
            job_type,
            start,
            end,
            status,
            report,
            attachments,
            checklist,
        } => {
            let user = session(cli, replica.console_mut(), &[Role::Employee])?;
            let draft = TransmissionDraft {
                job_id: job_id.clone(),
                client_site: client_site.clone(),
                job_type: job_type.clone(),
                start_time: start.clone(),
                end_time: end.clone(),
                system_status: status.clone(),
                project_report: report.clone(),
                attachments: attachments.clone(),
                checklist_completed: *checklist,
            };
            let id = replica.console_mut().submit(&user, draft)?;
            println!("Transmission {id} queued for review.");
        }
        Commands::Overview => {
            let user = session(cli, replica.console_mut(), &[])?;
            let overview = replica.console().employee_overview(&user);
            match overview.stats.and_then(|stats| stats.ratings.as_ref()) {
                Some(ratings) => println!(
                    "Standing {}% (incentive {:.0}%, payout {:.2} of {}). {}",
                    ratings.final_score(),
                    ratings.incentive_pct() * 100.0,
                    overview.incentive_payout,
                    user.incentive_target,
                    grading::improvement_hint(ratings)
                ),
                None => println!("No validated standing yet."),
            }
            if overview.has_pending {
                println!("A transmission is awaiting review.");
            }
            for item in overview.submissions {
                println!(
                    "- {} {} at {} ({:?})",
                    item.id,
                    item.job_id,
                    item.client_site,
                    item.lifecycle()
                );
            }
        }
        Commands::Queue { tab } => {
            let user = session(cli, replica.console_mut(), &REVIEWERS)?;
            let department = user.department.as_deref().unwrap_or_default();
            let items = replica.console().review_queue(department, *tab);
            if items.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            for item in items {
                let marker = if item.is_flagged() { " [flagged]" } else { "" };
                let suggestion = item
                    .ratings
                    .as_ref()
                    .map(|r| {
                        format!(
                            "P {:.1} / Q {:.1} / R {:.1}",
                            r.performance(),
                            r.proficiency(),
                            r.professionalism()
                        )
                    })
                    .unwrap_or_default();
                println!(
                    "- {} {} by {}: {} at {} ({}){marker} {suggestion}",
                    item.id,
                    item.job_type,
                    item.user_name,
                    item.job_id,
                    item.client_site,
                    item.system_status
                );
            }
        }
        Commands::Validate {
            id,
            performance,
            proficiency,
            professionalism,
            job_id,
            client_site,
            job_type,
            system_status,
            comment,
        } => {
            let user = session(cli, replica.console_mut(), &REVIEWERS)?;
            let Some(pending) = replica.console().find_pending(id) else {
                println!("Transmission {id} is no longer pending.");
                return Ok(());
            };
            let seeded = grading::prefill(pending.ratings.as_ref());
            let grades = ManualGrades {
                performance: performance.unwrap_or(seeded.performance),
                proficiency: proficiency.unwrap_or(seeded.proficiency),
                professionalism: professionalism.unwrap_or(seeded.professionalism),
            };
            let decision = Decision::Validate {
                ratings: grades.into_ratings()?,
                corrections: JobCorrections {
                    job_id: job_id.clone(),
                    client_site: client_site.clone(),
                    job_type: job_type.clone(),
                    system_status: system_status.clone(),
                },
                comment: comment.clone(),
            };
            report_review(replica.console_mut().review(&user, id, decision)?, id);
        }
        Commands::Reject { id, reason } => {
            let user = session(cli, replica.console_mut(), &REVIEWERS)?;
            let decision = Decision::Reject {
                justification: reason.clone(),
            };
            report_review(replica.console_mut().review(&user, id, decision)?, id);
        }
        Commands::Announce { message } => {
            let user = session(cli, replica.console_mut(), &REVIEWERS)?;
            let id = replica.console_mut().post_announcement(&user, message)?;
            println!("Announcement {id} posted.");
        }
        Commands::Retract { id } => {
            let user = session(cli, replica.console_mut(), &REVIEWERS)?;
            if replica.console_mut().delete_announcement(&user, id) {
                println!("Announcement {id} removed.");
            } else {
                println!("No announcement {id}.");
            }
        }
        Commands::Announcements => {
            let user = session(cli, replica.console_mut(), &[])?;
            let department = user.department.as_deref().unwrap_or_default();
            let active = dashboard::active_announcements(
                replica.console().announcements(),
                department,
                Utc::now(),
            );
            if active.is_empty() {
                println!("No active announcements.");
            }
            for item in active {
                println!(
                    "- [{}] {} ({}): {}",
                    item.id,
                    item.sender_name,
                    item.timestamp.format("%Y-%m-%d"),
                    item.message
                );
            }
        }
        Commands::Notifications => {
            let user = session(cli, replica.console_mut(), &[])?;
            let items = replica.console().notifications_for(&user.id);
            if items.is_empty() {
                println!("No notifications.");
            }
            for item in items {
                println!("- [{}] {:?}: {}", item.id, item.severity, item.message);
            }
        }
        Commands::Dismiss { id } => {
            let user = session(cli, replica.console_mut(), &[])?;
            if !replica.console_mut().delete_notification(&user, id) {
                bail!("no notification {id} for {}", user.name);
            }
            println!("Notification {id} dismissed.");
        }
        Commands::Standings { out } => {
            session(
                cli,
                replica.console_mut(),
                &[Role::DeptHead, Role::Executive, Role::Admin],
            )?;
            let standings = replica.console().standings();
            let rendered = report::build_standings_report(&standings, Utc::now());
            match out {
                Some(path) => {
                    std::fs::write(path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Standings written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Provision {
            user,
            role,
            department,
        } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            replica
                .console_mut()
                .provision(&admin, user, *role, department)?;
            println!("Provisioned {user} as {role} in {department}.");
        }
        Commands::EditUser {
            user,
            new_name,
            role,
        } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            replica
                .console_mut()
                .edit_credential(&admin, user, new_name, *role)?;
            println!("Updated {user} -> {new_name} ({role}).");
        }
        Commands::Transfer { user, department } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            if replica.console_mut().transfer(&admin, user, department)? {
                println!("Transferred {user} to {department}.");
            } else {
                println!("{user} already belongs to {department}.");
            }
        }
        Commands::Archive { user } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            replica.console_mut().archive_user(&admin, user)?;
            println!("{user} archived.");
        }
        Commands::AddDepartment { name, key } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            replica.console_mut().add_department(&admin, name, key)?;
            println!("Department {name} created.");
        }
        Commands::Weights {
            perf,
            prof,
            beh,
            reset,
        } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            let current = replica.console().grading_config();
            if *reset {
                replica.console_mut().reset_grading_weights(&admin);
            } else if perf.is_some() || prof.is_some() || beh.is_some() {
                let config = GradingConfig {
                    perf_weight: perf.unwrap_or(current.perf_weight),
                    prof_weight: prof.unwrap_or(current.prof_weight),
                    beh_weight: beh.unwrap_or(current.beh_weight),
                };
                replica.console_mut().set_grading_weights(&admin, config)?;
            }
            let config = replica.console().grading_config();
            println!(
                "Grading coefficients {}/{}/{}.",
                config.perf_weight, config.prof_weight, config.beh_weight
            );
        }
        Commands::AuditReport { out } => {
            let admin = session(cli, replica.console_mut(), &[Role::Admin])?;
            let rendered = replica.console_mut().export_audit_trail(&admin, Utc::now());
            std::fs::write(out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Audit trail written to {}.", out.display());
        }
        Commands::Watch => watch(cli, replica).await?,
    }

    Ok(())
}

async fn watch(cli: &Cli, replica: &mut Replica) -> anyhow::Result<()> {
    let user = session(cli, replica.console_mut(), &[])?;
    replica.commit().await?;
    let mut seen: HashSet<String> = replica
        .console()
        .notifications_for(&user.id)
        .into_iter()
        .map(|item| item.id.clone())
        .collect();
    println!("Watching {} for changes.", replica.namespace());

    while let Some(changed) = replica.next_change().await? {
        for slice in &changed {
            println!("{} updated.", slice.suffix());
        }
        if changed.contains(&Slice::Notifications) {
            for item in replica.console().notifications_for(&user.id) {
                if seen.insert(item.id.clone()) {
                    println!("  {:?}: {}", item.severity, item.message);
                }
            }
        }
    }
    Ok(())
}

fn credentials(cli: &Cli) -> anyhow::Result<(&str, Role, &str)> {
    let name = cli
        .name
        .as_deref()
        .context("--name (or CONSOLE_NAME) is required for this command")?;
    let role = cli
        .role
        .context("--role (or CONSOLE_ROLE) is required for this command")?;
    let passkey = cli
        .passkey
        .as_deref()
        .context("--passkey (or CONSOLE_PASSKEY) is required for this command")?;
    Ok((name, role, passkey))
}

/// Verify the caller without opening a session. An empty `allowed` list admits
/// every role.
fn session(cli: &Cli, console: &mut Console, allowed: &[Role]) -> anyhow::Result<SessionUser> {
    let (name, role, passkey) = credentials(cli)?;
    let user = console.verify_identity(name, role, passkey)?;
    if !allowed.is_empty() && !allowed.contains(&user.role) {
        return Err(PolicyError::RoleNotPermitted(user.role).into());
    }
    Ok(user)
}

fn parse_rating(value: &str) -> Result<f64, String> {
    let rating: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    grading::check_rating("manual", rating)
        .map_err(|_| "rating must be between 0 and 5".to_string())
}

fn report_review(outcome: Option<Outcome>, id: &str) {
    match outcome {
        Some(outcome) => println!("Transmission {id} {outcome:?}."),
        None => println!("Transmission {id} is no longer pending."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_arguments_stay_on_the_scale() {
        assert_eq!(parse_rating("4"), Ok(4.0));
        assert_eq!(parse_rating(" 0.5 "), Ok(0.5));
        assert!(parse_rating("9").is_err());
        assert!(parse_rating("-1").is_err());
        assert!(parse_rating("NaN").is_err());
        assert!(parse_rating("five").is_err());
    }
}
