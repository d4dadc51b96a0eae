use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::console::Console;
use crate::dashboard::Standing;
use crate::grading;
use crate::models::{AuditEntry, AuditSeverity, SessionUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSummary {
    pub action: String,
    pub count: usize,
    pub warnings: usize,
}

pub fn summarize_by_action(entries: &[AuditEntry]) -> Vec<ActionSummary> {
    let mut map: HashMap<&str, (usize, usize)> = HashMap::new();

    for entry in entries {
        let counts = map.entry(entry.action.as_str()).or_insert((0, 0));
        counts.0 += 1;
        if entry.severity == AuditSeverity::Warn {
            counts.1 += 1;
        }
    }

    let mut summaries: Vec<ActionSummary> = map
        .into_iter()
        .map(|(action, (count, warnings))| ActionSummary {
            action: action.to_string(),
            count,
            warnings,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
    summaries
}

/// Markdown rendition of the audit trail export.
pub fn build_audit_trail(
    entries: &[AuditEntry],
    authorizing_admin: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let summaries = summarize_by_action(entries);
    let mut output = String::new();

    let _ = writeln!(output, "# AA2000 Security and Technology Solutions Inc.");
    let _ = writeln!(output, "## ISO-9001 Audit Trail Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "- Date generated: {}", generated_at.to_rfc3339());
    let _ = writeln!(output, "- Authorizing admin: {authorizing_admin}");
    let _ = writeln!(output, "- Entries: {}", entries.len());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Action Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No audit entries recorded.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} entries ({} warnings)",
                summary.action, summary.count, summary.warnings
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trail");

    if entries.is_empty() {
        let _ = writeln!(output, "No audit entries recorded.");
    } else {
        let _ = writeln!(output, "| Timestamp | Action | Operator | Severity | Details |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for entry in entries {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:?} | {} |",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.action,
                entry.user,
                entry.severity,
                entry.details.replace('|', "\\|")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "_End of report. Confidential data._");
    output
}

impl Console {
    /// Render the audit trail as it stands, then record the export itself.
    pub fn export_audit_trail(
        &mut self,
        admin: &SessionUser,
        generated_at: DateTime<Utc>,
    ) -> String {
        let report = build_audit_trail(&self.audit_logs, &admin.name, generated_at);
        self.record_audit(
            &admin.name,
            "ADMIN_EXPORT",
            format!(
                "Generated ISO-9001 audit trail with {} entries",
                self.audit_logs.len()
            ),
            AuditSeverity::Info,
        );
        report
    }
}

pub fn build_standings_report(standings: &[Standing], generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Performance Standings");
    let _ = writeln!(output, "Generated {}", generated_at.to_rfc3339());
    let _ = writeln!(output);

    if standings.is_empty() {
        let _ = writeln!(output, "No validated submissions yet.");
        return output;
    }

    let eligible = standings
        .iter()
        .filter(|standing| standing.incentive_pct > 0.0)
        .count();
    let average =
        standings.iter().map(|s| s.final_score as f64).sum::<f64>() / standings.len() as f64;
    let _ = writeln!(
        output,
        "{} graded, average score {:.1}%, {} incentive-eligible",
        standings.len(),
        average,
        eligible
    );
    let _ = writeln!(output);

    for standing in standings {
        let _ = writeln!(
            output,
            "- {} score {}% (incentive {:.0}%), P {:.1} / Q {:.1} / R {:.1}: {}",
            standing.user_name,
            standing.final_score,
            standing.incentive_pct * 100.0,
            standing.ratings.performance(),
            standing.ratings.proficiency(),
            standing.ratings.professionalism(),
            grading::improvement_hint(&standing.ratings)
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Ratings;
    use crate::models::Role;

    fn entry(action: &str, severity: AuditSeverity) -> AuditEntry {
        AuditEntry {
            id: "ABCD1234".to_string(),
            timestamp: Utc::now(),
            user: "Paulo Almorfe".to_string(),
            action: action.to_string(),
            details: "details | with pipe".to_string(),
            severity,
        }
    }

    #[test]
    fn summaries_count_warnings_per_action() {
        let entries = vec![
            entry("AUTH_FAILURE", AuditSeverity::Warn),
            entry("AUTH_FAILURE", AuditSeverity::Warn),
            entry("SESSION_INIT", AuditSeverity::Ok),
        ];
        let summaries = summarize_by_action(&entries);
        assert_eq!(summaries[0].action, "AUTH_FAILURE");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].warnings, 2);
        assert_eq!(summaries[1].warnings, 0);
    }

    #[test]
    fn audit_trail_escapes_table_cells() {
        let report = build_audit_trail(
            &[entry("ADMIN_EXPORT", AuditSeverity::Info)],
            "Paulo Almorfe",
            Utc::now(),
        );
        assert!(report.contains("Authorizing admin: Paulo Almorfe"));
        assert!(report.contains("details \\| with pipe"));
        assert!(report.contains("| Info |"));
    }

    #[test]
    fn empty_inputs_render_placeholders() {
        assert!(build_audit_trail(&[], "root", Utc::now()).contains("No audit entries recorded."));
        assert!(build_standings_report(&[], Utc::now()).contains("No validated submissions yet."));
    }

    #[test]
    fn export_is_audited_after_rendering() {
        let mut console = Console::new();
        let admin = SessionUser::establish("Paulo Almorfe", Role::Admin, "Admin");
        console.record_audit("paulotecemp", "SESSION_INIT", "login", AuditSeverity::Ok);

        let report = console.export_audit_trail(&admin, Utc::now());
        assert!(report.contains("- Entries: 1"));
        assert!(!report.contains("ADMIN_EXPORT"));
        assert_eq!(console.audit_logs()[0].action, "ADMIN_EXPORT");
    }

    #[test]
    fn standings_report_lists_scores() {
        let ratings = Ratings::graded(5.0, 5.0, 4.0);
        let standings = vec![Standing {
            user_id: "cGF1bG90ZWNl".to_string(),
            user_name: "paulotecemp".to_string(),
            final_score: ratings.final_score(),
            incentive_pct: ratings.incentive_pct(),
            ratings,
        }];
        let report = build_standings_report(&standings, Utc::now());
        assert!(report.contains("1 graded, average score 96.0%, 1 incentive-eligible"));
        assert!(report.contains("paulotecemp score 96% (incentive 100%)"));
    }
}
