use chrono::Utc;
use tracing::{debug, info};

use crate::console::{
    default_members, prepend_capped, Console, Slice, ANNOUNCEMENT_CAP, HISTORY_CAP,
};
use crate::error::PolicyError;
use crate::grading::{self, ActivityEvidence, Ratings};
use crate::models::{
    short_id, Announcement, AuditSeverity, JobCorrections, NotificationSeverity, Outcome,
    SessionUser, Transmission, TransmissionDraft, TransmissionPatch,
};

pub const MIN_REPORT_LEN: usize = 20;
pub const FIELD_RESPONSE_TIME: &str = "312ms";
pub const FIELD_ACCURACY: &str = "100%";
pub const FIELD_UPTIME: &str = "100%";

/// A supervisor's ruling on a pending transmission.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Validate {
        ratings: Ratings,
        corrections: JobCorrections,
        comment: String,
    },
    Reject {
        justification: String,
    },
}

impl Decision {
    pub fn outcome(&self) -> Outcome {
        match self {
            Decision::Validate { .. } => Outcome::Validated,
            Decision::Reject { .. } => Outcome::Rejected,
        }
    }

    fn check(&self) -> Result<(), PolicyError> {
        match self {
            Decision::Reject { justification } if justification.trim().is_empty() => {
                Err(PolicyError::MissingJustification("rejection"))
            }
            Decision::Validate {
                corrections,
                comment,
                ..
            } if !corrections.is_empty() && comment.trim().is_empty() => {
                Err(PolicyError::MissingJustification("manual data override"))
            }
            Decision::Validate { ratings, .. } => ratings.check_range(),
            _ => Ok(()),
        }
    }

    fn into_patch(self) -> TransmissionPatch {
        match self {
            Decision::Validate {
                ratings,
                corrections,
                comment,
            } => TransmissionPatch {
                corrections,
                supervisor_comment: Some(comment.trim())
                    .filter(|comment| !comment.is_empty())
                    .map(str::to_string),
                ratings: Some(ratings),
            },
            Decision::Reject { justification } => TransmissionPatch {
                supervisor_comment: Some(justification.trim().to_string()),
                ..Default::default()
            },
        }
    }
}

pub fn check_draft(draft: &TransmissionDraft) -> Result<(), PolicyError> {
    let required = [
        ("job id", &draft.job_id),
        ("client site", &draft.client_site),
        ("start time", &draft.start_time),
        ("end time", &draft.end_time),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(PolicyError::MissingField(field));
        }
    }
    if draft.project_report.chars().count() <= MIN_REPORT_LEN {
        return Err(PolicyError::ReportTooShort {
            min: MIN_REPORT_LEN,
        });
    }
    if draft.attachments.is_empty() {
        return Err(PolicyError::MissingEvidence);
    }
    Ok(())
}

impl Console {
    /// Accept an evidence-backed activity log into the pending queue.
    pub fn submit(
        &mut self,
        submitter: &SessionUser,
        draft: TransmissionDraft,
    ) -> Result<String, PolicyError> {
        check_draft(&draft)?;

        let suggestion = grading::suggest_ratings(&ActivityEvidence {
            job_type: &draft.job_type,
            system_status: &draft.system_status,
            checklist_completed: draft.checklist_completed,
            report_len: draft.project_report.chars().count(),
            attachment_count: draft.attachments.len(),
        });

        let transmission = Transmission {
            id: self.fresh_transmission_id(),
            user_id: submitter.id.clone(),
            user_name: submitter.name.clone(),
            timestamp: Utc::now(),
            job_id: draft.job_id,
            client_site: draft.client_site,
            job_type: draft.job_type,
            system_status: draft.system_status,
            start_time: Some(draft.start_time),
            end_time: Some(draft.end_time),
            project_report: Some(draft.project_report),
            attachments: draft.attachments,
            response_time: FIELD_RESPONSE_TIME.to_string(),
            accuracy: FIELD_ACCURACY.to_string(),
            uptime: FIELD_UPTIME.to_string(),
            supervisor_comment: None,
            ratings: Some(suggestion),
            status: None,
        };
        let id = transmission.id.clone();

        self.pending.push(transmission);
        self.touch(Slice::Pending);
        self.notify(
            &submitter.id,
            format!("Transmission {id} has been broadcast to the network."),
            NotificationSeverity::Info,
        );
        self.record_audit(
            &submitter.name,
            "DATA_TRANSMIT",
            format!("Node update {id} submitted for review"),
            AuditSeverity::Info,
        );
        info!(transmission = %id, submitter = %submitter.name, "transmission submitted");
        Ok(id)
    }

    /// `TX-` plus five base-36 characters, unused in pending and history.
    fn fresh_transmission_id(&self) -> String {
        loop {
            let candidate = format!("TX-{}", short_id(5));
            if self.find_transmission(&candidate).is_none() {
                return candidate;
            }
        }
    }

    pub fn find_pending(&self, id: &str) -> Option<&Transmission> {
        self.pending.iter().find(|item| item.id == id)
    }

    pub fn find_transmission(&self, id: &str) -> Option<&Transmission> {
        self.find_pending(id)
            .or_else(|| self.history.iter().find(|item| item.id == id))
    }

    /// Move a pending transmission into history.
    ///
    /// Returns `Ok(None)` when `id` is no longer pending; a stale id is a benign
    /// race with another reviewer, not an error.
    pub fn review(
        &mut self,
        validator: &SessionUser,
        id: &str,
        decision: Decision,
    ) -> Result<Option<Outcome>, PolicyError> {
        decision.check()?;

        let Some(position) = self.pending.iter().position(|item| item.id == id) else {
            debug!(transmission = %id, "review skipped, transmission no longer pending");
            return Ok(None);
        };

        let outcome = decision.outcome();
        let mut transmission = self.pending.remove(position);
        transmission.apply(decision.into_patch());
        transmission.status = Some(outcome);

        let submitter_id = transmission.user_id.clone();
        let score = transmission.ratings.as_ref().map(Ratings::final_score);
        if outcome == Outcome::Validated {
            self.validated_stats
                .insert(submitter_id.clone(), transmission.stats());
            self.touch(Slice::ValidatedStats);
        }

        prepend_capped(&mut self.history, transmission, HISTORY_CAP);
        self.touch(Slice::Pending);
        self.touch(Slice::History);

        match outcome {
            Outcome::Validated => {
                self.notify(
                    &validator.id,
                    format!("Transmission {id} successfully validated."),
                    NotificationSeverity::Success,
                );
                self.notify(
                    &submitter_id,
                    format!(
                        "Your performance log {id} has been verified by {}.",
                        validator.name
                    ),
                    NotificationSeverity::Success,
                );
                self.record_audit(
                    &validator.name,
                    "VERIFY_SUCCESS",
                    format!(
                        "Supervisor validated Transmission {id}. Score: {}%",
                        score.unwrap_or_default()
                    ),
                    AuditSeverity::Ok,
                );
            }
            Outcome::Rejected => {
                self.notify(
                    &validator.id,
                    format!("Transmission {id} has been REJECTED."),
                    NotificationSeverity::Alert,
                );
                self.notify(
                    &submitter_id,
                    format!(
                        "Your performance log {id} was REJECTED by {}.",
                        validator.name
                    ),
                    NotificationSeverity::Alert,
                );
                self.record_audit(
                    &validator.name,
                    "VERIFY_REJECT",
                    format!("Supervisor rejected Transmission {id}"),
                    AuditSeverity::Warn,
                );
            }
        }

        info!(transmission = %id, outcome = ?outcome, validator = %validator.name, "transmission reviewed");
        Ok(Some(outcome))
    }

    pub fn post_announcement(
        &mut self,
        sender: &SessionUser,
        message: &str,
    ) -> Result<String, PolicyError> {
        let department = sender
            .department
            .clone()
            .ok_or(PolicyError::MissingDepartment)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(PolicyError::EmptyMessage);
        }

        let announcement = Announcement {
            id: short_id(9),
            department: department.clone(),
            sender_name: sender.name.clone(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        let id = announcement.id.clone();
        prepend_capped(&mut self.announcements, announcement, ANNOUNCEMENT_CAP);
        self.touch(Slice::Announcements);
        self.record_audit(
            &sender.name,
            "DEPT_BROADCAST",
            format!("Supervisor posted announcement to {department}"),
            AuditSeverity::Ok,
        );
        Ok(id)
    }

    pub fn delete_announcement(&mut self, actor: &SessionUser, id: &str) -> bool {
        let before = self.announcements.len();
        self.announcements.retain(|item| item.id != id);
        if self.announcements.len() == before {
            return false;
        }
        self.touch(Slice::Announcements);
        self.record_audit(
            &actor.name,
            "DEPT_BROADCAST_RM",
            "Supervisor removed broadcast",
            AuditSeverity::Info,
        );
        true
    }

    /// Owners may only dismiss notifications addressed to them.
    pub fn delete_notification(&mut self, owner: &SessionUser, id: &str) -> bool {
        let before = self.notifications.len();
        self.notifications
            .retain(|item| !(item.id == id && item.target_user_id == owner.id));
        let removed = self.notifications.len() != before;
        if removed {
            self.touch(Slice::Notifications);
        }
        removed
    }

    /// Clears workflow data left behind when the credential registry is empty.
    pub fn purge_stale_data(&mut self) {
        self.pending.clear();
        self.validated_stats.clear();
        self.audit_logs.clear();
        self.notifications.clear();
        self.members = default_members();
        for slice in [
            Slice::Pending,
            Slice::ValidatedStats,
            Slice::AuditLogs,
            Slice::Notifications,
            Slice::Members,
        ] {
            self.touch(slice);
        }
    }

    /// Drops every workflow record that belongs to `user_id`.
    pub fn purge_user(&mut self, user_id: &str) {
        self.pending.retain(|item| item.user_id != user_id);
        self.history.retain(|item| item.user_id != user_id);
        self.notifications
            .retain(|item| item.target_user_id != user_id);
        self.validated_stats.remove(user_id);
        for slice in [
            Slice::Pending,
            Slice::History,
            Slice::Notifications,
            Slice::ValidatedStats,
        ] {
            self.touch(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, Lifecycle, Role};

    fn employee() -> SessionUser {
        SessionUser::establish("paulotecemp", Role::Employee, "Technical")
    }

    fn supervisor() -> SessionUser {
        SessionUser::establish("paulotecsup", Role::Supervisor, "Technical")
    }

    fn draft() -> TransmissionDraft {
        TransmissionDraft {
            job_id: "J-2041".to_string(),
            client_site: "Ortigas Data Center".to_string(),
            job_type: "Installation".to_string(),
            start_time: "2026-03-01T08:00".to_string(),
            end_time: "2026-03-01T12:00".to_string(),
            system_status: "Operational".to_string(),
            project_report: "Mounted four cameras and verified signal strength.".to_string(),
            attachments: vec![Attachment {
                name: "site.jpg".to_string(),
                kind: "image/jpeg".to_string(),
                size: "88.2 KB".to_string(),
            }],
            checklist_completed: 6,
        }
    }

    fn validate(p: f64, q: f64, r: f64) -> Decision {
        Decision::Validate {
            ratings: Ratings::graded(p, q, r),
            corrections: JobCorrections::default(),
            comment: String::new(),
        }
    }

    #[test]
    fn draft_policy_rejects_incomplete_logs() {
        let mut missing_site = draft();
        missing_site.client_site = "  ".to_string();
        assert_eq!(
            check_draft(&missing_site),
            Err(PolicyError::MissingField("client site"))
        );

        let mut short = draft();
        short.project_report = "x".repeat(MIN_REPORT_LEN);
        assert_eq!(
            check_draft(&short),
            Err(PolicyError::ReportTooShort { min: MIN_REPORT_LEN })
        );

        let mut no_evidence = draft();
        no_evidence.attachments.clear();
        assert_eq!(check_draft(&no_evidence), Err(PolicyError::MissingEvidence));

        assert_eq!(check_draft(&draft()), Ok(()));
    }

    #[test]
    fn submit_queues_transmission_with_suggestion() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();

        let item = console.find_pending(&id).unwrap();
        assert!(id.starts_with("TX-"));
        assert_eq!(item.lifecycle(), Lifecycle::Pending);
        let ratings = item.ratings.as_ref().unwrap();
        assert_eq!(ratings.performance(), 4.5);
        assert_eq!(ratings.final_score(), 0);
        assert_eq!(console.notifications()[0].target_user_id, employee().id);
        assert_eq!(console.audit_logs()[0].action, "DATA_TRANSMIT");
    }

    #[test]
    fn validation_overwrites_stats_and_notifies_both_parties() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();

        let outcome = console.review(&supervisor(), &id, validate(5.0, 5.0, 4.0));
        assert_eq!(outcome, Ok(Some(Outcome::Validated)));
        assert!(console.pending().is_empty());
        assert_eq!(console.history()[0].lifecycle(), Lifecycle::Validated);

        let stats = &console.validated_stats()[&employee().id];
        assert_eq!(stats.ratings.as_ref().map(Ratings::final_score), Some(96));
        assert_eq!(stats.ratings.as_ref().map(Ratings::incentive_pct), Some(1.0));

        let targets: Vec<_> = console.notifications()[..2]
            .iter()
            .map(|n| (n.target_user_id.clone(), n.severity))
            .collect();
        assert!(targets.contains(&(employee().id, NotificationSeverity::Success)));
        assert!(targets.contains(&(supervisor().id, NotificationSeverity::Success)));
        assert_eq!(console.audit_logs()[0].action, "VERIFY_SUCCESS");
        assert_eq!(console.audit_logs()[0].severity, AuditSeverity::Ok);
    }

    #[test]
    fn second_review_is_a_noop() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();
        console
            .review(&supervisor(), &id, validate(5.0, 5.0, 5.0))
            .unwrap();
        let audit_len = console.audit_logs().len();

        let again = console.review(&supervisor(), &id, validate(1.0, 1.0, 1.0));
        assert_eq!(again, Ok(None));
        assert_eq!(console.history().len(), 1);
        assert_eq!(console.audit_logs().len(), audit_len);
        assert_eq!(
            console.validated_stats()[&employee().id]
                .ratings
                .as_ref()
                .map(Ratings::final_score),
            Some(100)
        );
    }

    #[test]
    fn rejection_leaves_validated_stats_alone() {
        let mut console = Console::new();
        let first = console.submit(&employee(), draft()).unwrap();
        console
            .review(&supervisor(), &first, validate(4.0, 4.0, 4.0))
            .unwrap();
        let before = console.validated_stats().clone();

        let second = console.submit(&employee(), draft()).unwrap();
        let outcome = console.review(
            &supervisor(),
            &second,
            Decision::Reject {
                justification: "Photos do not show the installed unit.".to_string(),
            },
        );

        assert_eq!(outcome, Ok(Some(Outcome::Rejected)));
        assert_eq!(console.validated_stats(), &before);
        assert_eq!(console.history()[0].id, second);
        assert_eq!(console.history()[0].lifecycle(), Lifecycle::Rejected);
        assert_eq!(
            console.history()[0].supervisor_comment.as_deref(),
            Some("Photos do not show the installed unit.")
        );
        assert_eq!(console.notifications()[0].severity, NotificationSeverity::Alert);
        assert_eq!(console.audit_logs()[0].severity, AuditSeverity::Warn);
    }

    #[test]
    fn rejection_without_justification_is_refused() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();
        let result = console.review(
            &supervisor(),
            &id,
            Decision::Reject {
                justification: "   ".to_string(),
            },
        );
        assert_eq!(result, Err(PolicyError::MissingJustification("rejection")));
        assert!(console.find_pending(&id).is_some());
        assert!(console.history().is_empty());
    }

    #[test]
    fn corrections_require_a_justification() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();
        let corrections = JobCorrections {
            job_id: Some("J-2042".to_string()),
            ..Default::default()
        };

        let refused = console.review(
            &supervisor(),
            &id,
            Decision::Validate {
                ratings: Ratings::graded(5.0, 5.0, 5.0),
                corrections: corrections.clone(),
                comment: String::new(),
            },
        );
        assert!(refused.is_err());

        console
            .review(
                &supervisor(),
                &id,
                Decision::Validate {
                    ratings: Ratings::graded(5.0, 5.0, 5.0),
                    corrections,
                    comment: "Job number typo".to_string(),
                },
            )
            .unwrap();
        assert_eq!(console.history()[0].job_id, "J-2042");
    }

    #[test]
    fn history_is_capped_newest_first() {
        let mut console = Console::new();
        for _ in 0..HISTORY_CAP + 3 {
            let id = console.submit(&employee(), draft()).unwrap();
            console
                .review(&supervisor(), &id, validate(3.0, 3.0, 3.0))
                .unwrap();
        }
        assert_eq!(console.history().len(), HISTORY_CAP);
        assert!(console.pending().is_empty());
    }

    #[test]
    fn announcements_need_department_and_text() {
        let mut console = Console::new();
        let mut nomad = supervisor();
        nomad.department = None;
        assert_eq!(
            console.post_announcement(&nomad, "hello"),
            Err(PolicyError::MissingDepartment)
        );
        assert_eq!(
            console.post_announcement(&supervisor(), "  "),
            Err(PolicyError::EmptyMessage)
        );

        let id = console
            .post_announcement(&supervisor(), "Toolbox meeting at 7am")
            .unwrap();
        assert_eq!(console.announcements()[0].department, "Technical");
        assert!(console.delete_announcement(&supervisor(), &id));
        assert!(!console.delete_announcement(&supervisor(), &id));
    }

    #[test]
    fn notifications_are_deleted_only_by_owner() {
        let mut console = Console::new();
        console.submit(&employee(), draft()).unwrap();
        let id = console.notifications()[0].id.clone();

        assert!(!console.delete_notification(&supervisor(), &id));
        assert!(console.delete_notification(&employee(), &id));
        assert!(console.notifications().is_empty());
    }

    #[test]
    fn purge_user_drops_all_owned_records() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();
        console
            .review(&supervisor(), &id, validate(5.0, 5.0, 5.0))
            .unwrap();
        console.submit(&employee(), draft()).unwrap();

        console.purge_user(&employee().id);
        assert!(console.pending().is_empty());
        assert!(console.history().is_empty());
        assert!(!console.validated_stats().contains_key(&employee().id));
        assert!(console
            .notifications()
            .iter()
            .all(|n| n.target_user_id != employee().id));
    }

    #[test]
    fn transmission_ids_are_unique_base36() {
        let mut console = Console::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3000 {
            let id = console.submit(&employee(), draft()).unwrap();
            let suffix = id.strip_prefix("TX-").unwrap();
            assert_eq!(suffix.len(), 5);
            assert!(suffix
                .chars()
                .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()));
            assert!(seen.insert(id));
        }
        assert_eq!(console.pending().len(), 3000);
    }

    #[test]
    fn blank_validation_comment_is_not_stored() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();
        console
            .review(&supervisor(), &id, validate(4.0, 4.0, 4.0))
            .unwrap();

        assert_eq!(console.history()[0].supervisor_comment, None);
        assert_eq!(
            console.validated_stats()[&employee().id].supervisor_comment,
            None
        );
    }

    #[test]
    fn out_of_range_ratings_are_refused() {
        let mut console = Console::new();
        let id = console.submit(&employee(), draft()).unwrap();

        let result = console.review(&supervisor(), &id, validate(9.0, 5.0, 5.0));

        assert_eq!(result, Err(PolicyError::RatingOutOfRange("performance")));
        assert!(console.find_pending(&id).is_some());
    }

    #[test]
    fn stale_purge_restores_default_departments() {
        let mut console = Console::new();
        console.seed_defaults();

        console.purge_stale_data();

        assert_eq!(console.members().len(), 5);
        assert!(console.members().values().all(|names| names.is_empty()));
    }
}
