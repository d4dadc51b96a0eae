use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::console::Console;
use crate::error::ParseError;
use crate::grading::Ratings;
use crate::models::{Announcement, Lifecycle, Notification, SessionUser, SystemStats, Transmission};

pub const ANNOUNCEMENT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTab {
    Pending,
    History,
    Rejected,
}

impl FromStr for QueueTab {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(QueueTab::Pending),
            "history" | "validated" => Ok(QueueTab::History),
            "rejected" => Ok(QueueTab::Rejected),
            _ => Err(ParseError {
                kind: "queue tab",
                value: value.to_string(),
            }),
        }
    }
}

/// Latest validated standing of one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub user_id: String,
    pub user_name: String,
    pub final_score: u32,
    pub incentive_pct: f64,
    pub ratings: Ratings,
}

/// Everything the employee view shows about its own record.
#[derive(Debug, Clone)]
pub struct EmployeeOverview<'a> {
    pub submissions: Vec<&'a Transmission>,
    pub has_pending: bool,
    pub stats: Option<&'a SystemStats>,
    pub incentive_payout: f64,
}

impl Console {
    /// Own submissions across pending and history, newest first.
    pub fn submissions_of(&self, user_id: &str) -> Vec<&Transmission> {
        let mut items: Vec<&Transmission> = self
            .pending
            .iter()
            .chain(self.history.iter())
            .filter(|item| item.user_id == user_id)
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items
    }

    pub fn employee_overview(&self, user: &SessionUser) -> EmployeeOverview<'_> {
        let stats = self.validated_stats.get(&user.id);
        EmployeeOverview {
            submissions: self.submissions_of(&user.id),
            has_pending: self.pending.iter().any(|item| item.user_id == user.id),
            stats,
            incentive_payout: incentive_payout(user, stats),
        }
    }

    /// Supervisor queue. History tabs only list items from members of
    /// `department`, resolved through the registry by submitter name.
    pub fn review_queue(&self, department: &str, tab: QueueTab) -> Vec<&Transmission> {
        let wanted = match tab {
            QueueTab::Pending => return self.pending.iter().collect(),
            QueueTab::History => Lifecycle::Validated,
            QueueTab::Rejected => Lifecycle::Rejected,
        };
        self.history
            .iter()
            .filter(|item| item.lifecycle() == wanted)
            .filter(|item| {
                self.registry
                    .iter()
                    .find(|entry| entry.name == item.user_name)
                    .is_some_and(|entry| entry.department == department)
            })
            .collect()
    }

    pub fn flagged_pending(&self) -> Vec<&Transmission> {
        self.pending.iter().filter(|item| item.is_flagged()).collect()
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<&Notification> {
        self.notifications
            .iter()
            .filter(|item| item.target_user_id == user_id)
            .collect()
    }

    /// Graded standings of every user with validated stats, best first.
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .validated_stats
            .iter()
            .filter_map(|(user_id, stats)| {
                let ratings = stats.ratings.clone()?;
                let user_name = self
                    .history
                    .iter()
                    .find(|item| &item.user_id == user_id)
                    .map(|item| item.user_name.clone())
                    .unwrap_or_else(|| user_id.clone());
                Some(Standing {
                    user_id: user_id.clone(),
                    user_name,
                    final_score: ratings.final_score(),
                    incentive_pct: ratings.incentive_pct(),
                    ratings,
                })
            })
            .collect();
        standings.sort_by(|a, b| {
            b.final_score
                .cmp(&a.final_score)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });
        standings
    }
}

pub fn incentive_payout(user: &SessionUser, stats: Option<&SystemStats>) -> f64 {
    let pct = stats
        .and_then(|stats| stats.ratings.as_ref())
        .map(Ratings::incentive_pct)
        .unwrap_or(0.0);
    user.incentive_target as f64 * pct
}

/// Department announcements newer than the 30-day window, newest first.
pub fn active_announcements<'a>(
    announcements: &'a [Announcement],
    department: &str,
    now: DateTime<Utc>,
) -> Vec<&'a Announcement> {
    let cutoff = now - Duration::days(ANNOUNCEMENT_WINDOW_DAYS);
    let mut active: Vec<&Announcement> = announcements
        .iter()
        .filter(|item| item.department == department && item.timestamp > cutoff)
        .collect();
    active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    active
}
