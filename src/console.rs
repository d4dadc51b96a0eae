use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::models::{
    short_id, Announcement, ArchivedCredential, AuditEntry, AuditSeverity, Credential,
    GradingConfig, Notification, NotificationSeverity, SystemStats, Transmission,
};

pub const HISTORY_CAP: usize = 500;
pub const AUDIT_CAP: usize = 500;
pub const NOTIFICATION_CAP: usize = 100;
pub const ANNOUNCEMENT_CAP: usize = 50;
pub const SYSTEM_ACTOR: &str = "SYSTEM";

pub const INITIAL_DEPARTMENTS: [&str; 5] =
    ["Technical", "Sales", "Marketing", "Admin", "Accounting"];

/// One independently persisted piece of console state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slice {
    Pending,
    History,
    ValidatedStats,
    AuditLogs,
    Notifications,
    Announcements,
    Registry,
    Archive,
    Members,
    Departments,
    GradingConfig,
}

impl Slice {
    pub const ALL: [Slice; 11] = [
        Slice::Pending,
        Slice::History,
        Slice::ValidatedStats,
        Slice::AuditLogs,
        Slice::Notifications,
        Slice::Announcements,
        Slice::Registry,
        Slice::Archive,
        Slice::Members,
        Slice::Departments,
        Slice::GradingConfig,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Slice::Pending => "pending_transmissions",
            Slice::History => "transmission_history",
            Slice::ValidatedStats => "validated_stats",
            Slice::AuditLogs => "audit_logs",
            Slice::Notifications => "notifications",
            Slice::Announcements => "announcements",
            Slice::Registry => "credential_registry",
            Slice::Archive => "archived_registry",
            Slice::Members => "admin_users",
            Slice::Departments => "admin_depts",
            Slice::GradingConfig => "grading_config",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slice| slice.suffix() == suffix)
    }
}

/// The whole application state, owned by a single controller.
///
/// Every mutation goes through a `Console` method, which marks the slices it
/// touched so the sync layer can persist exactly those.
#[derive(Debug, Clone)]
pub struct Console {
    pub(crate) pending: Vec<Transmission>,
    pub(crate) history: Vec<Transmission>,
    pub(crate) validated_stats: BTreeMap<String, SystemStats>,
    pub(crate) audit_logs: Vec<AuditEntry>,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) announcements: Vec<Announcement>,
    pub(crate) registry: Vec<Credential>,
    pub(crate) archive: Vec<ArchivedCredential>,
    pub(crate) members: BTreeMap<String, Vec<String>>,
    pub(crate) departments: Vec<String>,
    pub(crate) grading: GradingConfig,
    dirty: BTreeSet<Slice>,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            history: Vec::new(),
            validated_stats: BTreeMap::new(),
            audit_logs: Vec::new(),
            notifications: Vec::new(),
            announcements: Vec::new(),
            registry: Vec::new(),
            archive: Vec::new(),
            members: default_members(),
            departments: default_departments(),
            grading: GradingConfig::default(),
            dirty: BTreeSet::new(),
        }
    }
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[Transmission] {
        &self.pending
    }

    pub fn history(&self) -> &[Transmission] {
        &self.history
    }

    pub fn validated_stats(&self) -> &BTreeMap<String, SystemStats> {
        &self.validated_stats
    }

    pub fn audit_logs(&self) -> &[AuditEntry] {
        &self.audit_logs
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn announcements(&self) -> &[Announcement] {
        &self.announcements
    }

    pub fn registry(&self) -> &[Credential] {
        &self.registry
    }

    pub fn archive(&self) -> &[ArchivedCredential] {
        &self.archive
    }

    pub fn members(&self) -> &BTreeMap<String, Vec<String>> {
        &self.members
    }

    pub fn departments(&self) -> &[String] {
        &self.departments
    }

    pub fn grading_config(&self) -> GradingConfig {
        self.grading
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_slice_dirty(&self, slice: Slice) -> bool {
        self.dirty.contains(&slice)
    }

    pub fn take_dirty(&mut self) -> Vec<Slice> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub(crate) fn touch(&mut self, slice: Slice) {
        self.dirty.insert(slice);
    }

    pub fn encode(&self, slice: Slice) -> serde_json::Result<String> {
        match slice {
            Slice::Pending => serde_json::to_string(&self.pending),
            Slice::History => serde_json::to_string(&self.history),
            Slice::ValidatedStats => serde_json::to_string(&self.validated_stats),
            Slice::AuditLogs => serde_json::to_string(&self.audit_logs),
            Slice::Notifications => serde_json::to_string(&self.notifications),
            Slice::Announcements => serde_json::to_string(&self.announcements),
            Slice::Registry => serde_json::to_string(&self.registry),
            Slice::Archive => serde_json::to_string(&self.archive),
            Slice::Members => serde_json::to_string(&self.members),
            Slice::Departments => serde_json::to_string(&self.departments),
            Slice::GradingConfig => serde_json::to_string(&self.grading),
        }
    }

    /// Replace one slice wholesale with a persisted value. Missing or malformed
    /// values fall back to the slice default.
    pub fn decode(&mut self, slice: Slice, raw: Option<&str>) {
        match slice {
            Slice::Pending => self.pending = parse_or(slice, raw, Vec::new),
            Slice::History => self.history = parse_or(slice, raw, Vec::new),
            Slice::ValidatedStats => self.validated_stats = parse_or(slice, raw, BTreeMap::new),
            Slice::AuditLogs => self.audit_logs = parse_or(slice, raw, Vec::new),
            Slice::Notifications => self.notifications = parse_or(slice, raw, Vec::new),
            Slice::Announcements => self.announcements = parse_or(slice, raw, Vec::new),
            Slice::Registry => self.registry = parse_or(slice, raw, Vec::new),
            Slice::Archive => self.archive = parse_or(slice, raw, Vec::new),
            Slice::Members => self.members = parse_or(slice, raw, default_members),
            Slice::Departments => self.departments = parse_or(slice, raw, default_departments),
            Slice::GradingConfig => self.grading = parse_or(slice, raw, GradingConfig::default),
        }
        self.dirty.remove(&slice);
    }

    pub fn record_audit(
        &mut self,
        actor: &str,
        action: &str,
        details: impl Into<String>,
        severity: AuditSeverity,
    ) {
        let entry = AuditEntry {
            id: short_id(8),
            timestamp: Utc::now(),
            user: if actor.is_empty() { SYSTEM_ACTOR } else { actor }.to_string(),
            action: action.to_string(),
            details: details.into(),
            severity,
        };
        prepend_capped(&mut self.audit_logs, entry, AUDIT_CAP);
        self.touch(Slice::AuditLogs);
    }

    pub fn notify(
        &mut self,
        target_user_id: &str,
        message: impl Into<String>,
        severity: NotificationSeverity,
    ) {
        let notification = Notification {
            id: short_id(9),
            target_user_id: target_user_id.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            severity,
        };
        prepend_capped(&mut self.notifications, notification, NOTIFICATION_CAP);
        self.touch(Slice::Notifications);
    }
}

/// Newest-first append that silently drops the oldest entries past `cap`.
pub(crate) fn prepend_capped<T>(items: &mut Vec<T>, item: T, cap: usize) {
    items.insert(0, item);
    items.truncate(cap);
}

fn parse_or<T, F>(slice: Slice, raw: Option<&str>, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    let Some(raw) = raw else {
        return fallback();
    };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(slice = slice.suffix(), error = %err, "malformed persisted slice, using default");
            fallback()
        }
    }
}

fn default_departments() -> Vec<String> {
    INITIAL_DEPARTMENTS.iter().map(|dept| dept.to_string()).collect()
}

pub(crate) fn default_members() -> BTreeMap<String, Vec<String>> {
    INITIAL_DEPARTMENTS
        .iter()
        .map(|dept| (dept.to_string(), Vec::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_trail_keeps_newest_five_hundred() {
        let mut console = Console::new();
        for index in 0..=AUDIT_CAP {
            console.record_audit("tester", "TEST", format!("entry {index}"), AuditSeverity::Info);
        }

        assert_eq!(console.audit_logs().len(), AUDIT_CAP);
        assert_eq!(console.audit_logs()[0].details, "entry 500");
        assert_eq!(console.audit_logs()[AUDIT_CAP - 1].details, "entry 1");
    }

    #[test]
    fn notifications_cap_at_one_hundred() {
        let mut console = Console::new();
        for index in 0..150 {
            console.notify("u1", format!("n{index}"), NotificationSeverity::Info);
        }
        assert_eq!(console.notifications().len(), NOTIFICATION_CAP);
        assert_eq!(console.notifications()[0].message, "n149");
    }

    #[test]
    fn empty_actor_is_recorded_as_system() {
        let mut console = Console::new();
        console.record_audit("", "BOOT", "started", AuditSeverity::Info);
        assert_eq!(console.audit_logs()[0].user, SYSTEM_ACTOR);
    }

    #[test]
    fn malformed_slice_falls_back_to_default() {
        let mut console = Console::new();
        console.decode(Slice::Pending, Some("{not json"));
        assert!(console.pending().is_empty());

        console.decode(Slice::Departments, Some("[\"Ops\"]"));
        assert_eq!(console.departments(), ["Ops".to_string()]);
        console.decode(Slice::Departments, None);
        assert_eq!(console.departments().len(), INITIAL_DEPARTMENTS.len());
    }

    #[test]
    fn dirty_slices_drain_once() {
        let mut console = Console::new();
        console.record_audit("a", "X", "", AuditSeverity::Ok);
        console.notify("u", "hello", NotificationSeverity::Success);
        assert_eq!(console.take_dirty(), vec![Slice::AuditLogs, Slice::Notifications]);
        assert!(!console.is_dirty());
    }

    #[test]
    fn slices_round_trip_through_suffix() {
        for slice in Slice::ALL {
            assert_eq!(Slice::from_suffix(slice.suffix()), Some(slice));
        }
        assert_eq!(Slice::from_suffix("session"), None);
    }
}
