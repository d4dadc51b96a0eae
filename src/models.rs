use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;
use crate::grading::Ratings;

pub const FLAG_RESPONSE_MS: u32 = 250;
pub const FLAG_ACCURACY_PCT: f64 = 97.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Employee,
    Supervisor,
    #[serde(rename = "Department Head")]
    DeptHead,
    Admin,
    Executive,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Employee => "Employee",
            Role::Supervisor => "Supervisor",
            Role::DeptHead => "Department Head",
            Role::Admin => "Admin",
            Role::Executive => "Executive",
        }
    }

    /// Base salary and incentive target attached to a session for this role.
    pub fn compensation(self) -> (u64, u64) {
        match self {
            Role::Employee => (62_000, 12_000),
            Role::Supervisor => (88_000, 18_000),
            Role::DeptHead => (135_000, 45_000),
            Role::Admin => (105_000, 25_000),
            Role::Executive => (275_000, 125_000),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(|ch: char| ch == '-' || ch == '_', " ");
        match normalized.as_str() {
            "employee" => Ok(Role::Employee),
            "supervisor" => Ok(Role::Supervisor),
            "department head" | "dept head" => Ok(Role::DeptHead),
            "admin" => Ok(Role::Admin),
            "executive" => Ok(Role::Executive),
            _ => Err(ParseError {
                kind: "role",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
}

/// Parses `name[:type[:size]]`, the form the CLI accepts for evidence.
impl FromStr for Attachment {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(ParseError {
                kind: "attachment",
                value: value.to_string(),
            });
        }
        Ok(Attachment {
            name: name.to_string(),
            kind: parts.next().unwrap_or("application/octet-stream").to_string(),
            size: parts.next().unwrap_or("0.0 KB").to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Validated,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Validated,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub response_time: String,
    pub accuracy: String,
    pub uptime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings: Option<Ratings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transmission {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub client_site: String,
    pub job_type: String,
    pub system_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_report: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub response_time: String,
    pub accuracy: String,
    pub uptime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings: Option<Ratings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Outcome>,
}

impl Transmission {
    pub fn lifecycle(&self) -> Lifecycle {
        match self.status {
            None => Lifecycle::Pending,
            Some(Outcome::Validated) => Lifecycle::Validated,
            Some(Outcome::Rejected) => Lifecycle::Rejected,
        }
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            response_time: self.response_time.clone(),
            accuracy: self.accuracy.clone(),
            uptime: self.uptime.clone(),
            supervisor_comment: self.supervisor_comment.clone(),
            ratings: self.ratings.clone(),
        }
    }

    /// Slow response or low accuracy puts the item on the supervisor's watch list.
    pub fn is_flagged(&self) -> bool {
        let response_ms = leading_number(&self.response_time).unwrap_or(0.0);
        let accuracy = leading_number(&self.accuracy).unwrap_or(100.0);
        response_ms > FLAG_RESPONSE_MS as f64 || accuracy < FLAG_ACCURACY_PCT
    }

    pub fn apply(&mut self, patch: TransmissionPatch) {
        let JobCorrections {
            job_id,
            client_site,
            job_type,
            system_status,
        } = patch.corrections;
        if let Some(value) = job_id {
            self.job_id = value;
        }
        if let Some(value) = client_site {
            self.client_site = value;
        }
        if let Some(value) = job_type {
            self.job_type = value;
        }
        if let Some(value) = system_status {
            self.system_status = value;
        }
        if let Some(comment) = patch.supervisor_comment {
            self.supervisor_comment = Some(comment);
        }
        if let Some(ratings) = patch.ratings {
            self.ratings = Some(ratings);
        }
    }
}

/// Supervisor corrections to job metadata; `None` keeps the submitted value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCorrections {
    pub job_id: Option<String>,
    pub client_site: Option<String>,
    pub job_type: Option<String>,
    pub system_status: Option<String>,
}

impl JobCorrections {
    pub fn is_empty(&self) -> bool {
        self.job_id.is_none()
            && self.client_site.is_none()
            && self.job_type.is_none()
            && self.system_status.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransmissionPatch {
    pub corrections: JobCorrections,
    pub supervisor_comment: Option<String>,
    pub ratings: Option<Ratings>,
}

/// What an employee fills in before transmitting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransmissionDraft {
    pub job_id: String,
    pub client_site: String,
    pub job_type: String,
    pub start_time: String,
    pub end_time: String,
    pub system_status: String,
    pub project_report: String,
    pub attachments: Vec<Attachment>,
    pub checklist_completed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditSeverity {
    Info,
    Ok,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub details: String,
    #[serde(rename = "type")]
    pub severity: AuditSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationSeverity {
    Info,
    Success,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub target_user_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub severity: NotificationSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub department: String,
    pub sender_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub password: String,
    pub department: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedCredential {
    #[serde(flatten)]
    pub credential: Credential,
    pub archived_at: DateTime<Utc>,
    pub original_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingConfig {
    pub perf_weight: u32,
    pub prof_weight: u32,
    pub beh_weight: u32,
}

impl GradingConfig {
    pub fn total(&self) -> u32 {
        self.perf_weight + self.prof_weight + self.beh_weight
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            perf_weight: 45,
            prof_weight: 35,
            beh_weight: 20,
        }
    }
}

/// The identity attached to an established session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub base_salary: u64,
    pub incentive_target: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl SessionUser {
    pub fn establish(name: &str, role: Role, department: &str) -> Self {
        let (base_salary, incentive_target) = role.compensation();
        let handle = if name.is_empty() { role.label() } else { name };
        let display_name = if name.is_empty() {
            format!("User_{}", role.label())
        } else {
            name.to_string()
        };
        Self {
            id: session_id(handle),
            name: display_name,
            email: format!("{}@aa2001.com", handle.split_whitespace().collect::<String>()),
            role,
            base_salary,
            incentive_target,
            department: Some(department.to_string()),
        }
    }
}

/// Stable per-name identifier: the first 12 characters of the name's base64 form.
pub fn session_id(name: &str) -> String {
    STANDARD.encode(name.as_bytes()).chars().take(12).collect()
}

const ID_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `len` characters of `[A-Z0-9]` drawn from a random v4 uuid.
pub(crate) fn short_id(len: usize) -> String {
    let mut bits = Uuid::new_v4().as_u128();
    (0..len)
        .map(|_| {
            let ch = ID_ALPHABET[(bits % 36) as usize] as char;
            bits /= 36;
            ch
        })
        .collect()
}

fn leading_number(value: &str) -> Option<f64> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_truncated_base64() {
        assert_eq!(session_id("paulotecemp"), "cGF1bG90ZWNl");
        assert_eq!(session_id("ab"), "YWI=");
    }

    #[test]
    fn session_user_carries_role_compensation() {
        let user = SessionUser::establish("Paulo Almorfe", Role::Admin, "Admin");
        assert_eq!(user.email, "PauloAlmorfe@aa2001.com");
        assert_eq!(user.base_salary, 105_000);
        assert_eq!(user.incentive_target, 25_000);
        assert_eq!(user.department.as_deref(), Some("Admin"));
    }

    #[test]
    fn roles_parse_from_labels_and_aliases() {
        assert_eq!("Department Head".parse::<Role>(), Ok(Role::DeptHead));
        assert_eq!("dept-head".parse::<Role>(), Ok(Role::DeptHead));
        assert_eq!("SUPERVISOR".parse::<Role>(), Ok(Role::Supervisor));
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn attachment_parses_partial_descriptors() {
        let attachment: Attachment = "photo.jpg:image/jpeg:120.4 KB".parse().unwrap();
        assert_eq!(attachment.kind, "image/jpeg");
        assert_eq!(attachment.size, "120.4 KB");

        let bare: Attachment = "notes.txt".parse().unwrap();
        assert_eq!(bare.name, "notes.txt");
        assert!(":image/png".parse::<Attachment>().is_err());
    }

    #[test]
    fn transmission_json_uses_console_field_names() {
        let raw = r#"{
            "id": "TX-AB12C",
            "userId": "cGF1bG90ZWNl",
            "userName": "paulotecemp",
            "timestamp": "2026-03-01T08:30:00.000Z",
            "jobId": "J-100",
            "clientSite": "Makati Tower",
            "jobType": "Installation",
            "systemStatus": "Operational",
            "responseTime": "312ms",
            "accuracy": "100%",
            "uptime": "100%",
            "attachments": [{"name": "a.jpg", "type": "image/jpeg", "size": "1.0 KB"}],
            "status": "validated"
        }"#;
        let transmission: Transmission = serde_json::from_str(raw).unwrap();
        assert_eq!(transmission.lifecycle(), Lifecycle::Validated);
        assert_eq!(transmission.attachments[0].kind, "image/jpeg");

        let encoded = serde_json::to_value(&transmission).unwrap();
        assert_eq!(encoded["clientSite"], "Makati Tower");
        assert!(encoded.get("ratings").is_none());
    }

    #[test]
    fn flags_slow_or_inaccurate_items() {
        let mut transmission: Transmission = serde_json::from_value(serde_json::json!({
            "id": "TX-1", "userId": "u", "userName": "n",
            "timestamp": "2026-03-01T08:30:00Z", "jobId": "J", "clientSite": "S",
            "jobType": "Installation", "systemStatus": "Operational",
            "responseTime": "200ms", "accuracy": "99.5%", "uptime": "100%"
        }))
        .unwrap();
        assert!(!transmission.is_flagged());

        transmission.response_time = "312ms".to_string();
        assert!(transmission.is_flagged());

        transmission.response_time = "120ms".to_string();
        transmission.accuracy = "96%".to_string();
        assert!(transmission.is_flagged());
    }

    #[test]
    fn patch_overrides_only_supplied_fields() {
        let mut transmission: Transmission = serde_json::from_value(serde_json::json!({
            "id": "TX-1", "userId": "u", "userName": "n",
            "timestamp": "2026-03-01T08:30:00Z", "jobId": "J-1", "clientSite": "Old Site",
            "jobType": "Installation", "systemStatus": "Degraded",
            "responseTime": "200ms", "accuracy": "100%", "uptime": "100%"
        }))
        .unwrap();

        transmission.apply(TransmissionPatch {
            corrections: JobCorrections {
                client_site: Some("New Site".to_string()),
                ..Default::default()
            },
            supervisor_comment: Some("site name fixed".to_string()),
            ratings: Some(Ratings::graded(4.0, 4.0, 4.0)),
        });

        assert_eq!(transmission.client_site, "New Site");
        assert_eq!(transmission.job_id, "J-1");
        assert_eq!(transmission.system_status, "Degraded");
        assert_eq!(transmission.supervisor_comment.as_deref(), Some("site name fixed"));
        assert_eq!(transmission.ratings.map(|r| r.final_score()), Some(80));
    }
}
