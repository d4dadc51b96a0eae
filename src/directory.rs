use std::io::Read;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::ROOT_IDENTITY;
use crate::console::{Console, Slice};
use crate::error::{ImportError, PolicyError};
use crate::models::{
    session_id, ArchivedCredential, AuditSeverity, Credential, GradingConfig, Role, SessionUser,
};

pub const ADMIN_VERIFICATION_KEY: &str = "SECURE-AA2000";
pub const DEFAULT_NODE_PASSKEY: &str = "12345";

#[derive(Debug, Deserialize)]
struct RegistryRow {
    name: String,
    department: String,
    role: Role,
    password: Option<String>,
}

impl Console {
    /// Install the default accounts when the registry is empty. Returns whether
    /// anything was written.
    pub fn seed_defaults(&mut self) -> bool {
        if !self.registry.is_empty() {
            return false;
        }

        let accounts = [
            ("paulotecemp", "Technical", Role::Employee),
            ("paulotecsup", "Technical", Role::Supervisor),
            ("paulotechead", "Technical", Role::DeptHead),
            (ROOT_IDENTITY, "Admin", Role::Admin),
        ];
        self.registry = accounts
            .iter()
            .map(|(name, department, role)| Credential {
                name: name.to_string(),
                password: "123".to_string(),
                department: department.to_string(),
                role: *role,
            })
            .collect();

        self.members.clear();
        for department in &self.departments {
            self.members.insert(department.clone(), Vec::new());
        }
        for (name, department, _) in accounts {
            self.members
                .entry(department.to_string())
                .or_default()
                .push(name.to_string());
        }

        self.touch(Slice::Registry);
        self.touch(Slice::Members);
        info!(accounts = self.registry.len(), "seeded default registry");
        true
    }

    pub fn provision(
        &mut self,
        admin: &SessionUser,
        name: &str,
        role: Role,
        department: &str,
    ) -> Result<(), PolicyError> {
        let credential = self.checked_credential(name, role, department, None)?;
        self.push_credential(credential);
        self.record_audit(
            &admin.name,
            "ADMIN_PROVISION",
            format!("New node provisioned: {} ({role}) in {department}", name.trim()),
            AuditSeverity::Ok,
        );
        Ok(())
    }

    /// Rename an identity and/or change its role.
    pub fn edit_credential(
        &mut self,
        admin: &SessionUser,
        original: &str,
        new_name: &str,
        role: Role,
    ) -> Result<(), PolicyError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(PolicyError::MissingField("name"));
        }
        if !self.registry.iter().any(|entry| entry.name == original) {
            return Err(PolicyError::UnknownIdentity(original.to_string()));
        }

        for entry in self.registry.iter_mut().filter(|entry| entry.name == original) {
            entry.name = new_name.to_string();
            entry.role = role;
        }
        for names in self.members.values_mut() {
            for member in names
                .iter_mut()
                .filter(|member| member.as_str() == original)
            {
                *member = new_name.to_string();
            }
        }
        self.touch(Slice::Registry);
        self.touch(Slice::Members);
        self.record_audit(
            &admin.name,
            "ADMIN_OVERRIDE",
            format!("Modified node: {original} -> {new_name} ({role})"),
            AuditSeverity::Ok,
        );
        Ok(())
    }

    /// Move an identity to another department. Returns `false` when it is
    /// already there.
    pub fn transfer(
        &mut self,
        admin: &SessionUser,
        name: &str,
        target: &str,
    ) -> Result<bool, PolicyError> {
        if !self.departments.iter().any(|dept| dept == target) {
            return Err(PolicyError::UnknownDepartment(target.to_string()));
        }
        let registered = self
            .registry
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.department.clone())
            .ok_or_else(|| PolicyError::UnknownIdentity(name.to_string()))?;
        let source = self
            .members
            .iter()
            .find(|(_, names)| names.iter().any(|member| member == name))
            .map(|(dept, _)| dept.clone())
            .unwrap_or(registered);

        if source == target {
            return Ok(false);
        }

        if let Some(names) = self.members.get_mut(&source) {
            names.retain(|member| member != name);
        }
        self.members
            .entry(target.to_string())
            .or_default()
            .push(name.to_string());
        for entry in self.registry.iter_mut().filter(|entry| entry.name == name) {
            entry.department = target.to_string();
        }
        self.touch(Slice::Registry);
        self.touch(Slice::Members);
        self.record_audit(
            &admin.name,
            "ADMIN_TRANSFER",
            format!("Transferred {name} from {source} to {target}"),
            AuditSeverity::Info,
        );
        Ok(true)
    }

    pub fn add_department(
        &mut self,
        admin: &SessionUser,
        name: &str,
        admin_key: &str,
    ) -> Result<(), PolicyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PolicyError::MissingField("department"));
        }
        if admin_key != ADMIN_VERIFICATION_KEY {
            warn!(department = %name, "department creation denied");
            self.record_audit(
                &admin.name,
                "ADMIN_CONFIG",
                format!("Denied attempt to create department \"{name}\": Invalid Auth Key"),
                AuditSeverity::Warn,
            );
            return Err(PolicyError::InvalidAdminKey);
        }
        if self.departments.iter().any(|dept| dept == name) {
            return Err(PolicyError::DepartmentExists(name.to_string()));
        }

        self.departments.push(name.to_string());
        self.members.insert(name.to_string(), Vec::new());
        self.touch(Slice::Departments);
        self.touch(Slice::Members);
        self.record_audit(
            &admin.name,
            "ADMIN_CONFIG",
            format!("Structural update: New department \"{name}\" created"),
            AuditSeverity::Ok,
        );
        Ok(())
    }

    /// Revoke an identity: archive its credential and drop everything it owns.
    pub fn archive_user(&mut self, admin: &SessionUser, name: &str) -> Result<(), PolicyError> {
        let position = self
            .registry
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| PolicyError::UnknownIdentity(name.to_string()))?;
        let user_id = session_id(name);

        let credential = self.registry.remove(position);
        self.registry.retain(|entry| entry.name != name);
        self.archive.push(ArchivedCredential {
            credential,
            archived_at: Utc::now(),
            original_id: user_id.clone(),
        });
        for names in self.members.values_mut() {
            names.retain(|member| member != name);
        }
        self.touch(Slice::Registry);
        self.touch(Slice::Archive);
        self.touch(Slice::Members);

        self.purge_user(&user_id);
        self.record_audit(
            &admin.name,
            "ADMIN_ARCHIVE",
            format!("Node {name} moved to archives. Operational access revoked."),
            AuditSeverity::Warn,
        );
        Ok(())
    }

    pub fn set_grading_weights(
        &mut self,
        admin: &SessionUser,
        config: GradingConfig,
    ) -> Result<(), PolicyError> {
        let total = config.total();
        if total != 100 {
            self.record_audit(
                &admin.name,
                "ADMIN_CONFIG",
                format!(
                    "Rejected grading coefficients {}/{}/{}: total {total}%",
                    config.perf_weight, config.prof_weight, config.beh_weight
                ),
                AuditSeverity::Warn,
            );
            return Err(PolicyError::UnbalancedWeights { total });
        }

        self.grading = config;
        self.touch(Slice::GradingConfig);
        self.record_audit(
            &admin.name,
            "ADMIN_CONFIG",
            format!(
                "Grading coefficients set to {}/{}/{}",
                config.perf_weight, config.prof_weight, config.beh_weight
            ),
            AuditSeverity::Ok,
        );
        Ok(())
    }

    pub fn reset_grading_weights(&mut self, admin: &SessionUser) {
        self.grading = GradingConfig::default();
        self.touch(Slice::GradingConfig);
        self.record_audit(
            &admin.name,
            "ADMIN_CONFIG",
            "Grading coefficients reset to system standard defaults (45/35/20)",
            AuditSeverity::Info,
        );
    }

    /// Bulk-provision identities from `name,department,role[,password]` rows.
    /// Rows whose name and role are already registered are skipped. Every row
    /// is checked before any is inserted, so a bad row leaves the registry
    /// untouched.
    pub fn import_registry<R: Read>(
        &mut self,
        admin: &SessionUser,
        source: R,
    ) -> Result<usize, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        let mut staged: Vec<Credential> = Vec::new();

        for (index, result) in reader.deserialize::<RegistryRow>().enumerate() {
            let row = result?;
            let known = |entry: &Credential| entry.name == row.name && entry.role == row.role;
            if self.registry.iter().any(known) || staged.iter().any(known) {
                continue;
            }
            let credential = self
                .checked_credential(&row.name, row.role, &row.department, row.password)
                .map_err(|source| ImportError::Row {
                    row: index + 1,
                    source,
                })?;
            staged.push(credential);
        }

        let inserted = staged.len();
        for credential in staged {
            self.push_credential(credential);
        }
        if inserted > 0 {
            self.record_audit(
                &admin.name,
                "ADMIN_PROVISION",
                format!("Bulk import provisioned {inserted} nodes"),
                AuditSeverity::Ok,
            );
        }
        Ok(inserted)
    }

    fn checked_credential(
        &self,
        name: &str,
        role: Role,
        department: &str,
        password: Option<String>,
    ) -> Result<Credential, PolicyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PolicyError::MissingField("name"));
        }
        if !self.departments.iter().any(|dept| dept == department) {
            return Err(PolicyError::UnknownDepartment(department.to_string()));
        }
        Ok(Credential {
            name: name.to_string(),
            password: password
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_NODE_PASSKEY.to_string()),
            department: department.to_string(),
            role,
        })
    }

    fn push_credential(&mut self, credential: Credential) {
        let names = self
            .members
            .entry(credential.department.clone())
            .or_default();
        if !names.iter().any(|member| *member == credential.name) {
            names.push(credential.name.clone());
        }
        self.registry.push(credential);
        self.touch(Slice::Registry);
        self.touch(Slice::Members);
    }
}
