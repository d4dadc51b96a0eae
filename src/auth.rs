use tracing::{info, warn};

use crate::console::Console;
use crate::error::AuthError;
use crate::models::{AuditSeverity, Credential, NotificationSeverity, Role, SessionUser};

pub const ROOT_IDENTITY: &str = "Paulo Almorfe";
pub const ROOT_PASSKEY: &str = "123";
pub const ROOT_DEPARTMENT: &str = "Admin";

/// Flat equality check against the registry. Returns the department the
/// identity belongs to.
///
/// This is not a security boundary: passwords are stored and compared in
/// plain text.
pub fn check_credentials(
    registry: &[Credential],
    name: &str,
    role: Role,
    passkey: &str,
) -> Result<String, AuthError> {
    let name = name.trim();

    if registry.is_empty() && name != ROOT_IDENTITY {
        return Err(AuthError::EmptyRegistry);
    }

    if role == Role::Admin && name == ROOT_IDENTITY {
        return if passkey == ROOT_PASSKEY {
            Ok(ROOT_DEPARTMENT.to_string())
        } else {
            Err(AuthError::InvalidAdminPasskey)
        };
    }

    let mut matches = registry.iter().filter(|entry| entry.name == name).peekable();
    if matches.peek().is_none() {
        return Err(AuthError::UnrecognizedIdentity);
    }
    let entry = matches
        .find(|entry| entry.role == role)
        .ok_or(AuthError::RoleMismatch(role))?;
    if entry.password != passkey {
        return Err(AuthError::InvalidPasskey);
    }
    Ok(entry.department.clone())
}

impl Console {
    /// Check credentials without opening a session. Failures are audited.
    pub fn verify_identity(
        &mut self,
        name: &str,
        role: Role,
        passkey: &str,
    ) -> Result<SessionUser, AuthError> {
        let name = name.trim();
        match check_credentials(&self.registry, name, role, passkey) {
            Ok(department) => Ok(SessionUser::establish(name, role, &department)),
            Err(err) => {
                let who = if name.is_empty() { "Anonymous" } else { name };
                let details = match &err {
                    AuthError::EmptyRegistry => {
                        format!("System core empty. Failed access attempt by: {who}")
                    }
                    AuthError::InvalidAdminPasskey => {
                        format!("Invalid admin passkey attempt for identity: {ROOT_IDENTITY}")
                    }
                    AuthError::RoleMismatch(role) => {
                        format!("Role mismatch for {who}. Requested: {role}")
                    }
                    AuthError::InvalidPasskey => format!("Invalid passkey for user node: {who}"),
                    AuthError::UnrecognizedIdentity => {
                        format!("Unrecognized identity login attempt: {who}")
                    }
                };
                if err == AuthError::EmptyRegistry {
                    self.purge_stale_data();
                }
                warn!(identity = %who, role = %role, error = %err, "authentication failed");
                self.record_audit("", "AUTH_FAILURE", details, AuditSeverity::Warn);
                Err(err)
            }
        }
    }

    /// Establish a session: verify, then greet the user and audit the login.
    pub fn authenticate(
        &mut self,
        name: &str,
        role: Role,
        passkey: &str,
    ) -> Result<SessionUser, AuthError> {
        let user = self.verify_identity(name, role, passkey)?;
        self.notify(
            &user.id,
            format!("Welcome back, {}. Session established.", user.name),
            NotificationSeverity::Success,
        );
        self.record_audit(
            &user.name,
            "SESSION_INIT",
            format!("Authorized login with role: {}", user.role),
            AuditSeverity::Ok,
        );
        info!(user = %user.name, role = %user.role, "session established");
        Ok(user)
    }

    pub fn logout(&mut self, user: &SessionUser) {
        self.record_audit(
            &user.name,
            "SESSION_TERM",
            "User terminated secure connection",
            AuditSeverity::Info,
        );
    }
}
