//! Role-based access control.
//!
//! Identities map 1:1 onto a closed set of roles; roles map onto permissions;
//! every action needs exactly one permission. The controller fails closed:
//! an unknown identity, the `none` role, or a role missing from the
//! permission table is always denied. Every decision is audited.

use crate::audit::{AuditEntry, AuditLog, Component, Outcome, Severity};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    User,
    /// Deny-all sentinel for known-bad identities
    None,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::Admin, Self::Analyst, Self::User, Self::None];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::User => "user",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Process,
    Delete,
    ManageKeys,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Process => "process",
            Self::Delete => "delete",
            Self::ManageKeys => "manage_keys",
        }
    }
}

/// Operator-visible action, each gated by one permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Scan,
    Ingest,
    Process,
    Archive,
    /// Simulated attack: overwrite archived ciphertext
    InjectFault,
    Recover,
    Verify,
    Retrieve,
    Reset,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Ingest => "ingest",
            Self::Process => "process",
            Self::Archive => "archive",
            Self::InjectFault => "hack",
            Self::Recover => "recover",
            Self::Verify => "verify",
            Self::Retrieve => "retrieve",
            Self::Reset => "reset",
        }
    }

    pub fn required_permission(&self) -> Permission {
        match self {
            Self::Scan | Self::Archive => Permission::Write,
            Self::Ingest | Self::Process => Permission::Process,
            Self::InjectFault | Self::Reset => Permission::Delete,
            Self::Recover => Permission::ManageKeys,
            Self::Verify | Self::Retrieve => Permission::Read,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in permissions of a role.
pub fn default_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &[
            Permission::Read,
            Permission::Write,
            Permission::Process,
            Permission::Delete,
            Permission::ManageKeys,
        ],
        Role::Analyst => &[Permission::Read, Permission::Write, Permission::Process],
        Role::User => &[Permission::Read],
        Role::None => &[],
    }
}

/// Role to permission-set table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable(BTreeMap<Role, BTreeSet<Permission>>);

impl Default for PermissionTable {
    fn default() -> Self {
        let table = [Role::Admin, Role::Analyst, Role::User]
            .into_iter()
            .map(|role| (role, default_permissions(role).iter().copied().collect()))
            .collect();
        Self(table)
    }
}

impl PermissionTable {
    /// Defaults with per-role replacements. The `none` role can never be
    /// granted anything.
    pub fn with_overrides(overrides: &BTreeMap<Role, BTreeSet<Permission>>) -> Self {
        let mut table = Self::default();
        for (role, permissions) in overrides {
            if *role == Role::None {
                tracing::warn!("Ignoring permission override for the deny-all role");
                continue;
            }
            table.0.insert(*role, permissions.clone());
        }
        table
    }

    pub fn permissions(&self, role: Role) -> Option<&BTreeSet<Permission>> {
        self.0.get(&role)
    }

    pub fn remove(&mut self, role: Role) {
        self.0.remove(&role);
    }
}

/// Static identity to role directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDirectory(BTreeMap<String, Role>);

impl Default for IdentityDirectory {
    fn default() -> Self {
        Self(
            [
                ("emanuele_admin", Role::Admin),
                ("bob_analyst", Role::Analyst),
                ("charlie_user", Role::User),
                ("eve_hacker", Role::None),
            ]
            .into_iter()
            .map(|(name, role)| (name.to_owned(), role))
            .collect(),
        )
    }
}

impl IdentityDirectory {
    pub fn from_map(map: BTreeMap<String, Role>) -> Self {
        Self(map)
    }

    pub fn role_of(&self, identity: &str) -> Option<Role> {
        self.0.get(identity).copied()
    }

    pub fn identities(&self) -> impl Iterator<Item = (&str, Role)> {
        self.0.iter().map(|(name, role)| (name.as_str(), *role))
    }
}

/// An authenticated operator bound to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: String,
    pub role: Role,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Session for `identity` without consulting a directory. Every
    /// orchestrator call re-authorizes the identity, so the stored role is
    /// informational.
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessController {
    directory: IdentityDirectory,
    permissions: PermissionTable,
    audit: AuditLog,
}

impl AccessController {
    pub fn new(directory: IdentityDirectory, permissions: PermissionTable, audit: AuditLog) -> Self {
        Self {
            directory,
            permissions,
            audit,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    /// Role of a usable identity, or why it is refused. Not audited.
    fn resolve(&self, identity: &str) -> std::result::Result<Role, String> {
        match self.directory.role_of(identity) {
            None => Err(format!("unknown identity '{identity}'")),
            Some(Role::None) => Err(format!("'{identity}' holds the deny-all role")),
            Some(role) => Ok(role),
        }
    }

    /// Resolve an identity to its role.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthorizationDenied`] for unknown identities and the
    /// `none` role.
    pub fn authenticate(&self, identity: &str) -> Result<Role> {
        match self.resolve(identity) {
            Ok(role) => {
                self.audit.record(
                    AuditEntry::new(
                        Component::Access,
                        Severity::Info,
                        format!("Authenticated '{identity}' as {role}"),
                    )
                    .identity(identity)
                    .outcome(Outcome::Granted),
                );
                Ok(role)
            }
            Err(reason) => {
                self.audit.record(
                    AuditEntry::new(
                        Component::Access,
                        Severity::Warning,
                        format!("Authentication failed: {reason}"),
                    )
                    .identity(identity)
                    .outcome(Outcome::Unauthenticated),
                );
                Err(PipelineError::AuthorizationDenied {
                    identity: identity.to_owned(),
                    action: "authenticate".to_owned(),
                })
            }
        }
    }

    /// Decide whether `identity` may perform `action`. Each decision leaves
    /// exactly one audit entry naming the identity, the action and the outcome.
    pub fn authorize(&self, identity: &str, action: Action) -> bool {
        let role = match self.resolve(identity) {
            Ok(role) => role,
            Err(reason) => {
                self.audit.record(
                    AuditEntry::new(
                        Component::Access,
                        Severity::Warning,
                        format!("Authentication failed: {reason}; denying {action}"),
                    )
                    .identity(identity)
                    .action(action.as_str())
                    .outcome(Outcome::Unauthenticated),
                );
                return false;
            }
        };

        let permission = action.required_permission();
        let Some(granted) = self.permissions.permissions(role) else {
            self.audit.record(
                AuditEntry::new(
                    Component::Access,
                    Severity::Error,
                    format!("Role '{role}' has no permission entry; denying {action}"),
                )
                .identity(identity)
                .action(action.as_str())
                .outcome(Outcome::Denied),
            );
            return false;
        };

        if granted.contains(&permission) {
            self.audit.record(
                AuditEntry::new(
                    Component::Access,
                    Severity::Info,
                    format!("Access granted: '{identity}' ({role}) may {action}"),
                )
                .identity(identity)
                .action(action.as_str())
                .outcome(Outcome::Granted),
            );
            true
        } else {
            self.audit.record(
                AuditEntry::new(
                    Component::Access,
                    Severity::Warning,
                    format!(
                        "Unauthorized: '{identity}' ({role}) lacks '{}' for {action}",
                        permission.as_str()
                    ),
                )
                .identity(identity)
                .action(action.as_str())
                .outcome(Outcome::Denied),
            );
            false
        }
    }

    /// Authorize or fail with a typed error.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthorizationDenied`] when [`Self::authorize`] says no.
    pub fn require(&self, session: &Session, action: Action) -> Result<()> {
        if self.authorize(&session.identity, action) {
            Ok(())
        } else {
            Err(PipelineError::AuthorizationDenied {
                identity: session.identity.clone(),
                action: action.as_str().to_owned(),
            })
        }
    }

    /// Open a session for an identity that authenticates.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthorizationDenied`] if authentication fails.
    pub fn login(&self, identity: &str) -> Result<Session> {
        let role = self.authenticate(identity)?;
        Ok(Session::new(identity, role))
    }
}

impl Default for AccessController {
    fn default() -> Self {
        Self::new(
            IdentityDirectory::default(),
            PermissionTable::default(),
            AuditLog::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_roles() {
        let controller = AccessController::default();

        assert!(controller.authorize("emanuele_admin", Action::Recover));
        assert!(controller.authorize("emanuele_admin", Action::Archive));
        assert!(controller.authorize("bob_analyst", Action::Process));
        assert!(!controller.authorize("bob_analyst", Action::Recover));
        assert!(controller.authorize("charlie_user", Action::Verify));
        assert!(!controller.authorize("charlie_user", Action::Archive));
    }

    #[test]
    fn test_sentinel_and_unknown_fail_authentication() {
        let controller = AccessController::default();

        assert!(matches!(
            controller.authenticate("eve_hacker"),
            Err(PipelineError::AuthorizationDenied { .. })
        ));
        assert!(controller.authenticate("mallory").is_err());
        assert!(!controller.authorize("eve_hacker", Action::InjectFault));
        assert!(controller.login("eve_hacker").is_err());
    }

    #[test]
    fn test_missing_role_entry_fails_closed() {
        let mut table = PermissionTable::default();
        table.remove(Role::Analyst);
        let controller = AccessController::new(IdentityDirectory::default(), table, AuditLog::new());

        assert!(!controller.authorize("bob_analyst", Action::Verify));
        let last = controller.audit().entries().pop().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.contains("no permission entry"));
    }

    #[test]
    fn test_overrides_cannot_arm_sentinel() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Role::None, BTreeSet::from([Permission::Delete]));
        overrides.insert(Role::User, BTreeSet::from([Permission::Read, Permission::Write]));
        let table = PermissionTable::with_overrides(&overrides);

        assert!(table.permissions(Role::None).is_none());
        assert!(table.permissions(Role::User).unwrap().contains(&Permission::Write));
    }

    #[test]
    fn test_every_decision_is_audited() {
        let controller = AccessController::default();
        controller.authorize("charlie_user", Action::Archive);
        controller.authorize("eve_hacker", Action::Archive);
        controller.authorize("mallory", Action::Archive);

        let entries = controller.audit().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].outcome, Some(Outcome::Denied));
        for (entry, identity) in entries.iter().zip(["charlie_user", "eve_hacker", "mallory"]) {
            assert_eq!(entry.identity.as_deref(), Some(identity));
            assert_eq!(entry.action.as_deref(), Some("archive"));
        }
        assert_eq!(entries[1].outcome, Some(Outcome::Unauthenticated));
        assert_eq!(entries[2].outcome, Some(Outcome::Unauthenticated));
    }

    #[test]
    fn test_login_audits_without_action() {
        let controller = AccessController::default();
        controller.login("emanuele_admin").unwrap();
        controller.login("eve_hacker").unwrap_err();

        let entries = controller.audit().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action.is_none()));
        assert_eq!(entries[1].outcome, Some(Outcome::Unauthenticated));
    }

    #[test]
    fn test_require_returns_typed_denial() {
        let controller = AccessController::default();
        let session = controller.login("charlie_user").unwrap();
        assert_eq!(session.role, Role::User);

        match controller.require(&session, Action::Recover) {
            Err(PipelineError::AuthorizationDenied { identity, action }) => {
                assert_eq!(identity, "charlie_user");
                assert_eq!(action, "recover");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_action_permissions() {
        assert_eq!(Action::Scan.required_permission(), Permission::Write);
        assert_eq!(Action::InjectFault.required_permission(), Permission::Delete);
        assert_eq!(Action::Recover.required_permission(), Permission::ManageKeys);
        assert_eq!(Action::Retrieve.required_permission(), Permission::Read);
    }
}
