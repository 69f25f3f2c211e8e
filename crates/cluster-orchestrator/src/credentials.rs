//! Per-operation credential sessions.
//!
//! A [`Session`] is the capability every resource-manager subprocess is
//! spawned with: when impersonation is enabled it carries the OS identity of
//! the requesting principal and marks that a Kerberos ticket was issued for
//! it. Sessions are acquired at the start of an operation, released at its
//! end, and never reused.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CredentialConfig;
use crate::error::{OrchestratorError, Result};

/// OS-level identity subprocesses run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Identity of the current process.
    #[cfg(unix)]
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }

    /// Resolve the local account named `username`.
    #[cfg(unix)]
    pub fn lookup(username: &str) -> Result<Self> {
        if username.contains('\0') {
            return Err(OrchestratorError::auth(username, "principal contains a NUL byte"));
        }
        let user = nix::unistd::User::from_name(username)
            .map_err(|errno| {
                OrchestratorError::auth(username, format!("failed to look up local account: {errno}"))
            })?
            .ok_or_else(|| OrchestratorError::auth(username, "no local account"))?;

        Ok(Self {
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }

    #[cfg(not(unix))]
    pub fn lookup(username: &str) -> Result<Self> {
        Err(OrchestratorError::auth(
            username,
            "impersonation is only supported on unix",
        ))
    }
}

/// A scoped credential handle for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    principal: String,
    identity: Option<Identity>,
    ticket: bool,
}

impl Session {
    /// A no-op session: subprocesses run as the orchestrator itself.
    #[must_use]
    pub fn unimpersonated(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            identity: None,
            ticket: false,
        }
    }

    /// A session that runs subprocesses as `identity` without a ticket to release.
    #[must_use]
    pub fn as_identity(principal: impl Into<String>, identity: Identity) -> Self {
        Self {
            principal: principal.into(),
            identity: Some(identity),
            ticket: false,
        }
    }

    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// Whether a ticket was issued and must be destroyed on release.
    #[must_use]
    pub fn holds_ticket(&self) -> bool {
        self.ticket
    }

    /// Configure `cmd` to run under this session's identity.
    #[cfg(unix)]
    pub fn apply(&self, cmd: &mut Command) {
        if let Some(identity) = self.identity {
            cmd.uid(identity.uid).gid(identity.gid);
        }
    }

    #[cfg(not(unix))]
    pub fn apply(&self, _cmd: &mut Command) {}
}

/// Issues and tears down impersonation sessions.
#[derive(Debug, Clone)]
pub struct CredentialManager {
    config: CredentialConfig,
}

impl CredentialManager {
    #[must_use]
    pub fn new(config: CredentialConfig) -> Self {
        Self { config }
    }

    /// Keytab configured for ticket issuance.
    #[must_use]
    pub fn keytab(&self) -> &Path {
        &self.config.keytab
    }

    /// Acquire a session for `principal` using `keytab`.
    ///
    /// Returns a no-op session when impersonation is disabled.
    pub async fn acquire(&self, principal: &str, keytab: &Path) -> Result<Session> {
        if !self.config.impersonate {
            debug!(principal = %principal, "Impersonation disabled, using service identity");
            return Ok(Session::unimpersonated(principal));
        }

        if principal.trim().is_empty() {
            return Err(OrchestratorError::auth(principal, "principal is empty"));
        }

        tokio::fs::File::open(keytab).await.map_err(|e| {
            OrchestratorError::auth(
                principal,
                format!("keytab {} is unreadable: {e}", keytab.display()),
            )
        })?;

        let identity = Identity::lookup(principal)?;

        let mut cmd = Command::new(&self.config.kinit_bin);
        cmd.arg(principal)
            .arg("-k")
            .arg("-t")
            .arg(keytab)
            .stdin(Stdio::null());
        Session::as_identity(principal, identity).apply(&mut cmd);

        let output = cmd.output().await.map_err(|e| {
            OrchestratorError::auth(
                principal,
                format!("failed to run {}: {e}", self.config.kinit_bin.display()),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::auth(
                principal,
                format!(
                    "kinit exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        info!(principal = %principal, uid = identity.uid, "Acquired credential session");
        Ok(Session {
            principal: principal.to_string(),
            identity: Some(identity),
            ticket: true,
        })
    }

    /// Release `session`. Failures are logged and otherwise ignored.
    pub async fn release(&self, session: Session) {
        if !session.ticket {
            return;
        }

        let mut cmd = Command::new(&self.config.kdestroy_bin);
        cmd.stdin(Stdio::null());
        session.apply(&mut cmd);

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                debug!(principal = %session.principal, "Destroyed credential session");
            }
            Ok(output) => {
                warn!(
                    principal = %session.principal,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "kdestroy failed"
                );
            }
            Err(e) => {
                warn!(principal = %session.principal, error = %e, "Failed to run kdestroy");
            }
        }
    }
}
