//! Capability checks for the admin and notice-editor roles.
//!
//! Allow-lists come from configuration as comma-separated strings and are
//! parsed once into sets at startup; the per-request check is a set lookup.
//! Absent caller or empty lists always deny.

use crate::config::AuthConfig;
use crate::model::Caller;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("sign-in required")]
    Unauthenticated,
    #[error("not authorized")]
    PermissionDenied,
}

#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    admin_ids: HashSet<String>,
    admin_emails: HashSet<String>,
    editor_ids: HashSet<String>,
    editor_emails: HashSet<String>,
}

fn parse_id_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_email_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AuthPolicy {
    pub fn from_config(cfg: &AuthConfig) -> AuthPolicy {
        AuthPolicy {
            admin_ids: parse_id_list(&cfg.admin_user_ids),
            admin_emails: parse_email_list(&cfg.admin_emails),
            editor_ids: parse_id_list(&cfg.notice_editor_user_ids),
            editor_emails: parse_email_list(&cfg.notice_editor_emails),
        }
    }

    pub fn is_admin(&self, caller: &Caller) -> bool {
        if let Some(id) = caller.line_user_id.as_deref() {
            if self.admin_ids.contains(id) {
                return true;
            }
        }
        if let Some(email) = caller.email.as_deref() {
            if self.admin_emails.contains(email) {
                return true;
            }
        }
        false
    }

    /// Admins can always edit; otherwise the caller must appear in one of
    /// the notice-editor lists.
    pub fn can_edit_notice(&self, caller: &Caller) -> bool {
        if self.is_admin(caller) {
            return true;
        }
        if let Some(id) = caller.line_user_id.as_deref() {
            if self.editor_ids.contains(id) {
                return true;
            }
        }
        if let Some(email) = caller.email.as_deref() {
            if self.editor_emails.contains(email) {
                return true;
            }
        }
        false
    }

    /// Guard for admin operations. Returns the caller's handle for audit.
    pub fn require_admin(&self, caller: Option<&Caller>) -> Result<String, AuthError> {
        let caller = caller.ok_or(AuthError::Unauthenticated)?;
        if !self.is_admin(caller) {
            return Err(AuthError::PermissionDenied);
        }
        caller
            .handle()
            .map(str::to_string)
            .ok_or(AuthError::Unauthenticated)
    }

    /// Guard invoked before every notice transition.
    pub fn require_notice_editor(&self, caller: Option<&Caller>) -> Result<String, AuthError> {
        let caller = caller.ok_or(AuthError::Unauthenticated)?;
        if !self.can_edit_notice(caller) {
            return Err(AuthError::PermissionDenied);
        }
        caller
            .handle()
            .map(str::to_string)
            .ok_or(AuthError::Unauthenticated)
    }
}
