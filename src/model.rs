//! Identity, profile and user types shared by the session store and routes.
//!
//! DESIGN
//! ======
//! The auth service owns identities and sessions; the `profiles` table owns
//! display name, role and department. `User` is the application projection
//! built from one or both of them, and `IdentityPolicy` holds the rules for
//! building it (role guessing, the admin-email override, the registration
//! email domain).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ROLE
// =============================================================================

/// Authorization dimension. Decides which dashboard a user may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Researcher,
    GrantOffice,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Researcher, Role::GrantOffice, Role::Admin];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::GrantOffice => "grant_office",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "researcher" => Some(Self::Researcher),
            "grant_office" => Some(Self::GrantOffice),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// =============================================================================
// AUTH SERVICE TYPES
// =============================================================================

/// Free-form metadata attached to an identity at signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Identity as issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Session tokens plus the identity they belong to. Never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until `access_token` expires, as reported at issue time.
    pub expires_in: Option<u64>,
    pub identity: AuthIdentity,
}

// =============================================================================
// PROFILE / USER
// =============================================================================

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Stored verbatim; may hold a value `Role::from_str` does not know.
    pub role: String,
    pub department: Option<String>,
    pub profile_image: Option<String>,
}

/// Which source the visible `User` was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStage {
    /// Derived from session metadata only; role may be a guess.
    Basic,
    /// Overwritten from the `profiles` row.
    Enriched,
}

/// Application-level user projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// `None` when the stored role is not one the portal recognizes.
    pub role: Option<Role>,
    pub department: Option<String>,
    pub profile_image: Option<String>,
}

// =============================================================================
// IDENTITY POLICY
// =============================================================================

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@institution.edu";
pub const DEFAULT_EMAIL_DOMAIN: &str = "@institution.edu";

/// Rules for turning identities and profiles into users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPolicy {
    /// Identity always promoted to `Role::Admin`. Compared case-insensitively.
    pub admin_email: String,
    /// Required suffix for self-service registration, including the `@`.
    pub email_domain: String,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self { admin_email: DEFAULT_ADMIN_EMAIL.into(), email_domain: DEFAULT_EMAIL_DOMAIN.into() }
    }
}

impl IdentityPolicy {
    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        !self.admin_email.is_empty() && email.trim().eq_ignore_ascii_case(&self.admin_email)
    }

    #[must_use]
    pub fn email_allowed(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        let domain = self.email_domain.to_ascii_lowercase();
        email.len() > domain.len() && email.ends_with(&domain)
    }

    fn apply_override(&self, email: &str, role: Option<Role>) -> Option<Role> {
        if self.is_admin_email(email) { Some(Role::Admin) } else { role }
    }

    /// First-stage user built synchronously from session metadata.
    ///
    /// A missing metadata role is guessed as researcher; an unrecognized one
    /// stays `None`.
    #[must_use]
    pub fn basic_user(&self, identity: &AuthIdentity) -> User {
        let meta = &identity.user_metadata;
        let guessed = match meta.role.as_deref() {
            Some(raw) => Role::from_str(raw),
            None => Some(Role::Researcher),
        };
        User {
            id: identity.id,
            name: meta
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| name_from_email(&identity.email)),
            email: identity.email.clone(),
            role: self.apply_override(&identity.email, guessed),
            department: meta.department.clone(),
            profile_image: meta.avatar_url.clone(),
        }
    }

    /// Second-stage user: the profile row wins, identity id is kept.
    #[must_use]
    pub fn enriched_user(&self, basic: &User, profile: &Profile) -> User {
        let email = if profile.email.is_empty() { basic.email.clone() } else { profile.email.clone() };
        User {
            id: basic.id,
            name: if profile.name.trim().is_empty() { basic.name.clone() } else { profile.name.clone() },
            role: self.apply_override(&basic.email, Role::from_str(&profile.role)),
            email,
            department: profile.department.clone(),
            profile_image: profile.profile_image.clone().or_else(|| basic.profile_image.clone()),
        }
    }
}

fn name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("user")
        .to_owned()
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
