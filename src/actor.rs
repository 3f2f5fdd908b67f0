//! Actors and the identity-provider boundary.
//!
//! An [`Actor`] carries only its identity and role; privilege is derived from
//! the role every time it is asked for and is never persisted alongside it.
use super::error::ValidationError;
use super::types::{ActorId, TimeStamp};
use serde::Serialize;
use std::str::FromStr;

const USERNAME_MAX_LEN: usize = 150;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Collector,
}

/// The caller of an operation, as established by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

/// Who is asking. Unauthenticated callers see nothing and may write nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated(Actor),
}

/// Stored account record behind an [`Actor`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorRecord {
    #[n(0)]
    pub id: ActorId,
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub email: Option<String>,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorDraft {
    pub username: String,
    pub email: Option<String>,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Collector => "collector",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "collector" => Ok(Role::Collector),
            other => Err(ValidationError::new(
                "role",
                format!("\"{other}\" is not a valid choice."),
            )),
        }
    }
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

impl Caller {
    pub fn authenticated(actor: Actor) -> Self {
        Caller::Authenticated(actor)
    }

    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Caller::Anonymous => None,
            Caller::Authenticated(actor) => Some(actor),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.actor().is_some_and(Actor::is_privileged)
    }
}

impl From<Actor> for Caller {
    fn from(actor: Actor) -> Self {
        Caller::Authenticated(actor)
    }
}

impl ActorRecord {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

impl ActorDraft {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
        }
    }

    pub fn set_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ValidationError::new("username", "This field may not be blank."));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(ValidationError::new(
                "username",
                format!("Ensure this field has no more than {USERNAME_MAX_LEN} characters."),
            ));
        }
        if let Some(email) = &self.email {
            if !email.is_empty() && !email.contains('@') {
                return Err(ValidationError::new("email", "Enter a valid email address."));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_follows_role() {
        assert!(Actor::new(ActorId(1), Role::Admin).is_privileged());
        assert!(!Actor::new(ActorId(2), Role::Collector).is_privileged());
        assert!(!Caller::Anonymous.is_privileged());
    }

    #[test]
    fn role_parsing_rejects_unknown() {
        assert_eq!("collector".parse::<Role>().unwrap(), Role::Collector);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn draft_requires_username() {
        assert!(ActorDraft::new("  ").validate().is_err());
        assert!(ActorDraft::new("sam").set_email("not-an-email").validate().is_err());
        assert!(ActorDraft::new("sam").set_email("sam@example.com").validate().is_ok());
    }
}
