// src/session.rs
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::model::{Person, UserRole};

pub const SUPERVISOR_USERNAME: &str = "supervisor";
pub const SUPERVISOR_PASSWORD: &str = "admin";
const TOKEN_LEN: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Por favor, insira o MASP.")]
    MissingMasp,
    #[error("Usuário ou senha inválidos.")]
    InvalidCredentials,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("This action requires the {0} role")]
    WrongRole(UserRole),
}

pub fn supervisor_identity() -> Person {
    Person {
        id: "supervisor".to_string(),
        name: "Supervisor".to_string(),
        masp: "ADMIN".to_string(),
        role: UserRole::Supervisor,
        subject: None,
        ch_regime_basico: None,
        ch_extra_classe: None,
        schedule: None,
    }
}

/// Opaque bearer token for one signed-in client.
pub fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// The token of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn normalize_masp(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Resolves a login form to an identity.
///
/// Teachers sign in with their MASP in both fields; punctuation is ignored
/// on both sides of the comparison.
pub fn authenticate(username: &str, password: &str, teachers: &[Person]) -> Result<Person, SessionError> {
    if username == SUPERVISOR_USERNAME && password == SUPERVISOR_PASSWORD {
        return Ok(supervisor_identity());
    }

    let user = normalize_masp(username);
    let pass = normalize_masp(password);
    if user.is_empty() || pass.is_empty() {
        return Err(SessionError::MissingMasp);
    }

    teachers
        .iter()
        .find(|t| {
            let stored = normalize_masp(&t.masp);
            stored == user && stored == pass
        })
        .cloned()
        .ok_or_else(|| {
            warn!("Rejected login attempt for '{}'", username);
            SessionError::InvalidCredentials
        })
}

/// The identity, if it has `role`.
pub fn require_role(session: Option<&Person>, role: UserRole) -> Result<&Person, SessionError> {
    match session {
        None => Err(SessionError::NotSignedIn),
        Some(person) if person.role == role => Ok(person),
        Some(_) => Err(SessionError::WrongRole(role)),
    }
}
