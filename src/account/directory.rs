//! Registered users, keyed by username.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AccountError, StoreError};
use crate::store::{load_json, save_json, SessionStore};

use super::registration::{validate_registration, RegistrationRequest};

pub const USERS_KEY: &str = "users";
const MAX_CAS_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub student_id: Option<String>,
    pub role: Role,
}

/// What a user may see about themselves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub student_id: Option<String>,
    pub role: Role,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            student_id: user.student_id.clone(),
            role: user.role,
        }
    }
}

/// Hex SHA-256 of the password. Keeps plaintext out of the store only.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub struct UserDirectory {
    store: Arc<dyn SessionStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn load_users(&self) -> Result<(Vec<User>, u64), AccountError> {
        Ok(load_json::<Vec<User>>(self.store.as_ref(), USERS_KEY)?.unwrap_or_default())
    }

    pub fn register(&self, req: &RegistrationRequest) -> Result<User, AccountError> {
        validate_registration(req).map_err(AccountError::Invalid)?;

        let user = User {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            username: req.username.trim().to_string(),
            password_hash: hash_password(&req.password),
            email: req.email.trim().to_string(),
            phone_number: req.phone_number.clone().filter(|s| !s.trim().is_empty()),
            student_id: req.student_id.clone().filter(|s| !s.trim().is_empty()),
            role: Role::Member,
        };

        let mut attempt = 0;
        loop {
            let (mut users, version) = self.load_users()?;
            if users.iter().any(|u| u.username == user.username) {
                return Err(AccountError::UsernameTaken(user.username));
            }
            if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
                return Err(AccountError::Invalid(format!(
                    "Email {} is already registered",
                    user.email
                )));
            }
            users.push(user.clone());

            match save_json(self.store.as_ref(), USERS_KEY, &users, Some(version)) {
                Ok(_) => break,
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_CAS_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("registered user {}", user.username);
        Ok(user)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let (users, _) = self.load_users()?;
        let hash = hash_password(password);
        users
            .into_iter()
            .find(|u| u.username == username.trim() && u.password_hash == hash)
            .ok_or(AccountError::InvalidCredentials)
    }

    pub fn user(&self, username: &str) -> Result<Option<User>, AccountError> {
        let (users, _) = self.load_users()?;
        Ok(users.into_iter().find(|u| u.username == username))
    }

    /// Change an existing user's role.
    pub fn set_role(&self, username: &str, role: Role) -> Result<User, AccountError> {
        let mut attempt = 0;
        loop {
            let (mut users, version) = self.load_users()?;
            let user = match users.iter_mut().find(|u| u.username == username) {
                Some(user) => {
                    user.role = role;
                    user.clone()
                }
                None => return Err(AccountError::Invalid(format!("Unknown user {}", username))),
            };

            match save_json(self.store.as_ref(), USERS_KEY, &users, Some(version)) {
                Ok(_) => {
                    tracing::info!("{} is now {:?}", username, role);
                    return Ok(user);
                }
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_CAS_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn request(username: &str, email: &str) -> RegistrationRequest {
        RegistrationRequest {
            first_name: "Somchai".into(),
            last_name: "Kaewman".into(),
            username: username.into(),
            password: "012345".into(),
            email: email.into(),
            phone_number: Some("088-1111-1111".into()),
            student_id: Some(" ".into()),
        }
    }

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn register_then_login() {
        let users = directory();
        let user = users.register(&request("somchai_k", "somchai@uni.th")).unwrap();
        assert_eq!(user.role, Role::Member);
        assert_ne!(user.password_hash, "012345");
        assert_eq!(user.student_id, None);

        let logged_in = users.authenticate("somchai_k", "012345").unwrap();
        assert_eq!(logged_in, user);
        assert_eq!(
            UserProfile::from(&logged_in).phone_number.as_deref(),
            Some("088-1111-1111")
        );
    }

    #[test]
    fn wrong_password_or_unknown_user_fails() {
        let users = directory();
        users.register(&request("somchai_k", "somchai@uni.th")).unwrap();
        assert!(matches!(
            users.authenticate("somchai_k", "wrong!"),
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            users.authenticate("nobody", "012345"),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_username_and_email_are_rejected() {
        let users = directory();
        users.register(&request("somchai_k", "somchai@uni.th")).unwrap();

        assert!(matches!(
            users.register(&request("somchai_k", "other@uni.th")),
            Err(AccountError::UsernameTaken(_))
        ));
        assert!(matches!(
            users.register(&request("somchai_2", "SOMCHAI@uni.th")),
            Err(AccountError::Invalid(_))
        ));
        assert!(users.user("somchai_2").unwrap().is_none());
    }

    #[test]
    fn promote_existing_user_only() {
        let users = directory();
        users.register(&request("somchai_k", "somchai@uni.th")).unwrap();

        let admin = users.set_role("somchai_k", Role::Admin).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(users.user("somchai_k").unwrap().unwrap().role, Role::Admin);
        assert!(matches!(
            users.set_role("nobody", Role::Admin),
            Err(AccountError::Invalid(_))
        ));
    }

    #[test]
    fn invalid_request_is_not_stored() {
        let users = directory();
        assert!(matches!(
            users.register(&request("", "x@y.z")),
            Err(AccountError::Invalid(_))
        ));
        assert!(users.user("").unwrap().is_none());
    }
}
