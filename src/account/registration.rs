use serde::Deserialize;

pub const MAX_USERNAME_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Registration request from the frontend
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Loose `x@y.z` shape check, nothing more
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.chars().any(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}

/// Validates a registration request
pub fn validate_registration(req: &RegistrationRequest) -> Result<(), String> {
    if req.first_name.trim().is_empty() {
        return Err("First name is required".to_string());
    }
    if req.last_name.trim().is_empty() {
        return Err("Last name is required".to_string());
    }

    let username = req.username.trim();
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        ));
    }
    if username.contains("..")
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err("Username may only contain letters, digits, '_', '.' and '-'".to_string());
    }

    if req.password.trim().is_empty() {
        return Err("Password is required".to_string());
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    let email = req.email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if !looks_like_email(email) {
        return Err("Email format is invalid".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            first_name: "Alice".into(),
            last_name: "Smith".into(),
            username: "alice".into(),
            password: "secret1".into(),
            email: "alice@uni.th".into(),
            phone_number: None,
            student_id: None,
        }
    }

    #[test]
    fn accepts_complete_request() {
        assert_eq!(validate_registration(&request()), Ok(()));
    }

    #[test]
    fn rejects_missing_fields() {
        let mut req = request();
        req.last_name = "  ".into();
        assert_eq!(
            validate_registration(&req),
            Err("Last name is required".to_string())
        );

        let mut req = request();
        req.password = "abc".into();
        assert!(validate_registration(&req).unwrap_err().contains("at least 6"));
    }

    #[test]
    fn rejects_bad_username_and_email() {
        let mut req = request();
        req.username = "al ice".into();
        assert!(validate_registration(&req).is_err());

        let mut req = request();
        req.username = "../root".into();
        assert!(validate_registration(&req).is_err());

        for email in ["alice", "alice@", "@uni.th", "alice@uni", "al ice@uni.th"] {
            let mut req = request();
            req.email = email.into();
            assert_eq!(
                validate_registration(&req),
                Err("Email format is invalid".to_string()),
                "{}",
                email
            );
        }
    }
}
