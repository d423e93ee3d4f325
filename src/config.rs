//! Runtime configuration from the environment (and `.env`, loaded in `main`).

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory backing the file store (`BOOKING_DATA_DIR`)
    pub data_dir: PathBuf,
    /// Matched against the `X-Admin-Password` header (`ADMIN_PASSWORD`)
    pub admin_password: String,
    pub port: u16,
    /// Cookie signing key, at least 64 bytes (`SESSION_KEY`)
    pub session_key: Option<String>,
    /// Mark session cookies `Secure` (`SECURE_COOKIES`)
    pub secure_cookies: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let admin_password = lookup("ADMIN_PASSWORD").unwrap_or_else(|| {
            tracing::warn!("ADMIN_PASSWORD not set, using the default admin password");
            DEFAULT_ADMIN_PASSWORD.to_string()
        });

        let port = match lookup("PORT") {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("ignoring invalid PORT {:?}", raw);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            data_dir: lookup("BOOKING_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            admin_password,
            port,
            session_key: lookup("SESSION_KEY").filter(|k| !k.is_empty()),
            secure_cookies: lookup("SECURE_COOKIES")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// A positional port argument overrides `PORT`.
    pub fn with_port_arg(mut self, arg: Option<&String>) -> Self {
        if let Some(port) = arg.and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.admin_password, "admin");
        assert!(config.session_key.is_none());
        assert!(!config.secure_cookies);
    }

    #[test]
    fn environment_and_port_argument() {
        let config = config(&[
            ("PORT", "9000"),
            ("BOOKING_DATA_DIR", "/var/lib/courts"),
            ("ADMIN_PASSWORD", "s3cret"),
            ("SECURE_COOKIES", "true"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/courts"));
        assert_eq!(config.admin_password, "s3cret");
        assert!(config.secure_cookies);

        let config = config.with_port_arg(Some(&"7070".to_string()));
        assert_eq!(config.port, 7070);
        let config = config.with_port_arg(Some(&"not-a-port".to_string()));
        assert_eq!(config.port, 7070);
    }

    #[test]
    fn invalid_port_falls_back() {
        assert_eq!(config(&[("PORT", "http")]).port, DEFAULT_PORT);
    }
}
