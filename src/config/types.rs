//! Configuration Types
//!
//! The on-disk config is a single flat JSON object.

use serde::{Deserialize, Serialize};

use crate::bastion::{parse_endpoint, BastionError};

/// Persisted client settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bastion web console, e.g. `https://jump.example.com`
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub username: String,

    /// `None` until the user has been asked whether to keep the password in
    /// the system keychain.
    #[serde(
        default,
        rename = "savePassword",
        skip_serializing_if = "Option::is_none"
    )]
    pub save_password: Option<bool>,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), BastionError> {
        parse_endpoint(&self.endpoint)?;
        if self.username.trim().is_empty() {
            return Err(BastionError::InvalidInput(
                "username must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Keychain account name: `<username>@<host[:port]>`.
    pub fn keychain_account(&self) -> Result<String, BastionError> {
        let url = parse_endpoint(&self.endpoint)?;
        let host = url.host_str().unwrap_or_default();
        Ok(match url.port() {
            Some(port) => format!("{}@{}:{}", self.username, host, port),
            None => format!("{}@{}", self.username, host),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let config = ClientConfig {
            endpoint: "https://jump.example.com".into(),
            username: "alice".into(),
            save_password: Some(true),
        };
        let json: serde_json::Value = serde_json::to_value(&config).unwrap();
        assert_eq!(json["endpoint"], "https://jump.example.com");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["savePassword"], true);
    }

    #[test]
    fn test_unset_save_password_is_omitted() {
        let config = ClientConfig {
            endpoint: "https://jump.example.com".into(),
            username: "alice".into(),
            save_password: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("savePassword"));

        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.save_password, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, ClientConfig::default());
    }

    #[test]
    fn test_validate() {
        let mut config = ClientConfig {
            endpoint: "https://jump.example.com".into(),
            username: "alice".into(),
            save_password: None,
        };
        assert!(config.validate().is_ok());

        config.endpoint = "https://jump.example.com/ui/".into();
        assert!(matches!(
            config.validate(),
            Err(BastionError::InvalidEndpoint(_))
        ));

        config.endpoint = "https://jump.example.com".into();
        config.username = " ".into();
        assert!(matches!(config.validate(), Err(BastionError::InvalidInput(_))));
    }

    #[test]
    fn test_keychain_account() {
        let mut config = ClientConfig {
            endpoint: "https://jump.example.com".into(),
            username: "alice".into(),
            save_password: Some(true),
        };
        assert_eq!(config.keychain_account().unwrap(), "alice@jump.example.com");

        config.endpoint = "http://10.0.0.5:8080".into();
        assert_eq!(config.keychain_account().unwrap(), "alice@10.0.0.5:8080");
    }
}
