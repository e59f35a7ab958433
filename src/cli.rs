//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Log into a bastion host and open a terminal on one of its assets.
#[derive(Debug, Parser)]
#[command(name = "jumpterm", version, about)]
pub struct Cli {
    /// Asset to connect to, optionally prefixed with the system user
    /// (`user@hostname`). Prompted for when omitted.
    pub target: Option<String>,

    /// Bastion web console URL; overrides and updates the saved config.
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Bastion account name; overrides and updates the saved config.
    #[arg(long, short = 'u', value_name = "NAME")]
    pub username: Option<String>,

    /// Keep the password in the system keychain without asking.
    #[arg(long)]
    pub save_password: bool,

    /// Append diagnostics to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Asset hostname plus the system user requested for it, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub system_user: Option<String>,
    pub hostname: String,
}

impl Target {
    /// Split `user@hostname`. A leading `@` is part of the hostname.
    pub fn parse(arg: &str) -> Self {
        match arg.find('@') {
            Some(idx) if idx > 0 => Self {
                system_user: Some(arg[..idx].to_string()),
                hostname: arg[idx + 1..].to_string(),
            },
            _ => Self {
                system_user: None,
                hostname: arg.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "jumpterm",
            "root@node1",
            "--endpoint",
            "https://jump.example.com",
            "-u",
            "alice",
            "--save-password",
        ])
        .unwrap();
        assert_eq!(cli.target.as_deref(), Some("root@node1"));
        assert_eq!(cli.endpoint.as_deref(), Some("https://jump.example.com"));
        assert_eq!(cli.username.as_deref(), Some("alice"));
        assert!(cli.save_password);
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn test_target_with_user() {
        assert_eq!(
            Target::parse("root@node1"),
            Target {
                system_user: Some("root".into()),
                hostname: "node1".into(),
            }
        );
    }

    #[test]
    fn test_target_without_user() {
        assert_eq!(Target::parse("node1").system_user, None);
        assert_eq!(Target::parse("node1").hostname, "node1");
        assert_eq!(Target::parse("@node1").hostname, "@node1");
    }

    #[test]
    fn test_target_splits_on_first_at() {
        let target = Target::parse("deploy@web@prod");
        assert_eq!(target.system_user.as_deref(), Some("deploy"));
        assert_eq!(target.hostname, "web@prod");
    }
}
