//! jumpterm command-line client

mod cli;
mod prompt;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::warn;
use zeroize::Zeroizing;

use jumpterm_lib::bastion::{
    authenticate, parse_endpoint, BastionError, BastionSession, Credentials, LoginOutcome,
    RemoteIdentity, Resolvers,
};
use jumpterm_lib::config::{ClientConfig, ConfigStorage, Keychain};

use cli::{Cli, Target};
use prompt::{PromptCaptcha, PromptOtp};

/// Password prompts before giving up on the login
const MAX_LOGIN_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = jumpterm_lib::init_logging(cli.log_file.as_deref()) {
        eprintln!("failed to initialize logging: {}", e);
    }

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("{:#}", e);
            1
        }
    };

    // Local stdin is read on a blocking thread that never returns on its own
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let target = cli.target.as_deref().map(Target::parse).unwrap_or_default();

    let storage = ConfigStorage::new()?;
    let mut config = storage.load().await.context("failed to load config")?;
    let mut config_dirty = apply_overrides(&mut config, &cli)?;

    if config.endpoint.trim().is_empty() {
        config.endpoint = prompt::read_validated("Endpoint", |s| parse_endpoint(s).map(|_| ()))?;
        config_dirty = true;
    }
    if config.username.trim().is_empty() {
        config.username = prompt::read_validated("Username", non_empty)?;
        config_dirty = true;
    }
    config.validate()?;

    let keychain = Keychain::new();
    let account = config.keychain_account()?;

    let mut stored = if config.save_password == Some(true) {
        keychain.get(&account).unwrap_or_else(|e| {
            warn!("Keychain lookup failed: {}", e);
            eprintln!("{}", e);
            None
        })
    } else {
        None
    };

    let mut session = BastionSession::new(&config.endpoint)?;
    let resolvers = Resolvers {
        captcha: Some(&PromptCaptcha),
        otp: Some(&PromptOtp),
    };
    let mut attempt = 1;
    let password = loop {
        let from_keychain = stored.is_some();
        let password = match stored.take() {
            Some(password) => Zeroizing::new(password),
            None => Zeroizing::new(prompt::read_password("Password")?),
        };
        let credentials = Credentials::new(config.username.clone(), password.as_str());

        let retry = judge_attempt(authenticate(&mut session, &credentials, resolvers).await)?;
        let Some(reason) = retry else {
            println!("login success");
            break password;
        };
        if attempt >= MAX_LOGIN_ATTEMPTS {
            bail!("login failed: {}", reason);
        }
        eprintln!("login failed: {}", reason);
        if from_keychain {
            // The saved password no longer works
            if let Err(e) = keychain.delete(&account) {
                warn!("Failed to delete stale keychain entry: {}", e);
            }
        }
        attempt += 1;
    };

    let save_password = match config.save_password {
        Some(save) => save,
        None => {
            let save = prompt::confirm("Save password")?;
            config.save_password = Some(save);
            config_dirty = true;
            save
        }
    };

    if config_dirty {
        println!("saving config");
        storage.save(&config).await.context("failed to save config")?;
    }
    if save_password {
        if let Err(e) = keychain.store(&account, &password) {
            eprintln!("failed to save password: {}", e);
        }
    }

    let hostname = if target.hostname.is_empty() {
        prompt::read_validated("Hostname", non_empty)?
    } else {
        target.hostname
    };

    let asset = session
        .find_asset_by_hostname(&hostname)
        .await?
        .ok_or_else(|| anyhow!("no asset found"))?;

    let identities = session.list_remote_identities(&asset.id).await?;
    if identities.is_empty() {
        bail!("no system user found");
    }
    let identity = match choose_identity(&identities, target.system_user.as_deref())? {
        Some(identity) => identity,
        None => {
            let names: Vec<String> = identities.iter().map(|i| i.username.clone()).collect();
            &identities[prompt::select("Select system user", &names)?]
        }
    };

    println!("connecting {}@{}", identity.username, asset.hostname);
    let result = connect(&session, &asset, identity).await;
    println!("Connection closed");
    result
}

#[cfg(unix)]
async fn connect(
    session: &BastionSession,
    asset: &jumpterm_lib::bastion::Asset,
    identity: &RemoteIdentity,
) -> Result<()> {
    jumpterm_lib::terminal::connect_asset(session, asset, identity).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn connect(
    _session: &BastionSession,
    _asset: &jumpterm_lib::bastion::Asset,
    _identity: &RemoteIdentity,
) -> Result<()> {
    bail!("interactive sessions need a unix terminal")
}

/// Classify one login attempt: `Ok(None)` when authenticated, `Ok(Some(reason))`
/// when the user may try again, `Err` when the flow must stop.
fn judge_attempt(
    result: Result<LoginOutcome, BastionError>,
) -> Result<Option<String>, BastionError> {
    match result {
        Ok(LoginOutcome::Authenticated) => Ok(None),
        Ok(LoginOutcome::NeedsOtp { .. }) => {
            Ok(Some("one-time password was not accepted".to_string()))
        }
        Ok(LoginOutcome::Failed { detail }) => Ok(Some(detail)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(Some(e.to_string())),
    }
}

/// Fold command-line overrides into `config`; true when it changed.
fn apply_overrides(config: &mut ClientConfig, cli: &Cli) -> Result<bool> {
    let mut changed = false;

    if let Some(endpoint) = &cli.endpoint {
        parse_endpoint(endpoint)?;
        if config.endpoint != *endpoint {
            config.endpoint = endpoint.trim().to_string();
            changed = true;
        }
    }
    if let Some(username) = &cli.username {
        non_empty(username).map_err(|e| anyhow!(e))?;
        if config.username != *username {
            config.username = username.clone();
            changed = true;
        }
    }
    if cli.save_password && config.save_password != Some(true) {
        config.save_password = Some(true);
        changed = true;
    }

    Ok(changed)
}

fn non_empty(s: &str) -> Result<(), &'static str> {
    if s.trim().is_empty() {
        Err("must not be empty")
    } else {
        Ok(())
    }
}

/// The identity named by `requested`, the only identity, or `None` when the
/// user has to pick.
fn choose_identity<'a>(
    identities: &'a [RemoteIdentity],
    requested: Option<&str>,
) -> Result<Option<&'a RemoteIdentity>> {
    match requested {
        Some(name) => identities
            .iter()
            .find(|i| i.username == name)
            .map(Some)
            .ok_or_else(|| {
                let names: Vec<&str> = identities.iter().map(|i| i.username.as_str()).collect();
                anyhow!(
                    "no system user found (available options are: {})",
                    names.join(", ")
                )
            }),
        None if identities.len() == 1 => Ok(identities.first()),
        None => Ok(None),
    }
}
