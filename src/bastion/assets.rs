//! Asset and system-user lookups
//!
//! Nothing is cached: permissions and asset lists change server-side, so
//! every call re-queries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::BastionError;
use super::login::LOGIN_PATH;
use super::session::BastionSession;

const ASSETS_PATH: &str = "/api/v1/assets/assets/";
const ASSET_PERMS_PATH: &str = "/api/v1/perms/users/assets/";

/// A connectable target machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub hostname: String,
    /// Node labels the asset is filed under
    #[serde(default, rename = "nodes_display")]
    pub nodes: Vec<String>,
}

/// A login identity (system user) permitted on an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct AssetPage {
    #[serde(default)]
    results: Vec<Asset>,
}

/// Pick the asset matching `hostname` out of a listing.
///
/// The server filters loosely, so a first result with a different hostname
/// is treated as inconsistent rather than silently accepted.
fn select_asset(hostname: &str, mut results: Vec<Asset>) -> Result<Option<Asset>, BastionError> {
    if results.is_empty() {
        return Ok(None);
    }

    let first = results.swap_remove(0);
    if first.hostname != hostname {
        return Err(BastionError::Inconsistent {
            expected: hostname.to_string(),
            actual: first.hostname,
        });
    }
    Ok(Some(first))
}

impl BastionSession {
    /// Look up an asset by exact hostname. `Ok(None)` when nothing matches.
    pub async fn find_asset_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<Asset>, BastionError> {
        if hostname.is_empty() {
            return Err(BastionError::InvalidInput(
                "hostname must not be empty".to_string(),
            ));
        }

        let mut url = self.url(ASSETS_PATH)?;
        url.query_pairs_mut()
            .append_pair("hostname", hostname)
            .append_pair("offset", "0")
            .append_pair("limit", "100")
            .append_pair("display", "1")
            .append_pair("draw", "1");

        let body = self.get_api(url, "list assets").await?;
        let page: AssetPage = serde_json::from_str(&body)
            .map_err(|e| BastionError::Protocol(format!("malformed asset listing: {}", e)))?;
        debug!(
            "Asset listing for {} returned {} result(s)",
            hostname,
            page.results.len()
        );

        select_asset(hostname, page.results)
    }

    /// System users the logged-in user may connect to `asset_id` as.
    ///
    /// An empty list is a valid answer: nothing is connectable.
    pub async fn list_remote_identities(
        &self,
        asset_id: &str,
    ) -> Result<Vec<RemoteIdentity>, BastionError> {
        let url = self.identities_url(asset_id)?;

        let body = self.get_api(url, "list system users").await?;
        serde_json::from_str(&body)
            .map_err(|e| BastionError::Protocol(format!("malformed system user listing: {}", e)))
    }

    /// `/api/v1/perms/users/assets/<asset_id>/system-users/` with the id
    /// kept to a single path segment.
    fn identities_url(&self, asset_id: &str) -> Result<reqwest::Url, BastionError> {
        if matches!(asset_id.trim(), "" | "." | "..") {
            return Err(BastionError::InvalidInput(format!("bad asset id {:?}", asset_id)));
        }

        let mut url = self.url(ASSET_PERMS_PATH)?;
        url.path_segments_mut()
            .map_err(|()| {
                BastionError::InvalidEndpoint("endpoint cannot take a path".to_string())
            })?
            .pop_if_empty()
            .push(asset_id)
            .push("system-users")
            .push("");
        Ok(url)
    }

    async fn get_api(&self, url: reqwest::Url, context: &'static str) -> Result<String, BastionError> {
        let response = self.client().get(url).send().await?;
        let status = response.status();
        let path = response.url().path().to_string();

        // Unauthenticated API calls bounce to the login form
        if path.starts_with(LOGIN_PATH) {
            return Err(BastionError::NotAuthenticated(path));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(BastionError::NotAuthenticated(format!(
                "{} (HTTP {})",
                path,
                status.as_u16()
            )));
        }
        if status != reqwest::StatusCode::OK {
            return Err(BastionError::HttpStatus {
                context,
                status: status.as_u16(),
                path,
            });
        }

        Ok(response.text().await?)
    }
}
