//! Authenticated storefront client.
//!
//! # Architecture
//!
//! Three remote operations back the claim pipeline: fetching a choice page's
//! embedded data, submitting a content selection, and redeeming one key.
//! They are exposed through the [`HumbleApi`] port so the orchestrator can
//! run against scripted fakes in tests; [`HumbleClient`] is the `reqwest`
//! implementation carrying the session cookie.
//!
//! No retries happen at this layer. A failed page fetch or selection aborts
//! the order it belongs to; a failed redemption is recorded per item by the
//! caller.

pub mod types;

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::html;
use types::ChoicePageData;

/// Id of the script element whose text is the choice page's data payload.
const CHOICE_DATA_SCRIPT_ID: &str = "webpack-monthly-product-data";

/// Name of the session cookie the storefront authenticates with.
const SESSION_COOKIE_NAME: &str = "_simpleauth_sess";

/// Cookie the CSRF token is issued through.
const CSRF_COOKIE_NAME: &str = "csrf_cookie";

/// Header the selection endpoint expects the CSRF token in.
const CSRF_HEADER: &str = "csrf-prevention-token";

/// Errors from storefront operations.
#[derive(Debug, Error)]
pub enum HumbleError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint returned a non-success status.
    #[error("Request failed with status {status}")]
    Status { status: u16 },

    /// Response body did not decode as the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Expected structure was missing from a fetched page.
    #[error("Missing expected data: {0}")]
    MissingData(String),

    /// Selection call rejected outside the idempotent already-done case.
    #[error("Selection rejected: {0}")]
    Selection(String),

    /// Redemption rejected or returned no usable value. Permanent failures
    /// (e.g. depleted keys) are not worth retrying within the session.
    #[error("Redemption failed: {message}")]
    Redeem { message: String, permanent: bool },

    /// Client is missing required configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Port over the storefront's claim operations.
pub trait HumbleApi {
    /// Fetch and parse one choice page's embedded data.
    fn fetch_choice_page(
        &self,
        choice_url: &str,
    ) -> impl std::future::Future<Output = Result<ChoicePageData, HumbleError>> + Send;

    /// Mark the given items as chosen against a bundle. Idempotent from the
    /// caller's perspective: an already-made choice reports success.
    fn choose_content(
        &self,
        gamekey: &str,
        parent_identifier: &str,
        identifiers: &[String],
    ) -> impl std::future::Future<Output = Result<(), HumbleError>> + Send;

    /// Redeem one key slot, returning the key value or a constructed gift
    /// link when `gift` is set.
    fn redeem_key(
        &self,
        keytype: &str,
        gamekey: &str,
        keyindex: u32,
        gift: bool,
    ) -> impl std::future::Future<Output = Result<String, HumbleError>> + Send;
}

/// `reqwest`-backed storefront client.
///
/// Holds the session cookie in a jar shared with the HTTP client, so the
/// CSRF cookie set by page responses can be read back for selection calls.
#[derive(Debug, Clone)]
pub struct HumbleClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    csrf_override: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ChooseContentResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Option<serde_json::Value>,
    #[serde(default)]
    error_msg: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RedeemResponse {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    giftkey: Option<String>,
    #[serde(default)]
    error_msg: Option<String>,
}

impl HumbleClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cookie is not configured, the base
    /// URL is invalid, or the HTTP client fails to build.
    pub fn new(config: &Config) -> Result<Self, HumbleError> {
        let session = config
            .session_cookie
            .as_ref()
            .ok_or_else(|| HumbleError::Config("HUMBLE_SESSION_COOKIE is not set".to_string()))?;
        let base = reqwest::Url::parse(&config.base_url)
            .map_err(|e| HumbleError::Config(format!("invalid base URL: {e}")))?;

        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(
            &format!(
                "{SESSION_COOKIE_NAME}={}; Path=/",
                session.expose_secret()
            ),
            &base,
        );

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            base_url: config.base_url.clone(),
            csrf_override: config.csrf_token.clone(),
        })
    }

    /// CSRF token for state-changing calls: the configured override, or the
    /// value of the `csrf_cookie` cookie captured from earlier responses.
    fn csrf_token(&self) -> Option<String> {
        if let Some(token) = &self.csrf_override {
            return Some(token.clone());
        }
        let base = reqwest::Url::parse(&self.base_url).ok()?;
        let header = self.jar.cookies(&base)?;
        let cookies = header.to_str().ok()?.to_string();
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE_NAME).then(|| value.to_string())
        })
    }
}

impl HumbleApi for HumbleClient {
    #[instrument(skip(self), fields(choice_url = %choice_url))]
    async fn fetch_choice_page(&self, choice_url: &str) -> Result<ChoicePageData, HumbleError> {
        let url = format!("{}/membership/{choice_url}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HumbleError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let payload = html::script_content(&body, CHOICE_DATA_SCRIPT_ID).ok_or_else(|| {
            HumbleError::MissingData("choice data element not found in page".to_string())
        })?;
        Ok(serde_json::from_str(&payload)?)
    }

    #[instrument(skip(self, identifiers), fields(gamekey = %gamekey, count = identifiers.len()))]
    async fn choose_content(
        &self,
        gamekey: &str,
        parent_identifier: &str,
        identifiers: &[String],
    ) -> Result<(), HumbleError> {
        let url = format!("{}/humbler/choosecontent", self.base_url);
        let mut form: Vec<(&str, &str)> = vec![
            ("gamekey", gamekey),
            ("parent_identifier", parent_identifier),
        ];
        for id in identifiers {
            form.push(("chosen_identifiers[]", id));
        }

        let mut request = self.client.post(&url).form(&form);
        if let Some(token) = self.csrf_token() {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HumbleError::Status {
                status: status.as_u16(),
            });
        }

        let data: ChooseContentResponse = response.json().await?;
        if data.success {
            return Ok(());
        }
        // "already made this choice" reports through errors.dummy; selection
        // is idempotent from our side, so that is success
        if data
            .errors
            .as_ref()
            .is_some_and(|errors| errors.get("dummy").is_some())
        {
            debug!("Selection already made");
            return Ok(());
        }

        Err(HumbleError::Selection(
            data.error_msg
                .or_else(|| data.errors.map(|e| e.to_string()))
                .unwrap_or_else(|| "failed to choose content".to_string()),
        ))
    }

    #[instrument(skip(self), fields(keytype = %keytype, gamekey = %gamekey, keyindex = keyindex, gift = gift))]
    async fn redeem_key(
        &self,
        keytype: &str,
        gamekey: &str,
        keyindex: u32,
        gift: bool,
    ) -> Result<String, HumbleError> {
        let url = format!("{}/humbler/redeemkey", self.base_url);
        let keyindex = keyindex.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("keytype", keytype),
            ("key", gamekey),
            ("keyindex", &keyindex),
        ];
        if gift {
            form.push(("gift", "true"));
        }

        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HumbleError::Status {
                status: status.as_u16(),
            });
        }

        let data: RedeemResponse = response.json().await?;
        if gift {
            data.giftkey
                .filter(|g| !g.is_empty())
                .map(|g| format!("{}/gift?key={}", self.base_url, urlencoding::encode(&g)))
                .ok_or_else(|| HumbleError::Redeem {
                    message: data
                        .error_msg
                        .unwrap_or_else(|| "no gift key in response".to_string()),
                    permanent: true,
                })
        } else {
            data.key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| HumbleError::Redeem {
                    message: data
                        .error_msg
                        .unwrap_or_else(|| "no key in response".to_string()),
                    permanent: true,
                })
        }
    }
}
