//! Authenticated phpIPAM API session
//!
//! Owns the HTTP client and the session token. Every request is wrapped in
//! the phpIPAM response envelope `{code, success, message, data}`; failed
//! envelopes become [`Error`] values, with not-found responses mapped to
//! [`Error::NotFound`].
//!
//! ## Token Handling
//!
//! The first request logs in through `POST /user/` with basic auth. When no
//! username is configured, the password is used as a static app token. A
//! `403 Token expired` response triggers one re-login and one re-send.

use std::time::Duration;

use phpipam_core::{Error, ProviderConfig, Result};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header carrying the session token
const TOKEN_HEADER: &str = "phpipam-token";

/// Messages phpIPAM uses for a missing entity
const NOT_FOUND_MESSAGES: &[&str] = &[
    "Invalid Id",
    "Address not found",
    "Section does not exist",
    "Not Found",
    "Invalid domain id",
    "No results",
];

/// phpIPAM response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

/// Logged-in API session
pub struct Session {
    config: ProviderConfig,
    base: Url,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base", &self.base.as_str())
            .field("username", &self.config.username)
            .field("password", &"<REDACTED>")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl Session {
    /// Build a session from validated configuration
    ///
    /// No request is sent until the first call.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let base = Url::parse(&config.base_url())
            .map_err(|e| Error::config(format!("invalid endpoint {:?}: {}", config.endpoint, e)))?;
        if config.insecure {
            warn!("TLS certificate verification is disabled for {}", config.endpoint);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base,
            client,
            token: RwLock::new(None),
        })
    }

    /// URL of `{base}/{segments...}/`
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config(format!("endpoint {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    /// URL with `filter_by`/`filter_value` query parameters
    pub fn filtered_url(&self, segments: &[&str], field: &str, value: &str) -> Result<Url> {
        let mut url = self.url(segments)?;
        url.query_pairs_mut()
            .append_pair("filter_by", field)
            .append_pair("filter_value", value);
        Ok(url)
    }

    /// Send a request and decode `data` into `T`
    pub async fn call<T: DeserializeOwned>(&self, method: Method, url: Url, body: Option<&Value>) -> Result<T> {
        let data = self.send(method, url, body).await?;
        Ok(serde_json::from_value(data.unwrap_or(Value::Null))?)
    }

    /// Send a request and decode a list, treating not-found as empty
    pub async fn search<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        match self.send(Method::GET, url, None).await {
            Ok(None) | Ok(Some(Value::Null)) => Ok(Vec::new()),
            Ok(Some(data)) => Ok(serde_json::from_value(data)?),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Send a request whose response data is ignored
    pub async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> Result<()> {
        self.send(method, url, body).await.map(|_| ())
    }

    /// Send a request, logging in first and refreshing an expired token once
    pub async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Option<Value>> {
        let token = self.token().await?;
        match self.send_once(method.clone(), url.clone(), body, &token).await {
            Err(Error::Api { code: 403, message }) if message == "Token expired" => {
                debug!("Session token expired, logging in again");
                let token = self.login().await?;
                self.send_once(method, url, body, &token).await
            }
            other => other,
        }
    }

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    async fn login(&self) -> Result<String> {
        let mut slot = self.token.write().await;

        let token = if self.config.username.is_empty() {
            self.config.password.clone()
        } else {
            let url = self.url(&["user"])?;
            debug!("Logging in to {} as {}", self.base, self.config.username);
            let response = self
                .client
                .post(url)
                .basic_auth(&self.config.username, Some(&self.config.password))
                .json(&serde_json::json!({}))
                .send()
                .await
                .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

            let data = read_envelope(response).await.map_err(|e| match e {
                Error::Api { code: 403 | 500, message } | Error::Authentication(message) => {
                    Error::auth(format!("Error logging into phpIPAM: {}", message))
                }
                other => other,
            })?;
            let out: TokenData = serde_json::from_value(data.unwrap_or(Value::Null))?;
            out.token
        };

        *slot = Some(token.clone());
        Ok(token)
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Option<Value>> {
        debug!("{} {}", method, url.path());
        let mut request = self
            .client
            .request(method, url)
            .header(TOKEN_HEADER, token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;
        read_envelope(response).await
    }
}

async fn read_envelope(response: reqwest::Response) -> Result<Option<Value>> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::http(format!("failed to read response: {}", e)))?;

    let envelope: Envelope = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(_) => {
            return Err(Error::http(format!("Non-API error ({}): {}", status, text)));
        }
    };

    if status.as_u16() >= 300 || !envelope.success {
        let code = if envelope.code == 0 { status.as_u16() } else { envelope.code };
        return Err(api_error(code, envelope.message));
    }
    Ok(envelope.data)
}

fn api_error(code: u16, message: String) -> Error {
    if code == 404 || NOT_FOUND_MESSAGES.iter().any(|m| message.contains(m)) {
        Error::not_found(message)
    } else if code == 401 {
        Error::auth(message)
    } else {
        Error::api(code, message)
    }
}
