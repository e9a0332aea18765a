//! Operator authentication against the hosted auth provider.
//!
//! Every administrative command signs the operator in with email/password
//! first. The resulting ID token authorizes store calls; it is short-lived
//! and refreshed with the session's refresh token.

use freightdesk_core::AuthId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::config::{FirebaseConfig, OperatorCredentials};
use crate::error::AuthError;

const IDENTITY_HOST: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_HOST: &str = "https://securetoken.googleapis.com";

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// A signed-in operator.
#[derive(Debug, Clone)]
pub struct OperatorSession {
    /// Stable identifier issued by the auth provider.
    pub uid: AuthId,
    /// Email the operator signed in with.
    pub email: String,
    id_token: SecretString,
    refresh_token: SecretString,
    /// Unix timestamp when the ID token expires.
    pub expires_at: i64,
}

impl OperatorSession {
    /// Bearer token for store requests.
    #[must_use]
    pub const fn id_token(&self) -> &SecretString {
        &self.id_token
    }

    /// Check if the ID token has expired (with a 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(EXPIRY_BUFFER_SECS)
    }

    /// Check if the ID token will expire within the given number of seconds.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at - seconds
    }

    /// A session that never needs refreshing, for store emulators that
    /// accept a fixed owner token.
    #[must_use]
    pub fn emulator_owner() -> Self {
        Self {
            uid: AuthId::new("owner"),
            email: "owner@localhost".to_owned(),
            id_token: SecretString::from("owner"),
            refresh_token: SecretString::from("owner"),
            expires_at: i64::MAX,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    /// Token lifetime in seconds, as a decimal string.
    expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the auth provider's REST endpoints.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: SecretString,
    identity_base: String,
    token_base: String,
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("api_key", &"[REDACTED]")
            .field("identity_base", &self.identity_base)
            .field("token_base", &self.token_base)
            .finish_non_exhaustive()
    }
}

impl FirebaseAuth {
    /// Create an auth client, pointed at the emulator if one is configured.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &FirebaseConfig) -> Self {
        let (identity_host, token_host) = config.auth_emulator_host.as_ref().map_or_else(
            || (IDENTITY_HOST.to_owned(), SECURE_TOKEN_HOST.to_owned()),
            |host| {
                (
                    format!("http://{host}/identitytoolkit.googleapis.com"),
                    format!("http://{host}/securetoken.googleapis.com"),
                )
            },
        );

        Self {
            client,
            api_key: config.api_key.clone(),
            identity_base: format!("{identity_host}/v1"),
            token_base: format!("{token_host}/v1"),
        }
    }

    fn sign_in_url(&self) -> String {
        format!("{}/accounts:signInWithPassword", self.identity_base)
    }

    fn refresh_url(&self) -> String {
        format!("{}/token", self.token_base)
    }

    fn with_key(&self, endpoint: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| AuthError::InvalidResponse(format!("bad endpoint {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    /// Sign the operator in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignInFailed` if the provider rejects the
    /// credentials, `AuthError::Http` on transport failure.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_in(
        &self,
        credentials: &OperatorCredentials,
    ) -> Result<OperatorSession, AuthError> {
        let response = self
            .client
            .post(self.with_key(&self.sign_in_url())?)
            .json(&SignInRequest {
                email: credentials.email.as_str(),
                password: credentials.password.expose_secret(),
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(AuthError::SignInFailed(format!("HTTP {status}: {message}")));
        }

        let body: SignInResponse = response.json().await?;
        let session = OperatorSession {
            uid: AuthId::new(body.local_id),
            email: body
                .email
                .unwrap_or_else(|| credentials.email.as_str().to_owned()),
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
            expires_at: expiry_from_now(&body.expires_in)?,
        };

        debug!(uid = %session.uid, "Operator signed in");
        Ok(session)
    }

    /// Exchange the session's refresh token for a fresh ID token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RefreshFailed` if the refresh token is rejected.
    #[instrument(skip(self, session), fields(uid = %session.uid))]
    pub async fn refresh(&self, session: &OperatorSession) -> Result<OperatorSession, AuthError> {
        let response = self
            .client
            .post(self.with_key(&self.refresh_url())?)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(AuthError::RefreshFailed(format!("HTTP {status}: {message}")));
        }

        let body: RefreshResponse = response.json().await?;
        if body.user_id != session.uid.as_str() {
            return Err(AuthError::InvalidResponse(format!(
                "refresh returned user {} for session {}",
                body.user_id, session.uid
            )));
        }

        Ok(OperatorSession {
            uid: session.uid.clone(),
            email: session.email.clone(),
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
            expires_at: expiry_from_now(&body.expires_in)?,
        })
    }
}

fn expiry_from_now(expires_in: &str) -> Result<i64, AuthError> {
    let secs: i64 = expires_in
        .trim()
        .parse()
        .map_err(|_| AuthError::InvalidResponse(format!("bad expiresIn: {expires_in}")))?;
    Ok(chrono::Utc::now().timestamp() + secs)
}

async fn error_message(response: reqwest::Response) -> String {
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or(text)
}
