//! Token acquisition against the Azure AD v2 endpoints.
//!
//! Silent acquisition redeems the refresh token of a saved session. A new
//! session is created with the device authorization grant (`--sign-in`).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::provider::TokenProvider;
use super::session::{SessionRecord, SessionStore};
use super::token::{Token, TokenOutcome};
use crate::config::Config;
use crate::error::AuthError;

/// Cached access tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECONDS: i64 = 300;
/// Grant type for redeeming a device code.
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Added to the polling interval when the authority answers `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Token provider backed by a saved session.
///
/// `acquire_token` never prompts: without a usable session it answers
/// `NeedsInteractive`. `start_device_sign_in` and `complete_device_sign_in`
/// create the session in the first place.
pub struct RefreshTokenProvider {
    client_id: String,
    token_url: String,
    device_code_url: String,
    scopes: Vec<String>,
    store: SessionStore,
    http_client: reqwest::Client,
    cached: Mutex<Option<Token>>,
}

impl RefreshTokenProvider {
    /// Create a provider from configuration.
    pub fn new(config: &Config, store: SessionStore) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(Self {
            client_id: config.oauth.client_id.clone(),
            token_url: config.token_url(),
            device_code_url: config.device_code_url(),
            scopes: config.oauth.scopes.scopes.clone(),
            store,
            http_client,
            cached: Mutex::new(None),
        })
    }

    /// Ask the authority for a device code. Show `message` to the user, then
    /// call `complete_device_sign_in`.
    pub async fn start_device_sign_in(&self) -> Result<DeviceAuthorization, AuthError> {
        let scope = self.scopes.join(" ");
        let params = [("client_id", self.client_id.as_str()), ("scope", scope.as_str())];

        debug!("Requesting device code at {}", self.device_code_url);

        let response = self
            .http_client
            .post(&self.device_code_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("Device code request failed: HTTP {} - {}", status, error_body);
            return Err(AuthError::Provider(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<DeviceAuthorization>()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    /// Poll the token endpoint until the user finishes signing in, then save the session.
    pub async fn complete_device_sign_in(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<SessionRecord, AuthError> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", DEVICE_CODE_GRANT),
            ("device_code", authorization.device_code.as_str()),
            ("scope", scope.as_str()),
        ];

        let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
        let mut interval = Duration::from_secs(authorization.interval);

        loop {
            if Instant::now() >= deadline {
                return Err(AuthError::SignInExpired);
            }
            tokio::time::sleep(interval).await;

            match self.token_request(&params).await {
                Ok(response) => return self.establish(response).await,
                Err(EndpointError::Rejected(code)) => match code.as_str() {
                    "authorization_pending" => debug!("Waiting for the user to sign in"),
                    "slow_down" => interval += SLOW_DOWN_STEP,
                    "authorization_declined" | "access_denied" => {
                        return Err(AuthError::SignInDeclined)
                    }
                    "expired_token" | "code_expired" => return Err(AuthError::SignInExpired),
                    other => return Err(AuthError::Provider(other.to_string())),
                },
                Err(EndpointError::Transport(reason)) => return Err(AuthError::Provider(reason)),
            }
        }
    }

    /// Save the account from a fresh sign-in and cache its access token.
    async fn establish(&self, response: TokenResponse) -> Result<SessionRecord, AuthError> {
        let claims = response
            .id_token
            .as_deref()
            .and_then(decode_id_token)
            .unwrap_or_default();
        let user_id = claims
            .oid
            .or_else(|| claims.preferred_username.clone())
            .ok_or_else(|| AuthError::Provider("Sign-in response has no account id".into()))?;

        let record = SessionRecord {
            user_id,
            user_email: claims.preferred_username,
            user_name: claims.name,
        };
        self.store
            .save(&record, response.refresh_token.as_deref())
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        *self.cached.lock().await = Some(access_token(&response));
        info!("Signed in as {}", record.user_email.as_deref().unwrap_or(&record.user_id));
        Ok(record)
    }

    /// POST a grant to the token endpoint.
    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, EndpointError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            debug!("Token endpoint returned HTTP {} - {}", status, error_body);
            return match status.as_u16() {
                400 | 401 => {
                    let code = serde_json::from_str::<OAuthErrorBody>(&error_body)
                        .map(|body| body.error)
                        .unwrap_or_else(|_| "invalid_request".to_string());
                    Err(EndpointError::Rejected(code))
                }
                code => Err(EndpointError::Transport(format!("HTTP {}", code))),
            };
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))
    }

    /// Exchange a refresh token for a new access token.
    async fn redeem(&self, refresh_token: &str) -> Result<TokenResponse, EndpointError> {
        let scope = self.scopes.join(" ");
        debug!("Redeeming refresh token at {}", self.token_url);
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ])
        .await
    }

    /// Fold a token response back into the saved session.
    fn remember(&self, mut record: SessionRecord, response: &TokenResponse) {
        if let Some(claims) = response.id_token.as_deref().and_then(decode_id_token) {
            if let Some(oid) = claims.oid {
                record.user_id = oid;
            }
            record.user_email = claims.preferred_username.or(record.user_email);
            record.user_name = claims.name.or(record.user_name);
        }

        if let Err(e) = self.store.save(&record, response.refresh_token.as_deref()) {
            warn!("Failed to persist refreshed session: {}", e);
        }
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn acquire_token(&self) -> TokenOutcome {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            let fresh = token
                .remaining()
                .is_some_and(|left| left.num_seconds() > REFRESH_MARGIN_SECONDS);
            if fresh {
                return TokenOutcome::Acquired(token.clone());
            }
        }

        let Some(record) = self.store.load() else {
            debug!("No saved session, interactive sign-in required");
            return TokenOutcome::NeedsInteractive;
        };

        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("Saved session has no refresh token");
            return TokenOutcome::NeedsInteractive;
        };

        match self.redeem(&refresh_token).await {
            Ok(response) => {
                let token = access_token(&response);
                self.remember(record, &response);
                *cached = Some(token.clone());
                info!("Token refreshed, expires in {}s", response.expires_in);
                TokenOutcome::Acquired(token)
            }
            Err(EndpointError::Rejected(code)) => {
                error!("Refresh token rejected: {}", code);
                *cached = None;
                if let Err(e) = self.store.clear() {
                    warn!("Failed to clear rejected session: {}", e);
                }
                TokenOutcome::NeedsInteractive
            }
            Err(EndpointError::Transport(reason)) => {
                error!("Token refresh failed: {}", reason);
                TokenOutcome::Failed(reason)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.cached.lock().await = None;
        self.store
            .clear()
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    async fn current_account_id(&self) -> Option<String> {
        self.store.load().map(|record| record.user_id)
    }
}

fn access_token(response: &TokenResponse) -> Token {
    let expires_at = Utc::now() + chrono::Duration::seconds(response.expires_in as i64);
    Token::with_expiry(response.access_token.clone(), expires_at)
}

enum EndpointError {
    /// The authority refused the grant; carries the OAuth `error` code.
    Rejected(String),
    Transport(String),
}

/// Device authorization response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub user_code: String,
    pub device_code: String,
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Seconds to wait between polls.
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    /// Ready-made instructions for the user.
    pub message: String,
}

fn default_poll_interval() -> u64 {
    5
}

/// Token response from Azure AD.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Account claims carried by the ID token.
#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    oid: Option<String>,
    preferred_username: Option<String>,
    name: Option<String>,
}

/// Read the claims segment of an ID token. The signature is not checked;
/// the values are only used to label the saved session.
fn decode_id_token(id_token: &str) -> Option<IdTokenClaims> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::test_support::temp_store;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(authority: &str) -> Config {
        let mut config = Config::from_toml_str(include_str!("../../config.toml")).unwrap();
        config.oauth.client_id = "client-1".into();
        config.oauth.tenant = "tenant-1".into();
        config.oauth.authority_host = authority.into();
        config
    }

    fn id_token(claims: serde_json::Value) -> String {
        format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap())
        )
    }

    fn signed_in_store(refresh_token: &str) -> SessionStore {
        let store = temp_store();
        store
            .save(
                &SessionRecord {
                    user_id: "user-42".into(),
                    ..Default::default()
                },
                Some(refresh_token),
            )
            .unwrap();
        store
    }

    fn device_authorization(expires_in: u64) -> DeviceAuthorization {
        DeviceAuthorization {
            user_code: "ABCD-EFGH".into(),
            device_code: "dev-1".into(),
            verification_uri: "https://microsoft.com/devicelogin".into(),
            expires_in,
            interval: 0,
            message: "Go to https://microsoft.com/devicelogin and enter ABCD-EFGH".into(),
        }
    }

    #[test]
    fn test_decode_id_token() {
        let token = id_token(serde_json::json!({
            "oid": "abc",
            "preferred_username": "alice@contoso.com",
            "name": "Alice"
        }));
        let claims = decode_id_token(&token).unwrap();
        assert_eq!(claims.oid.as_deref(), Some("abc"));
        assert_eq!(claims.name.as_deref(), Some("Alice"));

        assert!(decode_id_token("not-a-jwt").is_none());
    }

    #[tokio::test]
    async fn test_no_session_needs_interactive() {
        let provider =
            RefreshTokenProvider::new(&test_config("http://127.0.0.1:9"), temp_store()).unwrap();
        assert!(matches!(
            provider.acquire_token().await,
            TokenOutcome::NeedsInteractive
        ));
    }

    #[tokio::test]
    async fn test_refresh_updates_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "new-refresh",
                "id_token": id_token(serde_json::json!({
                    "oid": "user-42",
                    "preferred_username": "alice@contoso.com",
                    "name": "Alice"
                }))
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = signed_in_store("old-refresh");
        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), store.clone()).unwrap();
        let token = provider.acquire_token().await.into_result().unwrap();
        assert_eq!(token.secret(), "new-access");

        // Second call is served from the in-memory cache.
        let again = provider.acquire_token().await.into_result().unwrap();
        assert_eq!(again.secret(), "new-access");

        let record = store.load().unwrap();
        assert_eq!(record.user_name.as_deref(), Some("Alice"));
        assert_eq!(
            store.refresh_token().as_deref().map(String::as_str),
            Some("new-refresh")
        );
        assert_eq!(provider.current_account_id().await.as_deref(), Some("user-42"));

        provider.sign_out().await.unwrap();
        assert!(!store.has_prior_session());
        assert!(store.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let store = signed_in_store("revoked");
        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), store.clone()).unwrap();
        assert!(matches!(
            provider.acquire_token().await,
            TokenOutcome::NeedsInteractive
        ));
        assert!(!store.has_prior_session());
        assert!(store.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = signed_in_store("rt");
        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), store.clone()).unwrap();
        assert!(matches!(
            provider.acquire_token().await,
            TokenOutcome::Failed(reason) if reason == "HTTP 503"
        ));
        assert!(store.has_prior_session());
        let _ = store.clear();
    }

    #[tokio::test]
    async fn test_configured_timeout_applies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "late", "expires_in": 3600}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.http.timeout_seconds = 1;

        let store = signed_in_store("rt");
        let provider = RefreshTokenProvider::new(&config, store.clone()).unwrap();
        let started = std::time::Instant::now();
        assert!(matches!(
            provider.acquire_token().await,
            TokenOutcome::Failed(_)
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(store.has_prior_session());
        let _ = store.clear();
    }

    #[tokio::test]
    async fn test_start_device_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/devicecode"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("offline_access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_code": "ABCD-EFGH",
                "device_code": "dev-1",
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": 900,
                "message": "Go to https://microsoft.com/devicelogin and enter ABCD-EFGH"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), temp_store()).unwrap();
        let authorization = provider.start_device_sign_in().await.unwrap();
        assert_eq!(authorization.user_code, "ABCD-EFGH");
        assert_eq!(authorization.device_code, "dev-1");
        assert_eq!(authorization.interval, 5);
    }

    #[tokio::test]
    async fn test_device_sign_in_saves_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("device_code=dev-1"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "authorization_pending"})),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "expires_in": 3600,
                "refresh_token": "rt-1",
                "id_token": id_token(serde_json::json!({
                    "oid": "user-7",
                    "preferred_username": "bob@contoso.com",
                    "name": "Bob"
                }))
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = temp_store();
        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), store.clone()).unwrap();
        let record = provider
            .complete_device_sign_in(&device_authorization(900))
            .await
            .unwrap();

        assert_eq!(record.user_id, "user-7");
        assert_eq!(store.load(), Some(record));
        assert_eq!(store.refresh_token().as_deref().map(String::as_str), Some("rt-1"));

        // The new access token is cached, no further token requests.
        let token = provider.acquire_token().await.into_result().unwrap();
        assert_eq!(token.secret(), "at-1");
        let _ = store.clear();
    }

    #[tokio::test]
    async fn test_device_sign_in_declined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "authorization_declined"})),
            )
            .mount(&server)
            .await;

        let store = temp_store();
        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), store.clone()).unwrap();
        assert_eq!(
            provider
                .complete_device_sign_in(&device_authorization(900))
                .await
                .unwrap_err(),
            AuthError::SignInDeclined
        );
        assert!(!store.has_prior_session());
    }

    #[tokio::test]
    async fn test_device_code_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = RefreshTokenProvider::new(&test_config(&server.uri()), temp_store()).unwrap();
        assert_eq!(
            provider
                .complete_device_sign_in(&device_authorization(0))
                .await
                .unwrap_err(),
            AuthError::SignInExpired
        );
    }
}
