// src/google/auth.rs
//! Access tokens for the Drive and Sheets APIs
//!
//! - `ServiceAccountAuth`: signs an RS256 JWT with the key from the service
//!   account JSON and exchanges it for a short-lived access token.
//! - `UserOAuth`: installed-app flow with a loopback redirect; the authorized
//!   user token is cached in `token_file` and refreshed when it expires.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::redirect::LoopbackServer;
use super::{check_response, SyncError};
use crate::config::GOOGLE_SCOPES;
use crate::settings::{AuthMode, GoogleSyncSettings};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How long the installed-app flow waits for the browser redirect
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn scope_string() -> String {
    GOOGLE_SCOPES.join(" ")
}

async fn read_json_file<T: for<'de> Deserialize<'de>>(
    path: &Path,
    what: &'static str,
) -> Result<T, SyncError> {
    if !path.exists() {
        return Err(SyncError::MissingFile {
            what,
            path: path.to_path_buf(),
        });
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| SyncError::Json { what, source })
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn post_token_form(
    client: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, SyncError> {
    let response = client.post(token_uri).form(form).send().await?;
    let response = check_response("OAuth token", response).await?;
    Ok(response.json().await?)
}

// =============================================================================
// SERVICE ACCOUNT
// =============================================================================

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// Cached access token with expiration.
struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Authenticator that handles OAuth2 with service account credentials.
pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    client: Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Creates a new authenticator from a JSON key file path.
    pub async fn from_file(path: &Path, client: Client) -> Result<Self, SyncError> {
        let credentials = read_json_file(path, "Google credentials file").await?;
        Ok(Self {
            credentials,
            client,
            cached_token: RwLock::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String, SyncError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                let margin = Duration::from_secs(EXPIRY_MARGIN_SECS as u64);
                if token.expires_at > SystemTime::now() + margin {
                    return Ok(token.token.clone());
                }
            }
        }

        let response = self.fetch_new_token().await?;
        let lifetime = response.expires_in.unwrap_or(3600).max(0) as u64;

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(lifetime),
        });

        Ok(response.access_token)
    }

    async fn fetch_new_token(&self) -> Result<TokenResponse, SyncError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: scope_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        debug!("requesting service account token for {}", self.credentials.client_email);
        post_token_form(
            &self.client,
            &self.credentials.token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ],
        )
        .await
    }
}

// =============================================================================
// USER OAUTH (INSTALLED APP)
// =============================================================================

/// `client_secret.json` as downloaded from the Cloud Console
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Authorized user token, in the layout Google's client libraries use
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizedUserToken {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUserToken {
    fn new(config: &ClientConfig) -> Self {
        Self {
            token: None,
            refresh_token: None,
            token_uri: config.token_uri.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        }
    }

    /// A token without an expiry never expires
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired_at(now)
    }

    /// Cached token covers every scope we need
    pub fn has_scopes(&self) -> bool {
        GOOGLE_SCOPES
            .iter()
            .all(|scope| self.scopes.iter().any(|s| s == scope))
    }

    fn absorb(&mut self, response: TokenResponse) {
        self.token = Some(response.access_token);
        self.expiry = response
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
    }

    async fn save(&self, path: &Path) -> Result<(), SyncError> {
        let io_err = |source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SyncError::Json {
            what: "token file",
            source,
        })?;
        tokio::fs::write(path, json).await.map_err(io_err)
    }
}

/// User credentials obtained through the installed-app flow
pub struct UserOAuth {
    client: Client,
    token_path: PathBuf,
    token: Mutex<AuthorizedUserToken>,
}

impl UserOAuth {
    /// Load the cached token, refreshing it or running the consent flow as needed
    pub async fn from_files(
        client_secret_file: &Path,
        token_file: &Path,
        client: Client,
    ) -> Result<Self, SyncError> {
        let secret: ClientSecretFile =
            read_json_file(client_secret_file, "OAuth client secret file").await?;
        let config = secret
            .installed
            .or(secret.web)
            .ok_or_else(|| SyncError::OAuth("client secret has no 'installed' section".into()))?;

        let cached = if token_file.exists() {
            match read_json_file::<AuthorizedUserToken>(token_file, "token file").await {
                Ok(token) if token.has_scopes() => Some(token),
                Ok(_) => {
                    info!("Cached token lacks required scopes, asking for consent again");
                    None
                }
                Err(e) => {
                    warn!("Ignoring unreadable token file: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut token = cached.unwrap_or_else(|| AuthorizedUserToken::new(&config));
        let now = Utc::now();

        if token.is_expired_at(now) && token.refresh_token.is_some() {
            if let Err(e) = refresh(&client, &mut token).await {
                warn!("Token refresh failed, asking for consent again: {}", e);
                token.token = None;
            }
        }

        if !token.is_valid_at(Utc::now()) {
            let response = run_installed_flow(&client, &config).await?;
            token = AuthorizedUserToken::new(&config);
            token.absorb(response);
        }

        token.save(token_file).await?;

        Ok(Self {
            client,
            token_path: token_file.to_path_buf(),
            token: Mutex::new(token),
        })
    }

    /// Gets a valid access token, refreshing (and re-saving) if necessary.
    pub async fn access_token(&self) -> Result<String, SyncError> {
        let mut token = self.token.lock().await;
        if !token.is_valid_at(Utc::now()) {
            if token.refresh_token.is_none() {
                return Err(SyncError::OAuth(
                    "token expired and has no refresh token".into(),
                ));
            }
            refresh(&self.client, &mut token).await?;
            token.save(&self.token_path).await?;
        }
        token
            .token
            .clone()
            .ok_or_else(|| SyncError::OAuth("no access token".into()))
    }
}

async fn refresh(client: &Client, token: &mut AuthorizedUserToken) -> Result<(), SyncError> {
    let refresh_token = token
        .refresh_token
        .clone()
        .ok_or_else(|| SyncError::OAuth("no refresh token".into()))?;
    debug!("refreshing user OAuth token");
    let response = post_token_form(
        client,
        &token.token_uri,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", &token.client_id),
            ("client_secret", &token.client_secret),
        ],
    )
    .await?;
    token.absorb(response);
    Ok(())
}

/// Random URL-safe value tying the redirect to this flow
pub fn new_state() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Consent page URL for the installed-app flow
pub fn authorization_url(config: &ClientConfig, redirect_uri: &str, state: &str) -> String {
    let scope = scope_string();
    let params = [
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ]
    .iter()
    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
    .collect::<Vec<_>>()
    .join("&");
    format!("{}?{}", config.auth_uri, params)
}

async fn run_installed_flow(
    client: &Client,
    config: &ClientConfig,
) -> Result<TokenResponse, SyncError> {
    let server = LoopbackServer::bind().await?;
    let redirect_uri = server.redirect_uri();
    let state = new_state();
    let url = authorization_url(config, &redirect_uri, &state);

    info!("Please visit this URL to authorize Google sync: {}", url);
    if let Err(e) = open_in_browser(&url) {
        debug!("could not open browser automatically: {}", e);
    }

    let code = server.wait_for_code(&state, CONSENT_TIMEOUT).await?;

    post_token_form(
        client,
        &config.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("redirect_uri", &redirect_uri),
        ],
    )
    .await
}

fn open_in_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("rundll32");
        c.arg("url.dll,FileProtocolHandler");
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = Command::new("xdg-open");

    command.arg(url).spawn().map(|_| ())
}

// =============================================================================
// AUTH SELECTION
// =============================================================================

/// Credentials for whichever auth mode the settings ask for
pub enum GoogleAuth {
    Service(ServiceAccountAuth),
    User(UserOAuth),
}

impl GoogleAuth {
    pub async fn from_settings(
        settings: &GoogleSyncSettings,
        client: Client,
    ) -> Result<Self, SyncError> {
        match settings.auth_mode {
            AuthMode::Service => {
                if settings.credentials_file.is_empty() {
                    return Err(SyncError::MissingSetting("credentials_file"));
                }
                let auth =
                    ServiceAccountAuth::from_file(Path::new(&settings.credentials_file), client)
                        .await?;
                info!("Using service account {}", auth.client_email());
                Ok(GoogleAuth::Service(auth))
            }
            AuthMode::OAuth => {
                if settings.client_secret_file.is_empty() {
                    return Err(SyncError::MissingSetting("client_secret_file"));
                }
                let auth = UserOAuth::from_files(
                    Path::new(&settings.client_secret_file),
                    Path::new(&settings.token_file),
                    client,
                )
                .await?;
                Ok(GoogleAuth::User(auth))
            }
        }
    }

    pub async fn access_token(&self) -> Result<String, SyncError> {
        match self {
            GoogleAuth::Service(auth) => auth.access_token().await,
            GoogleAuth::User(auth) => auth.access_token().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::fake_api::FakeGoogleApi;
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    fn form_value(form: &str, key: &str) -> Option<String> {
        form.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then(|| urlencoding::decode(v).map(|v| v.into_owned()).ok())?
        })
    }

    fn client_config() -> ClientConfig {
        ClientConfig {
            client_id: "id-123.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    #[test]
    fn test_authorization_url_encodes_parameters() {
        let url = authorization_url(&client_config(), "http://localhost:8080/", "st4te");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?response_type=code&"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fspreadsheets%20https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fdrive.file"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_new_state_is_random_and_url_safe() {
        let a = new_state();
        let b = new_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let mut token = AuthorizedUserToken::new(&client_config());
        assert!(!token.is_valid_at(now));

        token.token = Some("ya29".to_string());
        assert!(token.is_valid_at(now));

        token.expiry = Some(now + chrono::Duration::seconds(30));
        assert!(token.is_expired_at(now));
        assert!(!token.is_valid_at(now));

        token.expiry = Some(now + chrono::Duration::hours(1));
        assert!(token.is_valid_at(now));
    }

    #[test]
    fn test_token_file_layout() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id",
            "client_secret": "secret",
            "scopes": ["https://www.googleapis.com/auth/spreadsheets", "https://www.googleapis.com/auth/drive.file"],
            "universe_domain": "googleapis.com",
            "expiry": "2030-01-01T00:00:00.000000Z"
        }"#;
        let token: AuthorizedUserToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//0g"));
        assert!(token.has_scopes());
        assert!(token.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_missing_scope_is_detected() {
        let mut token = AuthorizedUserToken::new(&client_config());
        token.scopes.pop();
        assert!(!token.has_scopes());
    }

    #[tokio::test]
    async fn test_token_save_creates_parent_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens").join("google_token.json");
        let mut token = AuthorizedUserToken::new(&client_config());
        token.token = Some("abc".to_string());

        token.save(&path).await.unwrap();
        let loaded: AuthorizedUserToken = read_json_file(&path, "token file").await.unwrap();
        assert_eq!(loaded, token);
    }

    #[tokio::test]
    async fn test_missing_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServiceAccountAuth::from_file(&dir.path().join("key.json"), Client::new()).await;
        assert!(matches!(result, Err(SyncError::MissingFile { .. })));
    }

    #[tokio::test]
    async fn test_settings_without_credentials_are_rejected() {
        let settings = GoogleSyncSettings {
            enabled: true,
            ..GoogleSyncSettings::default()
        };
        let result = GoogleAuth::from_settings(&settings, Client::new()).await;
        assert!(matches!(result, Err(SyncError::MissingSetting("credentials_file"))));
    }

    #[tokio::test]
    async fn test_service_account_exchanges_signed_jwt_once() {
        let api = FakeGoogleApi::start(|_| {
            (StatusCode::OK, json!({ "access_token": "ya29.sa", "expires_in": 3600 }))
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.json");
        let key = json!({
            "client_email": "saver@proj.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
            "token_uri": format!("{}/token", api.base_url),
        });
        std::fs::write(&key_path, key.to_string()).unwrap();

        let auth = ServiceAccountAuth::from_file(&key_path, Client::new()).await.unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "ya29.sa");
        assert_eq!(auth.access_token().await.unwrap(), "ya29.sa");

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        let form = requests[0].body_text();
        assert_eq!(
            form_value(&form, "grant_type").as_deref(),
            Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
        );

        let assertion = form_value(&form, "assertion").unwrap();
        let payload = assertion.split('.').nth(1).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims["iss"], "saver@proj.iam.gserviceaccount.com");
        assert_eq!(claims["aud"], format!("{}/token", api.base_url));
        assert_eq!(claims["scope"], scope_string());
    }

    #[tokio::test]
    async fn test_expired_user_token_is_refreshed_and_saved() {
        let api = FakeGoogleApi::start(|_| {
            (StatusCode::OK, json!({ "access_token": "ya29.new", "expires_in": 3599 }))
        })
        .await;
        let dir = tempfile::tempdir().unwrap();

        let secret_path = dir.path().join("client_secret.json");
        let secret = json!({
            "installed": {
                "client_id": "id-123",
                "client_secret": "secret",
                "token_uri": format!("{}/token", api.base_url),
            }
        });
        std::fs::write(&secret_path, secret.to_string()).unwrap();

        let token_path = dir.path().join("google_token.json");
        let mut stale = AuthorizedUserToken::new(&client_config());
        stale.token_uri = format!("{}/token", api.base_url);
        stale.token = Some("ya29.old".to_string());
        stale.refresh_token = Some("1//refresh".to_string());
        stale.expiry = Some(Utc::now() - chrono::Duration::minutes(5));
        stale.save(&token_path).await.unwrap();

        let auth = UserOAuth::from_files(&secret_path, &token_path, Client::new())
            .await
            .unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "ya29.new");

        let form = api.requests()[0].body_text();
        assert_eq!(form_value(&form, "grant_type").as_deref(), Some("refresh_token"));
        assert_eq!(form_value(&form, "refresh_token").as_deref(), Some("1//refresh"));

        let saved: AuthorizedUserToken = read_json_file(&token_path, "token file").await.unwrap();
        assert_eq!(saved.token.as_deref(), Some("ya29.new"));
        assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
        assert!(saved.is_valid_at(Utc::now()));
    }
}
