//! GCP authentication using a service account
//!
//! Handles OAuth2 token generation for the GCS and Firestore REST APIs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::GcpConfig;
use crate::error::{Error, Result};

const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

enum Credential {
    /// Service account key file, exchanged for tokens via a signed JWT
    ServiceAccount(PathBuf),
    /// Pre-issued access token, used as-is
    Static(String),
}

/// GCP authentication manager
pub struct GcpAuth {
    credential: Credential,
    project_id: String,
    http: reqwest::Client,
    /// Cached access token
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl GcpAuth {
    /// Create from service account JSON key file
    pub fn from_service_account(
        key_path: impl AsRef<Path>,
        project_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();
        if !key_path.exists() {
            return Err(Error::Config(format!(
                "Service account key not found: {}",
                key_path.display()
            )));
        }

        Ok(Self {
            credential: Credential::ServiceAccount(key_path),
            project_id: project_id.into(),
            http,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Use a pre-issued access token (e.g. `gcloud auth print-access-token`)
    pub fn from_access_token(token: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            credential: Credential::Static(token.into()),
            project_id: project_id.into(),
            http: reqwest::Client::new(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Pick the credential from config: an explicit token wins over the key file
    pub fn from_config(config: &GcpConfig, http: reqwest::Client) -> Result<Self> {
        if let Some(token) = &config.access_token {
            return Ok(Self::from_access_token(token.clone(), config.project_id.clone()));
        }
        match &config.service_account_key_path {
            Some(path) => Self::from_service_account(path, config.project_id.clone(), http),
            None => Err(Error::Config(
                "no GCP credential configured (key file or access token)".into(),
            )),
        }
    }

    /// Get project ID
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get a valid access token (refreshing if needed)
    pub async fn get_token(&self) -> Result<String> {
        let key_path = match &self.credential {
            Credential::Static(token) => return Ok(token.clone()),
            Credential::ServiceAccount(path) => path,
        };

        {
            let token = self.token.read().await;
            if let Some(ref cached) = *token {
                // Token valid for at least 60 more seconds
                if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token(key_path).await?;

        {
            let mut token = self.token.write().await;
            *token = Some(CachedToken {
                access_token: new_token.clone(),
                // Tokens last an hour, treat them as 55 minutes
                expires_at: Instant::now() + Duration::from_secs(55 * 60),
            });
        }

        Ok(new_token)
    }

    /// Exchange a signed JWT for an access token
    async fn refresh_token(&self, key_path: &Path) -> Result<String> {
        let key_content = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        #[derive(serde::Deserialize)]
        struct ServiceAccountKey {
            client_email: String,
            private_key: String,
            token_uri: String,
        }

        let key: ServiceAccountKey = serde_json::from_str(&key_content).map_err(|e| {
            Error::Config(format!("Invalid service account key format: {}", e))
        })?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("System clock before epoch: {}", e)))?
            .as_secs() as i64;

        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": SCOPE,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let jwt = sign_jwt(&claims, &key.private_key)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Config(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Config(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            Error::Config(format!("Failed to parse token response: {}", e))
        })?;

        tracing::debug!(project = %self.project_id, "refreshed GCP access token");
        Ok(token_response.access_token)
    }
}

/// RS256-sign a JWT with a PKCS#8 PEM private key
fn sign_jwt(claims: &serde_json::Value, private_key_pem: &str) -> Result<String> {
    use base64::Engine;
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#.as_bytes());
    let payload = engine.encode(claims.to_string().as_bytes());
    let signing_input = format!("{}.{}", header, payload);

    let private_key = private_key_pem.replace("\\n", "\n");
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(
        pem::parse(&private_key)
            .map_err(|e| Error::Config(format!("Failed to parse private key PEM: {}", e)))?
            .contents(),
    )
    .map_err(|e| Error::Config(format!("Failed to parse private key: {:?}", e)))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .map_err(|e| Error::Config(format!("Failed to sign JWT: {:?}", e)))?;

    Ok(format!("{}.{}", signing_input, engine.encode(&signature)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcpConfig;

    #[tokio::test]
    async fn test_static_token_is_returned_verbatim() {
        let auth = GcpAuth::from_access_token("ya29.test", "solar-prod");
        assert_eq!(auth.get_token().await.unwrap(), "ya29.test");
        assert_eq!(auth.project_id(), "solar-prod");
    }

    #[test]
    fn test_missing_key_file_is_a_config_error() {
        let mut config = GcpConfig::new("solar-prod", "quotes");
        config.service_account_key_path = Some("/nonexistent/key.json".into());
        let err = GcpAuth::from_config(&config, reqwest::Client::new()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_no_credential_is_a_config_error() {
        let config = GcpConfig::new("solar-prod", "quotes");
        assert!(GcpAuth::from_config(&config, reqwest::Client::new()).is_err());
    }

    #[tokio::test]
    async fn test_service_account_token_is_exchanged_once_and_cached() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.json");
        let key = serde_json::json!({
            "client_email": "ingest@solar-prod.iam.gserviceaccount.com",
            "private_key": include_str!("../../../tests/fixtures/test_rsa_key.pem"),
            "token_uri": format!("{}/token", server.uri()),
        });
        std::fs::write(&key_path, key.to_string()).unwrap();

        let auth =
            GcpAuth::from_service_account(&key_path, "solar-prod", reqwest::Client::new()).unwrap();
        assert_eq!(auth.get_token().await.unwrap(), "ya29.fresh");
        assert_eq!(auth.get_token().await.unwrap(), "ya29.fresh");
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_a_config_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.json");
        let key = serde_json::json!({
            "client_email": "ingest@solar-prod.iam.gserviceaccount.com",
            "private_key": include_str!("../../../tests/fixtures/test_rsa_key.pem"),
            "token_uri": server.uri(),
        });
        std::fs::write(&key_path, key.to_string()).unwrap();

        let auth =
            GcpAuth::from_service_account(&key_path, "solar-prod", reqwest::Client::new()).unwrap();
        let err = auth.get_token().await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_garbage_key_fails_to_sign() {
        let claims = serde_json::json!({"iss": "x"});
        assert!(matches!(sign_jwt(&claims, "not a pem"), Err(Error::Config(_))));
    }
}
