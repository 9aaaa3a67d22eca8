use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

const MOCK_TOKEN_PREFIX: &str = "mock:";

/// Identity resolved from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    Provider { message: String },
}

#[derive(Debug, Clone)]
struct VerifiedIdentity {
    uid: String,
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
}

#[async_trait]
trait IdentityProvider: Send + Sync {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, AuthError>;

    fn name(&self) -> &'static str;
}

/// Accepts `mock:<uid>:<email>[:<display name>]` tokens.
#[derive(Debug, Clone, Default)]
struct MockIdentityProvider;

#[derive(Debug, Clone)]
struct FirebaseIdentityProvider {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
struct UnavailableIdentityProvider {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseLookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct FirebaseLookupResponse {
    #[serde(default)]
    users: Vec<FirebaseAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseAccount {
    local_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    phone_number: Option<String>,
    #[serde(default)]
    disabled: bool,
}

#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: provider_from_config(config),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn verify_token(&self, id_token: &str) -> Result<AuthUser, AuthError> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(unauthenticated());
        }

        let identity = self.provider.verify_id_token(id_token).await?;
        let uid = identity.uid.trim().to_string();
        let email = identity
            .email
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty());

        if uid.is_empty() {
            return Err(unauthenticated());
        }
        let Some(email) = email else {
            return Err(AuthError::Unauthorized {
                message: "Verified identity has no email address.".to_string(),
            });
        };

        let name = identity
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| display_name_from_email(&email));

        Ok(AuthUser {
            uid,
            email,
            name,
            phone: identity
                .phone
                .map(|phone| phone.trim().to_string())
                .filter(|phone| !phone.is_empty()),
        })
    }
}

fn provider_from_config(config: &Config) -> Arc<dyn IdentityProvider> {
    match config.auth_provider_mode.as_str() {
        "mock" => Arc::new(MockIdentityProvider),
        _ => firebase_or_unavailable(config),
    }
}

fn firebase_or_unavailable(config: &Config) -> Arc<dyn IdentityProvider> {
    let Some(api_key) = config.firebase_api_key.clone() else {
        return Arc::new(UnavailableIdentityProvider {
            message: "Firebase identity provider is required. Configure EH_FIREBASE_API_KEY or use EH_AUTH_PROVIDER_MODE=mock only for local/testing."
                .to_string(),
        });
    };

    let http = match reqwest::Client::builder()
        .timeout(Duration::from_millis(config.payment_http_timeout_ms.max(1_000)))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            return Arc::new(UnavailableIdentityProvider {
                message: format!("Failed to build identity provider client: {error}"),
            });
        }
    };

    Arc::new(FirebaseIdentityProvider {
        api_key,
        base_url: config.firebase_identity_base_url.clone(),
        http,
    })
}

fn unauthenticated() -> AuthError {
    AuthError::Unauthorized {
        message: "Unauthenticated.".to_string(),
    }
}

fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, AuthError> {
        let rest = id_token
            .strip_prefix(MOCK_TOKEN_PREFIX)
            .ok_or_else(unauthenticated)?;
        let mut parts = rest.splitn(3, ':');
        let uid = parts.next().unwrap_or_default().trim();
        let email = parts.next().unwrap_or_default().trim();
        let name = parts.next().map(str::to_string);

        if uid.is_empty() || !email.contains('@') {
            return Err(unauthenticated());
        }

        Ok(VerifiedIdentity {
            uid: uid.to_string(),
            email: Some(email.to_string()),
            name,
            phone: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl IdentityProvider for UnavailableIdentityProvider {
    async fn verify_id_token(&self, _id_token: &str) -> Result<VerifiedIdentity, AuthError> {
        Err(AuthError::Provider {
            message: self.message.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "firebase"
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, AuthError> {
        let url = format!(
            "{}/v1/accounts:lookup",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&FirebaseLookupRequest { id_token })
            .send()
            .await
            .map_err(|error| AuthError::Provider {
                message: format!("Unable to contact identity provider: {error}"),
            })?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(unauthenticated());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                message: format!("Identity provider request failed ({status}): {body}"),
            });
        }

        let payload = response
            .json::<FirebaseLookupResponse>()
            .await
            .map_err(|error| AuthError::Provider {
                message: format!("Invalid identity provider response payload: {error}"),
            })?;

        let account = payload
            .users
            .into_iter()
            .next()
            .ok_or_else(unauthenticated)?;
        if account.disabled {
            return Err(AuthError::Unauthorized {
                message: "Account is disabled.".to_string(),
            });
        }

        Ok(VerifiedIdentity {
            uid: account.local_id.unwrap_or_default(),
            email: account.email,
            name: account.display_name,
            phone: account.phone_number,
        })
    }

    fn name(&self) -> &'static str {
        "firebase"
    }
}
