// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth providers and the code-exchange client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use vespid_config::OAuthClientSettings;

/// Exchange call budget.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Login providers for the authorization-code flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    /// Google OpenID Connect.
    Google,
    /// GitHub OAuth apps.
    GitHub,
}

impl OAuthProvider {
    /// Parse the route segment.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "google" => Some(Self::Google),
            "github" => Some(Self::GitHub),
            _ => None,
        }
    }

    /// Route segment / wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    /// Browser authorization endpoint.
    pub fn authorize_endpoint(&self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::GitHub => "https://github.com/login/oauth/authorize",
        }
    }

    /// Scopes requested at login.
    pub fn scopes(&self) -> &'static str {
        match self {
            Self::Google => "openid email profile",
            Self::GitHub => "read:user user:email",
        }
    }
}

/// The identity a successful exchange yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    /// Verified email.
    pub email: String,
    /// Display name, when the provider offers one.
    pub display_name: Option<String>,
}

/// Exchange failures. All of them mean the login cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The provider rejected the code or the transport failed.
    #[error("code exchange failed: {reason}")]
    Failed {
        /// What the client observed.
        reason: String,
    },
    /// The provider returned a usable token but no email.
    #[error("provider profile carried no email")]
    NoEmail,
}

/// Provider code-exchange contract; tests script it, production uses
/// [`HttpExchanger`].
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    /// Authorization-code → user profile.
    async fn exchange_profile(
        &self,
        provider: OAuthProvider,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, ExchangeError>;

    /// Vertex authorization-code → offline refresh token.
    async fn exchange_vertex_refresh_token(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<String, ExchangeError>;
}

/// Production exchanger speaking to the real provider endpoints.
pub struct HttpExchanger {
    http: reqwest::Client,
    google: Option<OAuthClientSettings>,
    github: Option<OAuthClientSettings>,
    vertex: Option<OAuthClientSettings>,
    /// Overridable for tests; `None` uses the public endpoints.
    endpoint_override: Option<String>,
}

impl HttpExchanger {
    /// Build from configured client credentials.
    pub fn new(
        google: Option<OAuthClientSettings>,
        github: Option<OAuthClientSettings>,
        vertex: Option<OAuthClientSettings>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            google,
            github,
            vertex,
            endpoint_override: None,
        }
    }

    /// Point every endpoint at a test server.
    pub fn with_endpoint_override(mut self, base: impl Into<String>) -> Self {
        self.endpoint_override = Some(base.into());
        self
    }

    fn endpoint(&self, default: &str, path: &str) -> String {
        match &self.endpoint_override {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => default.to_owned(),
        }
    }

    fn failed(err: impl std::fmt::Display) -> ExchangeError {
        ExchangeError::Failed {
            reason: err.to_string(),
        }
    }

    async fn post_token(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<Value, ExchangeError> {
        let response = self
            .http
            .post(url)
            .timeout(EXCHANGE_TIMEOUT)
            .header("accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(Self::failed)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Failed {
                reason: format!("token endpoint answered {status}"),
            });
        }
        response.json().await.map_err(Self::failed)
    }

    async fn google_profile(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, ExchangeError> {
        let client = self.google.as_ref().ok_or_else(|| ExchangeError::Failed {
            reason: "google oauth client not configured".into(),
        })?;
        let token = self
            .post_token(
                self.endpoint("https://oauth2.googleapis.com/token", "/token"),
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("code_verifier", code_verifier),
                    ("redirect_uri", redirect_uri),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                ],
            )
            .await?;
        let access_token = token["access_token"]
            .as_str()
            .ok_or_else(|| ExchangeError::Failed {
                reason: "no access_token in exchange response".into(),
            })?;
        let profile: Value = self
            .http
            .get(self.endpoint(
                "https://openidconnect.googleapis.com/v1/userinfo",
                "/userinfo",
            ))
            .timeout(EXCHANGE_TIMEOUT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(Self::failed)?
            .json()
            .await
            .map_err(Self::failed)?;
        let email = profile["email"].as_str().ok_or(ExchangeError::NoEmail)?;
        Ok(OAuthProfile {
            email: email.to_owned(),
            display_name: profile["name"].as_str().map(str::to_owned),
        })
    }

    async fn github_profile(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, ExchangeError> {
        let client = self.github.as_ref().ok_or_else(|| ExchangeError::Failed {
            reason: "github oauth client not configured".into(),
        })?;
        let token = self
            .post_token(
                self.endpoint(
                    "https://github.com/login/oauth/access_token",
                    "/login/oauth/access_token",
                ),
                &[
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                ],
            )
            .await?;
        let access_token = token["access_token"]
            .as_str()
            .ok_or_else(|| ExchangeError::Failed {
                reason: "no access_token in exchange response".into(),
            })?;
        let profile: Value = self
            .http
            .get(self.endpoint("https://api.github.com/user", "/user"))
            .timeout(EXCHANGE_TIMEOUT)
            .bearer_auth(access_token)
            .header("user-agent", "vespid-control")
            .send()
            .await
            .map_err(Self::failed)?
            .json()
            .await
            .map_err(Self::failed)?;
        let email = match profile["email"].as_str() {
            Some(email) => email.to_owned(),
            // Private-email accounts still get a stable noreply address.
            None => match profile["login"].as_str() {
                Some(login) => format!("{login}@users.noreply.github.com"),
                None => return Err(ExchangeError::NoEmail),
            },
        };
        Ok(OAuthProfile {
            email,
            display_name: profile["name"].as_str().map(str::to_owned),
        })
    }
}

#[async_trait]
impl CodeExchanger for HttpExchanger {
    async fn exchange_profile(
        &self,
        provider: OAuthProvider,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, ExchangeError> {
        match provider {
            OAuthProvider::Google => self.google_profile(code, code_verifier, redirect_uri).await,
            OAuthProvider::GitHub => self.github_profile(code, redirect_uri).await,
        }
    }

    async fn exchange_vertex_refresh_token(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<String, ExchangeError> {
        let client = self.vertex.as_ref().ok_or_else(|| ExchangeError::Failed {
            reason: "vertex oauth client not configured".into(),
        })?;
        let token = self
            .post_token(
                self.endpoint("https://oauth2.googleapis.com/token", "/token"),
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("code_verifier", code_verifier),
                    ("redirect_uri", redirect_uri),
                    ("access_type", "offline"),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                ],
            )
            .await?;
        token["refresh_token"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ExchangeError::Failed {
                reason: "no refresh_token in exchange response".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> OAuthClientSettings {
        OAuthClientSettings {
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
        }
    }

    #[tokio::test]
    async fn google_exchange_fetches_the_userinfo_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code_verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "a@b.co", "name": "Ada"
            })))
            .mount(&server)
            .await;

        let exchanger = HttpExchanger::new(Some(settings()), None, None)
            .with_endpoint_override(server.uri());
        let profile = exchanger
            .exchange_profile(OAuthProvider::Google, "code-1", "verifier", "https://cb")
            .await
            .unwrap();
        assert_eq!(profile.email, "a@b.co");
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn github_private_email_falls_back_to_noreply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "gho_x"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "octocat", "email": null
            })))
            .mount(&server)
            .await;

        let exchanger = HttpExchanger::new(None, Some(settings()), None)
            .with_endpoint_override(server.uri());
        let profile = exchanger
            .exchange_profile(OAuthProvider::GitHub, "code-1", "verifier", "https://cb")
            .await
            .unwrap();
        assert_eq!(profile.email, "octocat@users.noreply.github.com");
    }

    #[tokio::test]
    async fn provider_error_surfaces_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        let exchanger = HttpExchanger::new(Some(settings()), None, None)
            .with_endpoint_override(server.uri());
        assert!(matches!(
            exchanger
                .exchange_profile(OAuthProvider::Google, "bad", "v", "https://cb")
                .await,
            Err(ExchangeError::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn vertex_exchange_returns_the_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at", "refresh_token": "rt-1"
            })))
            .mount(&server)
            .await;
        let exchanger = HttpExchanger::new(None, None, Some(settings()))
            .with_endpoint_override(server.uri());
        let refresh = exchanger
            .exchange_vertex_refresh_token("code", "v", "https://cb")
            .await
            .unwrap();
        assert_eq!(refresh, "rt-1");
    }
}
