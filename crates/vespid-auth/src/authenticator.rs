// SPDX-License-Identifier: MIT OR Apache-2.0
//! Password auth, token resolution, and session lifecycle.

use crate::{AuthContext, AuthError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use vespid_core::{AuthSession, User};
use vespid_crypto::{ct_eq, hash_password, random_token, verify_password};
use vespid_store::{NewAuthSession, NewOrganization, Store, StoreError, TenantContext};
use vespid_token::{
    AccessTokenPayload, RefreshTokenPayload, refresh_token_hash, sign_access_token,
    sign_refresh_token, verify_access_token, verify_refresh_token,
};

/// Everything a successful signup/login/refresh hands back to the HTTP
/// layer: the session row, the cookie blob, and the bearer token.
#[derive(Debug, Clone)]
pub struct AuthSessionBundle {
    /// The authenticated user.
    pub user: User,
    /// The session row.
    pub session: AuthSession,
    /// Refresh blob for the session cookie.
    pub refresh_token: String,
    /// Short-lived bearer token.
    pub access_token: String,
}

/// Signing secrets and TTLs the authenticator needs.
#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    /// Secret for access-token signing.
    pub auth_token_secret: String,
    /// Secret for refresh-token signing.
    pub refresh_token_secret: String,
    /// Access-token lifetime in seconds.
    pub access_token_ttl_sec: u64,
    /// Session lifetime in seconds.
    pub session_ttl_sec: u64,
}

/// Resolves and issues credentials against the store.
pub struct Authenticator {
    store: Arc<dyn Store>,
    config: AuthenticatorConfig,
}

impl Authenticator {
    /// Build an authenticator.
    pub fn new(store: Arc<dyn Store>, config: AuthenticatorConfig) -> Self {
        Self { store, config }
    }

    fn access_secret(&self) -> &[u8] {
        self.config.auth_token_secret.as_bytes()
    }

    fn refresh_secret(&self) -> &[u8] {
        self.config.refresh_token_secret.as_bytes()
    }

    /// Register a new user, create their personal workspace, and open a
    /// session.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
        user_agent: Option<String>,
        ip: Option<String>,
    ) -> Result<AuthSessionBundle, AuthError> {
        let email_lower = email.trim().to_lowercase();
        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(vespid_store::NewUser {
                email_lower,
                password_hash,
                display_name,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict { .. } => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?;
        self.ensure_personal_workspace(&user).await?;
        self.open_session(user, user_agent, ip).await
    }

    /// Verify a password login and open a session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        user_agent: Option<String>,
        ip: Option<String>,
    ) -> Result<AuthSessionBundle, AuthError> {
        let email_lower = email.trim().to_lowercase();
        let user = self
            .store
            .user_by_email(&email_lower)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        self.open_session(user, user_agent, ip).await
    }

    /// Find a user by email or create one with an unguessable password
    /// (OAuth first-login), then open a session.
    pub async fn login_or_create_oauth_user(
        &self,
        email: &str,
        display_name: Option<String>,
    ) -> Result<AuthSessionBundle, AuthError> {
        let email_lower = email.trim().to_lowercase();
        let user = match self.store.user_by_email(&email_lower).await? {
            Some(user) => user,
            None => {
                let user = self
                    .store
                    .create_user(vespid_store::NewUser {
                        email_lower,
                        password_hash: vespid_crypto::random_password_hash()?,
                        display_name,
                    })
                    .await?;
                self.ensure_personal_workspace(&user).await?;
                user
            }
        };
        self.open_session(user, None, None).await
    }

    /// Create a session row and sign its tokens.
    pub async fn open_session(
        &self,
        user: User,
        user_agent: Option<String>,
        ip: Option<String>,
    ) -> Result<AuthSessionBundle, AuthError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.session_ttl_sec as i64);
        // The hash column is filled in a second step because the blob embeds
        // the session id.
        let session = self
            .store
            .create_auth_session(NewAuthSession {
                user_id: user.id,
                refresh_token_hash: String::new(),
                expires_at,
                user_agent,
                ip,
            })
            .await?;
        let refresh_token = sign_refresh_token(
            &RefreshTokenPayload {
                session_id: session.id,
                user_id: user.id,
                token_nonce: random_token(16),
                expires_at: expires_at.timestamp(),
            },
            self.refresh_secret(),
        );
        let session = self
            .store
            .rotate_auth_session(session.id, refresh_token_hash(&refresh_token), expires_at, now)
            .await?;
        let access_token = self.sign_access(&user, session.id);
        Ok(AuthSessionBundle {
            user,
            session,
            refresh_token,
            access_token,
        })
    }

    fn sign_access(&self, user: &User, session_id: Uuid) -> String {
        let exp = Utc::now() + Duration::seconds(self.config.access_token_ttl_sec as i64);
        sign_access_token(
            &AccessTokenPayload {
                user_id: user.id,
                email: user.email_lower.clone(),
                session_id,
                exp: exp.timestamp(),
            },
            self.access_secret(),
        )
    }

    /// Resolve a bearer access token into an [`AuthContext`].
    pub async fn authenticate_bearer(&self, token: &str) -> Result<AuthContext, AuthError> {
        let now = Utc::now();
        let payload = verify_access_token(token, self.access_secret(), now)
            .map_err(|_| AuthError::Unauthorized)?;
        let session = self
            .store
            .auth_session(payload.session_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !session.is_active(now) || session.user_id != payload.user_id {
            return Err(AuthError::Unauthorized);
        }
        let user = self
            .store
            .user_by_id(payload.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        self.store.touch_auth_session(session.id, now).await?;
        Ok(AuthContext {
            user,
            session_id: session.id,
        })
    }

    /// Resolve a refresh cookie into an [`AuthContext`] plus a fresh access
    /// token (passive auth: the cookie itself is not rotated).
    pub async fn authenticate_refresh(
        &self,
        blob: &str,
    ) -> Result<(AuthContext, String), AuthError> {
        let (user, session) = self.verify_refresh_blob(blob).await?;
        self.store
            .touch_auth_session(session.id, Utc::now())
            .await?;
        let access_token = self.sign_access(&user, session.id);
        Ok((
            AuthContext {
                user,
                session_id: session.id,
            },
            access_token,
        ))
    }

    /// Rotate a refresh session: new nonce, new expiry, new cookie blob,
    /// new access token.
    pub async fn rotate(&self, blob: &str) -> Result<AuthSessionBundle, AuthError> {
        let (user, session) = self.verify_refresh_blob(blob).await?;
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.session_ttl_sec as i64);
        let refresh_token = sign_refresh_token(
            &RefreshTokenPayload {
                session_id: session.id,
                user_id: user.id,
                token_nonce: random_token(16),
                expires_at: expires_at.timestamp(),
            },
            self.refresh_secret(),
        );
        let session = self
            .store
            .rotate_auth_session(session.id, refresh_token_hash(&refresh_token), expires_at, now)
            .await?;
        debug!(session_id = %session.id, "refresh session rotated");
        let access_token = self.sign_access(&user, session.id);
        Ok(AuthSessionBundle {
            user,
            session,
            refresh_token,
            access_token,
        })
    }

    /// Signature check first (no store lookup on a tampered blob), then the
    /// constant-time hash comparison against the stored verifier.
    async fn verify_refresh_blob(&self, blob: &str) -> Result<(User, AuthSession), AuthError> {
        let now = Utc::now();
        let payload = verify_refresh_token(blob, self.refresh_secret(), now)
            .map_err(|_| AuthError::Unauthorized)?;
        let session = self
            .store
            .auth_session(payload.session_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !session.is_active(now) || session.user_id != payload.user_id {
            return Err(AuthError::Unauthorized);
        }
        if !ct_eq(
            refresh_token_hash(blob).as_bytes(),
            session.refresh_token_hash.as_bytes(),
        ) {
            return Err(AuthError::Unauthorized);
        }
        let user = self
            .store
            .user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok((user, session))
    }

    /// Revoke the current session.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.store
            .revoke_auth_session(session_id, Utc::now())
            .await?;
        Ok(())
    }

    /// Revoke every active session of the user; returns the count.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        Ok(self
            .store
            .revoke_all_auth_sessions(user_id, Utc::now())
            .await?)
    }

    /// Create the user's personal workspace unless they already have one.
    async fn ensure_personal_workspace(&self, user: &User) -> Result<(), AuthError> {
        let ctx = TenantContext::user(user.id);
        if !self.store.organizations_for_user(&ctx).await?.is_empty() {
            return Ok(());
        }
        let local = user
            .email_lower
            .split('@')
            .next()
            .unwrap_or("workspace")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>();
        let slug = format!("{}-{}", local, &Uuid::new_v4().simple().to_string()[..8]);
        self.store
            .create_organization(
                &ctx,
                NewOrganization {
                    slug,
                    name: format!("{local}'s workspace"),
                    settings: serde_json::json!({}),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vespid_store::memory::InMemoryStore;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            Arc::new(InMemoryStore::new()),
            AuthenticatorConfig {
                auth_token_secret: "access-secret".into(),
                refresh_token_secret: "refresh-secret".into(),
                access_token_ttl_sec: 900,
                session_ttl_sec: 604_800,
            },
        )
    }

    #[tokio::test]
    async fn signup_then_bearer_auth_round_trips() {
        let auth = authenticator();
        let bundle = auth
            .signup("A@B.co", "secret12", None, None, None)
            .await
            .unwrap();
        assert_eq!(bundle.user.email_lower, "a@b.co");
        assert!(!bundle.refresh_token.is_empty());

        let ctx = auth.authenticate_bearer(&bundle.access_token).await.unwrap();
        assert_eq!(ctx.user.id, bundle.user.id);
        assert_eq!(ctx.session_id, bundle.session.id);
    }

    #[tokio::test]
    async fn duplicate_signup_is_a_conflict() {
        let auth = authenticator();
        auth.signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        assert!(matches!(
            auth.signup("a@b.co", "other-pass", None, None, None).await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let auth = authenticator();
        auth.signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let err = auth.login("a@b.co", "secret13", None, None).await;
        assert!(matches!(err, Err(AuthError::InvalidCredentials)));
        let err = auth.login("nobody@b.co", "secret12", None, None).await;
        assert!(matches!(err, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn refresh_cookie_authenticates_and_mints_access_token() {
        let auth = authenticator();
        let bundle = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let (ctx, access) = auth
            .authenticate_refresh(&bundle.refresh_token)
            .await
            .unwrap();
        assert_eq!(ctx.user.id, bundle.user.id);
        let ctx = auth.authenticate_bearer(&access).await.unwrap();
        assert_eq!(ctx.user.id, bundle.user.id);
    }

    #[tokio::test]
    async fn rotation_invalidates_the_previous_blob() {
        let auth = authenticator();
        let bundle = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let rotated = auth.rotate(&bundle.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, bundle.refresh_token);

        // The old blob's hash no longer matches the stored verifier.
        assert!(matches!(
            auth.authenticate_refresh(&bundle.refresh_token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(auth.authenticate_refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let auth = authenticator();
        let bundle = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        auth.logout(bundle.session.id).await.unwrap();
        assert!(matches!(
            auth.authenticate_bearer(&bundle.access_token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn logout_all_revokes_every_session() {
        let auth = authenticator();
        let first = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let second = auth.login("a@b.co", "secret12", None, None).await.unwrap();
        let revoked = auth.logout_all(first.user.id).await.unwrap();
        assert_eq!(revoked, 2);
        for bundle in [first, second] {
            assert!(matches!(
                auth.authenticate_refresh(&bundle.refresh_token).await,
                Err(AuthError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn tampered_refresh_blob_never_reaches_the_store() {
        let auth = authenticator();
        let bundle = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let mut tampered = bundle.refresh_token.clone();
        tampered.replace_range(0..1, if tampered.starts_with('A') { "B" } else { "A" });
        assert!(matches!(
            auth.authenticate_refresh(&tampered).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn signup_creates_a_personal_workspace() {
        let auth = authenticator();
        let bundle = auth
            .signup("a@b.co", "secret12", None, None, None)
            .await
            .unwrap();
        let store = &auth.store;
        let orgs = store
            .organizations_for_user(&TenantContext::user(bundle.user.id))
            .await
            .unwrap();
        assert_eq!(orgs.len(), 1);
        assert!(orgs[0].slug.starts_with("a-"));
    }
}
