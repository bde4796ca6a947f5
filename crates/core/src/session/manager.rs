//! Session manager: owns the auth lifecycle and publishes snapshots.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    config::AppConfig,
    error::ApiError,
    models::User,
};

use super::{
    state::{SessionSnapshot, SessionState},
    store::{TokenPair, TokenStore},
};

/// Single writer for session state.
///
/// All mutation goes through the operations below; readers subscribe to
/// a watch channel and only ever observe complete snapshots. The token
/// pair on disk and the one in memory are swapped under one lock so a
/// concurrent request can never pick up a stale credential.
#[derive(Debug)]
pub struct SessionManager {
    client: ApiClient,
    store: TokenStore,
    tokens: Mutex<Option<TokenPair>>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Create a manager in the `Resuming` state. Call [`Self::resume`]
    /// once at startup to settle it.
    pub fn new(client: ApiClient, store: TokenStore) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot {
            state: SessionState::Resuming,
            is_loading: true,
            error: None,
        });
        Self {
            client,
            store,
            tokens: Mutex::new(None),
            snapshots,
        }
    }

    /// Convenience constructor wiring the client and token store from
    /// configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = ApiClient::new(config)?;
        let store = TokenStore::new(config.tokens_path());
        Ok(Self::new(client, store))
    }

    /// Subscribe to session snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Attempt to re-establish a session from persisted tokens.
    ///
    /// Never raises: any failure along the way clears the stored tokens
    /// and settles the session as `Anonymous`.
    pub async fn resume(&self) {
        let persisted = match self.store.load() {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("failed to read token store: {err:#}");
                None
            }
        };

        let Some(pair) = persisted else {
            self.publish(SessionState::Anonymous, false, None);
            return;
        };

        *self.tokens.lock() = Some(pair.clone());
        self.publish(SessionState::Resuming, true, None);

        match self.fetch_profile(&pair.access).await {
            Ok(user) => {
                info!("resumed session for {}", user.email);
                self.publish(SessionState::Authenticated { user }, false, None);
            }
            Err(err) => {
                debug!("stored access token rejected: {err}");
                if let Err(err) = self.refresh().await {
                    info!("session resume failed, clearing stored tokens: {err}");
                    self.force_logout(None);
                }
            }
        }
    }

    /// Exchange credentials for a token pair and sign in.
    ///
    /// On failure nothing new is persisted and any previously held token
    /// pair is dropped; the session settles anonymous with the failure
    /// message recorded, and the error is re-raised so the caller can
    /// render its own feedback.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(ApiError::Validation(
                "enter a valid email address".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(ApiError::Validation("password is required".to_string()));
        }

        self.set_loading();

        let body = LoginRequest { email, password };
        let body = serde_json::to_value(&body).map_err(ApiError::Encode)?;
        match self
            .client
            .post::<LoginResponse>("/auth/login", None, Some(&body))
            .await
        {
            Ok(LoginResponse {
                access_token,
                refresh_token,
                user,
            }) => {
                let pair = TokenPair {
                    access: access_token,
                    refresh: refresh_token,
                };
                if let Err(err) = self.install_tokens(pair) {
                    self.publish(SessionState::Anonymous, false, Some(err.to_string()));
                    return Err(err);
                }
                info!("signed in as {}", user.email);
                self.publish(
                    SessionState::Authenticated { user: user.clone() },
                    false,
                    None,
                );
                Ok(user)
            }
            Err(err) => {
                // A failed attempt settles the session anonymous; any
                // previously held pair is dropped with it so the tokens
                // and the published state cannot disagree.
                self.force_logout(Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Sign out. Always succeeds locally and is idempotent; the server
    /// is notified on a detached task whose outcome is ignored.
    pub fn logout(&self) {
        let pair = { self.tokens.lock().clone() };
        if let Some(pair) = pair {
            let client = self.client.clone();
            tokio::spawn(async move {
                if let Err(err) = client
                    .send(Method::POST, "/auth/logout", Some(pair.access.as_str()), None)
                    .await
                {
                    debug!("logout notification failed: {err}");
                }
            });
        }
        self.force_logout(None);
    }

    /// Exchange the refresh token for a new access token and re-fetch
    /// the profile. The refresh token itself is not rotated.
    ///
    /// Raises on failure; the caller decides whether to fully sign out.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let refresh = self
            .tokens
            .lock()
            .as_ref()
            .map(|pair| pair.refresh.clone())
            .ok_or(ApiError::MissingRefreshToken)?;

        let refreshed: RefreshResponse = self
            .client
            .post("/auth/refresh", Some(refresh.as_str()), None)
            .await?;

        let pair = TokenPair {
            access: refreshed.access_token,
            refresh,
        };
        self.install_tokens(pair.clone())?;

        let user = self.fetch_profile(&pair.access).await?;
        debug!("refreshed access token for {}", user.email);
        self.publish(SessionState::Authenticated { user }, false, None);
        Ok(())
    }

    /// Replace the signed-in user's preferences with the server's
    /// response. Session state is untouched on failure.
    pub async fn update_preferences(&self, preferences: &Value) -> Result<Value, ApiError> {
        let Some(mut user) = self.snapshot().user().cloned() else {
            return Err(ApiError::NotAuthenticated);
        };

        let response = self
            .send_authorized(Method::PUT, "/auth/preferences", Some(preferences.clone()))
            .await?;
        let updated: Value = response.json().await.map_err(ApiError::Decode)?;

        user.preferences = updated.clone();
        self.publish(SessionState::Authenticated { user }, false, None);
        Ok(updated)
    }

    /// Change the account password. Tokens stay valid, so session state
    /// is not mutated on success.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), ApiError> {
        if self.snapshot().user().is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        if new.len() < 8 {
            return Err(ApiError::Validation(
                "new password must be at least 8 characters".to_string(),
            ));
        }

        let body = serde_json::to_value(ChangePasswordRequest {
            current_password: current,
            new_password: new,
        })
        .map_err(ApiError::Encode)?;
        self.send_authorized(Method::POST, "/auth/change-password", Some(body))
            .await?;
        Ok(())
    }

    /// Issue a request with the current access token.
    ///
    /// A 401 triggers exactly one refresh attempt followed by one retry;
    /// if the refresh fails, or the retry is rejected again, the session
    /// is fully signed out and the failure is returned. This is the only
    /// retry policy in the core.
    pub async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let token = self.access_token().ok_or(ApiError::NotAuthenticated)?;
        let first = self
            .client
            .send(method.clone(), path, Some(token.as_str()), body.as_ref())
            .await;

        let Err(ApiError::Unauthorized { .. }) = &first else {
            return first;
        };

        debug!("request to {path} was rejected, refreshing access token");
        if let Err(err) = self.refresh().await {
            warn!("token refresh failed, signing out: {err}");
            self.force_logout(Some(
                "your session has expired, please sign in again".to_string(),
            ));
            return first;
        }

        let token = self.access_token().ok_or(ApiError::NotAuthenticated)?;
        let retried = self
            .client
            .send(method, path, Some(token.as_str()), body.as_ref())
            .await;

        // A 401 surviving a fresh access token means the session itself
        // is no longer honoured; there is no second retry.
        if let Err(ApiError::Unauthorized { .. }) = &retried {
            warn!("request to {path} was rejected again after refresh, signing out");
            self.force_logout(Some(
                "your session has expired, please sign in again".to_string(),
            ));
        }
        retried
    }

    /// GET through the authorized path and decode the JSON body.
    pub async fn get_authorized<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send_authorized(Method::GET, path, None).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// POST through the authorized path and decode the JSON body.
    pub async fn post_authorized<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let response = self.send_authorized(Method::POST, path, Some(body)).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// PUT through the authorized path and decode the JSON body.
    pub async fn put_authorized<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let response = self.send_authorized(Method::PUT, path, Some(body)).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// DELETE through the authorized path, ignoring the response body.
    pub async fn delete_authorized(&self, path: &str) -> Result<(), ApiError> {
        self.send_authorized(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn fetch_profile(&self, access: &str) -> Result<User, ApiError> {
        self.client.get("/auth/profile", Some(access)).await
    }

    fn access_token(&self) -> Option<String> {
        self.tokens.lock().as_ref().map(|pair| pair.access.clone())
    }

    /// Persist and swap the token pair under one lock.
    fn install_tokens(&self, pair: TokenPair) -> Result<(), ApiError> {
        let mut tokens = self.tokens.lock();
        self.store.persist(&pair).map_err(ApiError::Store)?;
        *tokens = Some(pair);
        Ok(())
    }

    fn force_logout(&self, error: Option<String>) {
        {
            let mut tokens = self.tokens.lock();
            if let Err(err) = self.store.clear() {
                warn!("failed to clear token store: {err:#}");
            }
            *tokens = None;
        }
        self.publish(SessionState::Anonymous, false, error);
    }

    fn set_loading(&self) {
        let state = self.snapshots.borrow().state.clone();
        self.snapshots.send_replace(SessionSnapshot {
            state,
            is_loading: true,
            error: None,
        });
    }

    fn publish(&self, state: SessionState, is_loading: bool, error: Option<String>) {
        self.snapshots.send_replace(SessionSnapshot {
            state,
            is_loading,
            error,
        });
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("failed to compile email regex")
});
