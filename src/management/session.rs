use std::{sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    error::{Error, Result},
    management::CredentialStore,
    tidal::auth::{self, PollOutcome},
    types::{DeviceCode, TokenBundle},
};

/// Authentication state as published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authorizing,
    Authenticated,
    Refreshing,
}

/// Owns the process-wide token bundle and gates every remote call on it.
///
/// The bundle sits behind an async mutex that is held for the whole duration
/// of a refresh. A caller that finds the token stale refreshes it while still
/// holding the lock; everyone queued behind it then sees the renewed bundle
/// (or its absence after a revoked refresh) instead of starting a second
/// refresh with a refresh token that may already have been rotated.
pub struct AuthSession {
    client: Client,
    settings: Arc<Settings>,
    store: CredentialStore,
    token: Mutex<Option<TokenBundle>>,
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    /// Creates a session with a default HTTP client and the bundle found in `store`.
    pub async fn restore(settings: Arc<Settings>, store: CredentialStore) -> Self {
        Self::with_client(default_client(), settings, store).await
    }

    /// Like [`AuthSession::restore`], with a caller-supplied HTTP client.
    pub async fn with_client(client: Client, settings: Arc<Settings>, store: CredentialStore) -> Self {
        let token = store.load().await;
        let initial = match token {
            Some(_) => AuthState::Authenticated,
            None => AuthState::Unauthenticated,
        };
        let (state, _) = watch::channel(initial);

        AuthSession {
            client,
            settings,
            store,
            token: Mutex::new(token),
            state,
        }
    }

    /// Current state, without waiting for an in-flight refresh.
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change, including `Refreshing`.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Plain HTTP client for requests that carry no session credentials.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Snapshot of the current bundle, waiting for an in-flight refresh.
    pub async fn bundle(&self) -> Option<TokenBundle> {
        self.token.lock().await.clone()
    }

    /// Country used to scope catalog requests.
    pub async fn country_code(&self) -> String {
        self.token
            .lock()
            .await
            .as_ref()
            .and_then(|b| b.country_code.clone())
            .unwrap_or_else(|| self.settings.country.clone())
    }

    /// Runs device authorization until the user approves it, the code
    /// expires or `cancel` fires.
    ///
    /// `on_code` is called once with the code and URL to show the user.
    pub async fn login<F>(&self, cancel: &CancellationToken, on_code: F) -> Result<TokenBundle>
    where
        F: FnOnce(&DeviceCode),
    {
        let previous = match self.state() {
            AuthState::Authorizing | AuthState::Refreshing => AuthState::Unauthenticated,
            other => other,
        };
        self.state.send_replace(AuthState::Authorizing);

        let result = self.run_device_flow(cancel, on_code).await;
        match &result {
            Ok(_) => self.state.send_replace(AuthState::Authenticated),
            Err(e) => {
                tracing::info!(error = %e, "device authorization ended without a token");
                self.state.send_replace(previous)
            }
        };
        result
    }

    async fn run_device_flow<F>(&self, cancel: &CancellationToken, on_code: F) -> Result<TokenBundle>
    where
        F: FnOnce(&DeviceCode),
    {
        let code = auth::request_device_code(&self.client, &self.settings).await?;
        on_code(&code);

        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval);
        let mut polls = 0u32;

        loop {
            let wake = Instant::now() + interval;
            if wake > deadline {
                return Err(Error::AuthFlowExpired);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(wake) => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = auth::poll_token(&self.client, &self.settings, &code) => outcome?,
            };
            polls += 1;

            match outcome {
                PollOutcome::Granted(grant) => {
                    let bundle = TokenBundle::from_grant(grant, Utc::now().timestamp()).ok_or(
                        Error::Rejected {
                            status: 200,
                            message: "token response carries no refresh token".to_string(),
                        },
                    )?;
                    self.store.save(&bundle).await?;
                    *self.token.lock().await = Some(bundle.clone());
                    tracing::info!(polls, "device authorization approved");
                    return Ok(bundle);
                }
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => interval += Duration::from_secs(5),
            }
        }
    }

    /// Forgets the bundle and deletes the credential file. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        let mut guard = self.token.lock().await;
        *guard = None;
        self.state.send_replace(AuthState::Unauthenticated);
        self.store.clear().await
    }

    /// Returns an access token that is not known to be stale, refreshing it
    /// first when it expires within the configured margin.
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let Some(bundle) = guard.as_ref() else {
            return Err(Error::NotAuthenticated);
        };

        let margin = self.settings.refresh_margin.as_secs() as i64;
        if !bundle.is_stale(Utc::now().timestamp(), margin) {
            return Ok(bundle.access_token.clone());
        }

        self.refresh_locked(&mut guard).await
    }

    /// Sends `request` with the session's bearer token.
    ///
    /// The token is refreshed beforehand when stale. If the service still
    /// answers 401 the token is force-refreshed once and the request retried,
    /// provided the request body can be replayed.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let replay = request.try_clone();
        let token = self.access_token().await?;

        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::unavailable(request_context(&e), e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            return Err(Error::NotAuthenticated);
        };
        tracing::info!(url = %response.url().path(), "access token rejected, refreshing");

        let token = self.replace_rejected(&token).await?;
        let response = replay
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::unavailable(request_context(&e), e))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::NotAuthenticated);
        }
        Ok(response)
    }

    async fn replace_rejected(&self, rejected: &str) -> Result<String> {
        let mut guard = self.token.lock().await;
        let current = guard.as_ref().map(|b| b.access_token.clone());
        match current {
            None => Err(Error::NotAuthenticated),
            // another caller already replaced the rejected token
            Some(token) if token != rejected => Ok(token),
            Some(_) => self.refresh_locked(&mut guard).await,
        }
    }

    async fn refresh_locked(&self, guard: &mut MutexGuard<'_, Option<TokenBundle>>) -> Result<String> {
        let Some(current) = guard.clone() else {
            return Err(Error::NotAuthenticated);
        };

        self.state.send_replace(AuthState::Refreshing);
        tracing::debug!("refreshing access token");

        match auth::refresh_token(&self.client, &self.settings, &current.refresh_token).await {
            Ok(grant) => {
                let renewed = current.renewed(grant, Utc::now().timestamp());
                if let Err(e) = self.store.save(&renewed).await {
                    tracing::warn!(error = %e, "refreshed token could not be persisted");
                }
                let token = renewed.access_token.clone();
                **guard = Some(renewed);
                self.state.send_replace(AuthState::Authenticated);
                tracing::info!("access token refreshed");
                Ok(token)
            }
            Err(Error::NotAuthenticated) => {
                **guard = None;
                self.state.send_replace(AuthState::Unauthenticated);
                if let Err(e) = self.store.clear().await {
                    tracing::warn!(error = %e, "cannot remove revoked credentials");
                }
                Err(Error::NotAuthenticated)
            }
            Err(e) => {
                self.state.send_replace(AuthState::Authenticated);
                tracing::warn!(error = %e, "token refresh failed");
                Err(e)
            }
        }
    }
}

/// HTTP client shared by the session, resolver and engines.
///
/// Only connecting is bounded; a total timeout would cut long media streams.
pub fn default_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn request_context(e: &reqwest::Error) -> String {
    match e.url() {
        Some(url) => format!("{} {}", url.host_str().unwrap_or_default(), url.path()),
        None => "request".to_string(),
    }
}
