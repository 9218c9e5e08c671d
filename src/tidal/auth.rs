use reqwest::{Client, StatusCode};

use crate::{
    config::Settings,
    error::{Error, Result},
    types::{DeviceCode, OAuthError, TokenResponse},
};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Outcome of a single poll of the token endpoint during device authorization.
#[derive(Debug)]
pub enum PollOutcome {
    Granted(TokenResponse),
    /// The user has not approved yet.
    Pending,
    /// The service asks for a longer polling interval.
    SlowDown,
}

/// Starts device authorization and returns the code the user has to approve.
///
/// Calls `POST {auth_url}/device_authorization` with the client id and scope.
pub async fn request_device_code(client: &Client, settings: &Settings) -> Result<DeviceCode> {
    let url = format!("{}/device_authorization", settings.auth_url);
    let response = client
        .post(&url)
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("scope", settings.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::unavailable("device authorization", e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, "device authorization", body));
    }

    response
        .json::<DeviceCode>()
        .await
        .map_err(|e| Error::unavailable("device authorization", e))
}

/// Polls the token endpoint once for the given device code.
///
/// `authorization_pending` and `slow_down` are not failures; they tell the
/// caller to keep polling. `expired_token` and `access_denied` end the flow.
pub async fn poll_token(
    client: &Client,
    settings: &Settings,
    device_code: &DeviceCode,
) -> Result<PollOutcome> {
    let url = format!("{}/token", settings.auth_url);
    let response = client
        .post(&url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("device_code", device_code.device_code.as_str()),
            ("grant_type", DEVICE_CODE_GRANT),
            ("scope", settings.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::unavailable("token poll", e))?;

    let status = response.status();
    if status.is_success() {
        let grant = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::unavailable("token poll", e))?;
        return Ok(PollOutcome::Granted(grant));
    }

    let body = response.text().await.unwrap_or_default();
    let oauth: OAuthError = serde_json::from_str(&body).unwrap_or_default();
    match oauth.error.as_str() {
        "authorization_pending" => Ok(PollOutcome::Pending),
        "slow_down" => Ok(PollOutcome::SlowDown),
        "expired_token" => Err(Error::AuthFlowExpired),
        "access_denied" => Err(Error::AuthDenied),
        _ => Err(status_error(status, "token poll", body)),
    }
}

/// Exchanges a refresh token for a new access token.
///
/// A 400/401 answer means the refresh token was revoked or has expired and is
/// reported as [`Error::NotAuthenticated`]. Transport failures and server
/// errors are [`Error::RemoteUnavailable`].
pub async fn refresh_token(
    client: &Client,
    settings: &Settings,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let url = format!("{}/token", settings.auth_url);
    let response = client
        .post(&url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", settings.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::unavailable("token refresh", e))?;

    let status = response.status();
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        let oauth: OAuthError = serde_json::from_str(&body).unwrap_or_default();
        tracing::info!(status = status.as_u16(), error = %oauth.error, "refresh token rejected");
        return Err(Error::NotAuthenticated);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, "token refresh", body));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::unavailable("token refresh", e))
}

fn status_error(status: StatusCode, context: &str, body: String) -> Error {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Error::unavailable(context, format!("HTTP {}", status.as_u16()));
    }

    let message = serde_json::from_str::<OAuthError>(&body)
        .ok()
        .and_then(|e| e.error_description.or(Some(e.error)))
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Error::Rejected {
        status: status.as_u16(),
        message,
    }
}
