use std::time::Duration;

use chrono::Utc;
use colored::Colorize;

use crate::{
    cli::{cancel_on_interrupt, open_session, spinner},
    error,
    error::Error,
    info, success, utils, warning,
};

pub async fn login() {
    let session = open_session().await;
    let cancel = cancel_on_interrupt();
    let pb = spinner("Waiting for approval...");

    let result = session
        .login(&cancel, |code| {
            info!(
                "Open {} and confirm the code {}",
                code.url().underline(),
                code.user_code.bold()
            );
            if webbrowser::open(code.url()).is_err() {
                warning!("Cannot open a browser, visit the URL above manually");
            }
            pb.enable_steady_tick(Duration::from_millis(100));
        })
        .await;
    pb.finish_and_clear();

    match result {
        Ok(bundle) => match bundle.username {
            Some(user) => success!("Logged in as {}", user),
            None => success!("Logged in"),
        },
        Err(Error::Cancelled) => warning!("Login cancelled"),
        Err(e) => error!("Login failed: {}", e),
    }
}

pub async fn logout() {
    let session = open_session().await;
    match session.logout().await {
        Ok(()) => success!("Logged out"),
        Err(e) => error!("{}", e),
    }
}

pub async fn status() {
    let session = open_session().await;
    let Some(bundle) = session.bundle().await else {
        warning!("Not logged in, run tidecli login");
        return;
    };

    let who = bundle
        .username
        .clone()
        .or_else(|| bundle.user_id.map(|id| format!("user {id}")))
        .unwrap_or_else(|| "unknown user".to_string());
    success!("Logged in as {}", who);
    info!("Country: {}", session.country_code().await);
    info!(
        "Access token expires {}",
        utils::format_expiry(bundle.expires_at, Utc::now().timestamp())
    );
    info!("Credentials: {}", session.store().path().display());
}
