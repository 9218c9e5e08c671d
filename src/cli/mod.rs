//! # CLI Module
//!
//! Command handlers behind the `tidecli` binary. Each handler builds what it
//! needs from the environment, calls into the session, resolver or one of the
//! engines, and turns the outcome into coloured output. Fatal errors end the
//! process through the `error!` macro; everything below this layer returns
//! [`crate::Result`] instead.
//!
//! ## Commands
//!
//! - [`login`], [`logout`], [`status`] - device authorization and the stored token
//! - [`resolve`] - prints the stream descriptor of a track or the tracks of a collection
//! - [`play`] - streams a track, or every track of a collection, to the default output
//! - [`download`] - saves a track, or every track of a collection, to disk
//!
//! ## Interrupts
//!
//! Long-running commands install a ctrl+c handler that cancels the running
//! operation instead of killing the process, so temp files and the audio
//! device are released before `tidecli` exits.
//!
//! ## Usage
//!
//! ```bash
//! tidecli login
//! tidecli resolve 441808188
//! tidecli play 441808188
//! tidecli download 36ea71a8-445e-41a4-82ab-6628c581535d --kind playlist --output ~/music
//! ```

mod auth;
mod download;
mod play;
mod resolve;

use std::sync::Arc;

use futures::{Stream, StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

pub use auth::{login, logout, status};
pub use download::download;
pub use play::play;
pub use resolve::resolve;

use crate::{
    config::Settings,
    error,
    management::{AuthSession, CredentialStore},
    tidal::CatalogResolver,
    types::MediaKind,
};

/// Builds the session from the environment and the stored credentials.
async fn open_session() -> Arc<AuthSession> {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => error!("{}", e),
    };
    let store = CredentialStore::new(settings.credentials_path.clone());
    Arc::new(AuthSession::restore(Arc::new(settings), store).await)
}

/// Token cancelled by the first ctrl+c. A second ctrl+c exits right away,
/// for operations that no longer react to cancellation.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let signals = Box::pin(stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    }));
    tokio::spawn(relay_interrupts(signals, token.clone(), || {
        std::process::exit(130)
    }));
    token
}

async fn relay_interrupts<S>(mut signals: S, token: CancellationToken, force_exit: impl FnOnce())
where
    S: Stream<Item = ()> + Unpin,
{
    if signals.next().await.is_none() {
        return;
    }
    tracing::debug!("interrupt received");
    token.cancel();

    if signals.next().await.is_some() {
        tracing::debug!("second interrupt, exiting");
        force_exit();
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}

/// Track ids to work through for `id` of `kind`, in catalog order.
async fn track_ids(resolver: &CatalogResolver, id: &str, kind: MediaKind) -> Vec<String> {
    if kind == MediaKind::Track {
        return vec![id.to_string()];
    }

    let pb = spinner(&format!("Fetching tracks of {kind} {id}..."));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    let tracks = resolver.tracks_of(id, kind).await;
    pb.finish_and_clear();

    match tracks {
        Ok(tracks) if tracks.is_empty() => error!("{} {} has no tracks", kind, id),
        Ok(tracks) => tracks.into_iter().map(|t| t.id.to_string()).collect(),
        Err(e) => error!("{}", e),
    }
}
