//! Terminal client core for the TIDAL streaming service.
//!
//! This library holds the session and media-acquisition engine behind the
//! `tidecli` binary: device-flow authorization with persistent, refreshable
//! tokens, catalog resolution, and the playback and download pipelines that
//! turn a resolved media URL into audio output or a file on disk.
//!
//! # Modules
//!
//! - `cli` - Command-line handlers used by the binary
//! - `config` - Environment loading and runtime settings
//! - `engine` - Playback and download engines
//! - `error` - Error taxonomy shared by every layer
//! - `logging` - Diagnostic log setup
//! - `management` - Credential store and auth session
//! - `tidal` - Remote API client (auth, catalog, manifests)
//! - `types` - Data structures and type definitions
//! - `utils` - Formatting helpers and the progress throttle
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tidecli::{config::Settings, management::{AuthSession, CredentialStore}, tidal::CatalogResolver};
//!
//! #[tokio::main]
//! async fn main() -> tidecli::Result<()> {
//!     let settings = Arc::new(Settings::from_env()?);
//!     let store = CredentialStore::new(settings.credentials_path.clone());
//!     let session = Arc::new(AuthSession::restore(settings, store).await);
//!     let descriptor = CatalogResolver::new(session).resolve("441808188", tidecli::types::MediaKind::Track).await?;
//!     println!("{}", descriptor.media_url);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod management;
pub mod tidal;
pub mod types;
pub mod utils;

pub use error::{Error, Result};

/// Prints an informational message with a blue bullet point.
///
/// Creates a formatted output line with a distinctive blue "o" indicator
/// followed by the provided message. Used for general information and
/// status updates throughout the application.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// info!("Waiting for device approval...");
/// info!("[{}/{}] {}", index, count, title);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// Creates a formatted output line with a green "✓" indicator to signify
/// successful completion of operations. Used to provide positive feedback
/// when operations complete successfully.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// success!("Logged in as {}", username);
/// success!("Saved {} ({} bytes)", path, bytes);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Creates a formatted error output with a red "!" indicator and immediately
/// terminates the program with exit code 1. Used for unrecoverable errors
/// that require immediate program termination.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Behavior
///
/// This macro will cause the program to exit immediately after printing
/// the error message. It should only be used for fatal errors where
/// recovery is not possible.
///
/// # Example
///
/// ```
/// error!("Login failed: {}", e);
/// error!("{} must be set", var_name);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Creates a formatted output line with a yellow "!" indicator to highlight
/// potential issues or important notices that don't require program termination.
/// Used for recoverable issues or important information that users should notice.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// warning!("Not logged in, run tidecli login");
/// warning!("Skipping {}: {}", track_id, e);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
