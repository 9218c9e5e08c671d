//! # TIDAL Integration Module
//!
//! Thin wrappers around the remote endpoints the client needs: the OAuth 2.0
//! device authorization grant, the catalog lookups and the playback manifest
//! format.
//!
//! ## Architecture
//!
//! ```text
//! Application Layer (CLI, Engines)
//!          ↓
//! Session (management::AuthSession)
//!          ↓
//! TIDAL Integration Layer
//!     ├── Authentication (device code, token refresh)
//!     ├── Catalog (tracks, collections, playback info)
//!     └── Manifest (BTS decoding)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! The functions in [`auth`] talk to the token endpoint directly and never
//! touch the credential store; persisting and sharing the resulting bundle is
//! the job of [`crate::management::AuthSession`]. Everything in [`catalog`]
//! goes through the session so that a stale token is renewed transparently.
//!
//! ## Error Mapping
//!
//! Remote answers are folded into [`crate::Error`]:
//!
//! - `404` becomes `NotFound`
//! - `401` that survives one forced refresh becomes `NotAuthenticated`
//! - `429`, `5xx` and transport failures become `RemoteUnavailable`
//! - everything else becomes `Rejected` with the service's message

pub mod auth;
pub mod catalog;
pub mod manifest;

pub use catalog::CatalogResolver;
