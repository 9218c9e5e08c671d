mod credentials;
mod session;

pub use credentials::CredentialStore;
pub use session::AuthSession;
pub use session::AuthState;
pub use session::default_client;
pub(crate) use session::request_context;
