pub mod config;
pub mod credentials;
pub mod session;

pub use config::{AppConfig, FirecrawlConfig, PollConfig};
pub use credentials::{CredentialEntry, CredentialStore, StoreError, ADMIN_USERNAME};
pub use session::{AuthError, Session, SessionAuthenticator};
