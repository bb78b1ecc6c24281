use std::sync::Arc;

use dash_core::{CredentialStore, SessionAuthenticator};
use firecrawl::ScrapeBackend;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub auth: SessionAuthenticator,
    /// `None` when no Firecrawl API key is configured.
    pub backend: Option<Arc<dyn ScrapeBackend>>,
}
