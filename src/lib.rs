pub mod cli;
pub mod config;
pub mod error;
pub mod navigation;
pub mod oauth;
pub mod session;

pub use config::{load_config, AuthConfig};
pub use error::{AuthError, ProtocolViolation};
pub use navigation::{BrowserNavigator, Navigator, RecordingNavigator};
pub use oauth::{
    CallbackParams, DiscoveryResolver, FlowState, LoginController, TokenClient, TokenResponse,
};
pub use session::{ApiSession, FileSessionStore, MemorySessionStore, SessionStore};
