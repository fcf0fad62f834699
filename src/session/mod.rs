pub mod credential;
pub mod handshake;
pub mod store;

pub use credential::ApiSession;
pub use handshake::{Handshake, PkceSession, AUTH_ERROR_KEY, PKCE_STATE_KEY, PKCE_VERIFIER_KEY};
pub use store::{default_session_path, FileSessionStore, MemorySessionStore, SessionStore};
