pub mod callback;
pub mod discovery;
pub mod flow;
pub mod pkce;
pub mod token;

pub use callback::{listen_for_callback, CallbackParams};
pub use discovery::{DiscoveryDocument, DiscoveryResolver};
pub use flow::{FlowState, LoginController};
pub use pkce::{
    challenge_from_verifier, generate_pkce, generate_state, generate_verifier, PkcePair,
};
pub use token::{TokenClient, TokenResponse};
