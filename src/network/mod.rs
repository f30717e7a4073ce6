//! Network Layer
//!
//! WebSocket server exposing the mint contract to authenticated clients.
//! Contract state is only touched through `mint/`.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{
    ClientMessage, ConfigUpdate, ErrorCode, QueryAnswer, QueryRequest, Receipt, ReceiptOutcome,
    ServerMessage,
};
pub use server::{ClientSession, MintServer, MintServerError, MintService, ServerConfig};
