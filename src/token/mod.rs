//! netcode-protocol - Connect tokens
//!
//! A connect token is issued by an external matcher and carried by the
//! client. Its private part is sealed under a key shared only by the issuer
//! and the servers, so the client can present it but cannot read or forge
//! it. This module covers:
//! - [`ConnectToken`] / [`ConnectTokenPrivate`] and [`validate_connect_token`]
//! - [`ChallengeToken`], the server-sealed proof echoed back during handshake
//! - [`ReplayCache`], the server's bounded `(client_id, nonce)` memory
//! - [`Matcher`] and [`LocalMatcher`] (feature `matcher`)

mod challenge_token;
mod connect_token;
#[cfg(feature = "matcher")]
mod matcher;
mod replay_cache;

pub use challenge_token::*;
pub use connect_token::*;
#[cfg(feature = "matcher")]
pub use matcher::*;
pub use replay_cache::*;
