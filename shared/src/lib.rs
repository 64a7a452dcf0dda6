#![forbid(missing_docs)]

//! The `shared` crate contains all the components which are used by both the client and the server: the card engine, the per-game state machine, the lobby entity and the wire protocol.

mod lobby;
mod logic;
mod net;

pub use lobby::*;
pub use logic::*;
pub use net::*;
