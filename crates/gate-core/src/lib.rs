//! Connection protocols for a Novus gateway node.
//!
//! [`auth`] drives the client-facing SRP6 login; [`relay`] drives the
//! encrypted link to the simulation node. Both are transport-agnostic: a
//! caller feeds received bytes into a session and drains its [`Outbound`].

pub mod auth;
pub mod buffer;
pub mod cipher;
pub mod dispatch;
pub mod error;
pub mod opcode;
pub mod outbound;
pub mod relay;
pub mod srp;
pub mod store;

pub use buffer::ByteCursor;
pub use error::{BufferError, ProtocolError, StoreError};
pub use outbound::{Liveness, Outbound};
