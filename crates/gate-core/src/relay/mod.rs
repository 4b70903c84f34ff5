//! Encrypted node-to-node relay.

pub mod handlers;
pub mod messages;
mod session;

pub use session::{RelayConnection, RelaySettings, DEFAULT_MAX_BODY_SIZE};

use crate::dispatch::{DispatchEntry, DispatchTable};
use crate::opcode::RelayCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Challenge,
    Proof,
    Authed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMessage {
    Challenge,
    Proof,
    ForwardPacket,
}

pub type RelayTable = DispatchTable<RelayState, RelayMessage>;

/// Forwarded packets a peer may push within one read.
pub const FORWARD_QUOTA: u16 = 512;

/// Builds the relay opcode table. Call once at startup and share it.
///
/// A forwarded packet's minimum size is its header; the session gathers it
/// across reads instead of waiting for it to arrive in one piece.
pub fn dispatch_table() -> RelayTable {
    DispatchTable::new([
        (
            RelayCommand::CHALLENGE,
            DispatchEntry {
                required_state: RelayState::Challenge,
                min_size: messages::Challenge::LEN,
                max_per_read: 1,
                kind: RelayMessage::Challenge,
            },
        ),
        (
            RelayCommand::PROOF,
            DispatchEntry {
                required_state: RelayState::Proof,
                min_size: 1,
                max_per_read: 1,
                kind: RelayMessage::Proof,
            },
        ),
        (
            RelayCommand::FORWARD_PACKET,
            DispatchEntry {
                required_state: RelayState::Authed,
                min_size: messages::RelayHeader::LEN,
                max_per_read: FORWARD_QUOTA,
                kind: RelayMessage::ForwardPacket,
            },
        ),
    ])
}
