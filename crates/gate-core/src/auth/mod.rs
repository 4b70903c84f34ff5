//! Client-facing SRP6 authentication.

pub mod messages;
mod session;

pub use session::AuthConnection;

use crate::dispatch::{DispatchEntry, DispatchTable};
use crate::opcode::AuthCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Challenge,
    Proof,
    ReconnectProof,
    Authed,
    /// Realm list query outstanding against the store.
    WaitingForRealms,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMessage {
    LogonChallenge,
    LogonProof,
    ReconnectChallenge,
    ReconnectProof,
    RealmList,
}

pub type AuthTable = DispatchTable<AuthState, AuthMessage>;

/// Builds the auth opcode table. Call once at startup and share it.
pub fn dispatch_table() -> AuthTable {
    let entry = |required_state, min_size, max_per_read, kind| DispatchEntry {
        required_state,
        min_size,
        max_per_read,
        kind,
    };

    DispatchTable::new([
        (
            AuthCommand::LOGON_CHALLENGE,
            entry(
                AuthState::Challenge,
                messages::LogonChallenge::HEADER_LEN,
                1,
                AuthMessage::LogonChallenge,
            ),
        ),
        (
            AuthCommand::LOGON_PROOF,
            entry(
                AuthState::Proof,
                messages::LogonProof::LEN,
                1,
                AuthMessage::LogonProof,
            ),
        ),
        (
            AuthCommand::RECONNECT_CHALLENGE,
            entry(
                AuthState::Challenge,
                messages::LogonChallenge::HEADER_LEN,
                1,
                AuthMessage::ReconnectChallenge,
            ),
        ),
        (
            AuthCommand::RECONNECT_PROOF,
            entry(
                AuthState::ReconnectProof,
                messages::ReconnectProof::LEN,
                1,
                AuthMessage::ReconnectProof,
            ),
        ),
        (
            AuthCommand::REALM_LIST,
            entry(
                AuthState::Authed,
                messages::REALM_LIST_REQUEST_LEN,
                3,
                AuthMessage::RealmList,
            ),
        ),
    ])
}
