//! Opcode dispatch and validation shared by the auth and relay protocols.
//!
//! A [`DispatchTable`] is built once per protocol at startup and shared by
//! reference (`Arc`) across every connection of that kind. It never changes
//! afterwards, so no locking is involved.

use std::collections::HashMap;
use std::fmt::Debug;

/// Validation data attached to one opcode.
///
/// `kind` selects the handler: each protocol defines a closed enum of
/// commands and its session matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry<S, K> {
    pub required_state: S,
    pub min_size: usize,
    pub max_per_read: u16,
    pub kind: K,
}

/// Why an opcode was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection<S> {
    /// No entry for the opcode: the stream can no longer be framed.
    Unknown,
    WrongState { required: S },
    QuotaExceeded { limit: u16 },
}

#[derive(Debug, Clone)]
pub struct DispatchTable<S, K> {
    entries: HashMap<u8, DispatchEntry<S, K>>,
}

impl<S, K> DispatchTable<S, K>
where
    S: Copy + Eq + Debug,
    K: Copy + Debug,
{
    pub fn new(entries: impl IntoIterator<Item = (u8, DispatchEntry<S, K>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn lookup(&self, opcode: u8) -> Option<&DispatchEntry<S, K>> {
        self.entries.get(&opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `opcode`, checks it against the connection state and charges
    /// one invocation to the read-cycle quota.
    pub fn admit(
        &self,
        opcode: u8,
        state: S,
        quota: &mut ReadQuota,
    ) -> Result<DispatchEntry<S, K>, Rejection<S>> {
        let entry = *self.lookup(opcode).ok_or(Rejection::Unknown)?;
        if entry.required_state != state {
            return Err(Rejection::WrongState {
                required: entry.required_state,
            });
        }
        if !quota.charge(opcode, entry.max_per_read) {
            return Err(Rejection::QuotaExceeded {
                limit: entry.max_per_read,
            });
        }
        Ok(entry)
    }
}

/// Per-opcode invocation counters for a single transport read callback.
#[derive(Debug, Clone)]
pub struct ReadQuota {
    counts: [u16; 256],
}

impl Default for ReadQuota {
    fn default() -> Self {
        Self { counts: [0; 256] }
    }
}

impl ReadQuota {
    /// Called at the start of every read callback.
    pub fn reset(&mut self) {
        self.counts = [0; 256];
    }

    /// Returns false once `opcode` has already been charged `limit` times.
    pub fn charge(&mut self, opcode: u8, limit: u16) -> bool {
        let count = &mut self.counts[opcode as usize];
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    pub fn count(&self, opcode: u8) -> u16 {
        self.counts[opcode as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum State {
        Open,
        Done,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Cmd {
        Ping,
    }

    fn table() -> DispatchTable<State, Cmd> {
        DispatchTable::new([(
            7,
            DispatchEntry {
                required_state: State::Open,
                min_size: 3,
                max_per_read: 2,
                kind: Cmd::Ping,
            },
        )])
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut quota = ReadQuota::default();
        assert_eq!(
            table().admit(8, State::Open, &mut quota),
            Err(Rejection::Unknown)
        );
    }

    #[test]
    fn wrong_state_is_rejected_without_charging_quota() {
        let mut quota = ReadQuota::default();
        assert_eq!(
            table().admit(7, State::Done, &mut quota),
            Err(Rejection::WrongState {
                required: State::Open
            })
        );
        assert_eq!(quota.count(7), 0);
    }

    #[test]
    fn quota_is_enforced_until_reset() {
        let table = table();
        let mut quota = ReadQuota::default();
        assert!(table.admit(7, State::Open, &mut quota).is_ok());
        assert!(table.admit(7, State::Open, &mut quota).is_ok());
        assert_eq!(
            table.admit(7, State::Open, &mut quota),
            Err(Rejection::QuotaExceeded { limit: 2 })
        );

        quota.reset();
        let entry = table.admit(7, State::Open, &mut quota).unwrap();
        assert_eq!(entry.kind, Cmd::Ping);
        assert_eq!(entry.min_size, 3);
    }
}
