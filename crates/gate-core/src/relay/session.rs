use std::sync::Arc;

use tracing::{debug, info, warn};

use super::handlers::{self, HandlerContext};
use super::messages::{Challenge, ForwardedPacket, RelayHeader};
use super::{RelayMessage, RelayState, RelayTable};
use crate::buffer::ByteCursor;
use crate::cipher::StreamCipher;
use crate::dispatch::{ReadQuota, Rejection};
use crate::error::ProtocolError;
use crate::opcode::RelayCommand;
use crate::outbound::Outbound;
use crate::store::CharacterStore;

pub const DEFAULT_MAX_BODY_SIZE: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub realm_id: u8,
    /// Declared body sizes above this close the link.
    pub max_body_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            realm_id: 1,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// A forwarded packet being gathered across reads.
#[derive(Debug, Default)]
struct PendingMessage {
    header: Vec<u8>,
    parsed: Option<RelayHeader>,
    body: Vec<u8>,
}

impl PendingMessage {
    fn header_needed(&self) -> usize {
        RelayHeader::LEN - self.header.len()
    }

    fn body_needed(&self) -> usize {
        self.parsed
            .map(|header| header.size as usize - self.body.len())
            .unwrap_or(0)
    }
}

/// The gateway's side of one relay link.
///
/// After the peer's challenge every inbound byte is decrypted exactly once,
/// in arrival order, and every outbound byte is encrypted before it is queued.
pub struct RelayConnection {
    table: Arc<RelayTable>,
    store: Arc<dyn CharacterStore>,
    outbound: Outbound,
    settings: RelaySettings,
    buffer: ByteCursor,
    quota: ReadQuota,
    state: RelayState,
    cipher: Option<StreamCipher>,
    // Absolute buffer offset up to which bytes are already plaintext.
    decrypted_to: usize,
    pending: Option<PendingMessage>,
}

impl RelayConnection {
    pub fn new(
        table: Arc<RelayTable>,
        store: Arc<dyn CharacterStore>,
        outbound: Outbound,
        settings: RelaySettings,
    ) -> Self {
        Self {
            table,
            store,
            outbound,
            settings,
            buffer: ByteCursor::new(),
            quota: ReadQuota::default(),
            state: RelayState::Challenge,
            cipher: None,
            decrypted_to: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub async fn on_read(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.buffer.append(bytes);
        self.quota.reset();
        let result = self.process().await;
        let shift = self.buffer.compact();
        self.decrypted_to = self.decrypted_to.saturating_sub(shift);
        if result.is_err() {
            self.state = RelayState::Closed;
        }
        result
    }

    fn decrypt_fresh(&mut self) {
        let Some(cipher) = self.cipher.as_mut() else {
            return;
        };
        let from = self.decrypted_to.max(self.buffer.read_pos());
        cipher.decrypt(self.buffer.bytes_mut_from(from));
        self.decrypted_to = self.buffer.write_pos();
    }

    async fn process(&mut self) -> Result<(), ProtocolError> {
        loop {
            self.decrypt_fresh();

            if self.pending.is_none() {
                let Some(opcode) = self.buffer.peek_u8() else {
                    break;
                };

                let entry = match self.table.admit(opcode, self.state, &mut self.quota) {
                    Ok(entry) => entry,
                    Err(Rejection::Unknown) => {
                        warn!(
                            opcode,
                            discarded = self.buffer.readable_len(),
                            "relay.read.unknown_opcode"
                        );
                        self.buffer.clear();
                        self.decrypted_to = 0;
                        break;
                    }
                    Err(Rejection::WrongState { .. }) => {
                        return Err(ProtocolError::StateViolation {
                            opcode,
                            state: format!("{:?}", self.state),
                        });
                    }
                    Err(Rejection::QuotaExceeded { limit }) => {
                        return Err(ProtocolError::QuotaExceeded { opcode, limit });
                    }
                };

                match entry.kind {
                    RelayMessage::ForwardPacket => {
                        self.pending = Some(PendingMessage::default());
                    }
                    RelayMessage::Challenge | RelayMessage::Proof => {
                        if self.buffer.readable_len() < entry.min_size {
                            break;
                        }
                        let message = ByteCursor::from(&self.buffer.readable()[..entry.min_size]);
                        self.buffer.advance(entry.min_size)?;
                        if entry.kind == RelayMessage::Challenge {
                            self.handle_challenge(message)?;
                        } else {
                            self.handle_proof();
                        }
                        continue;
                    }
                }
            }

            match self.feed_pending()? {
                Some(packet) => self.handle_forward(packet).await?,
                None => break,
            }
        }
        Ok(())
    }

    /// Moves buffered bytes into the in-flight message. Returns it once the
    /// declared body is complete.
    fn feed_pending(&mut self) -> Result<Option<ForwardedPacket>, ProtocolError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };

        let take = pending.header_needed().min(self.buffer.readable_len());
        if take > 0 {
            pending.header.extend_from_slice(self.buffer.read_bytes(take)?);
        }
        if pending.header_needed() > 0 {
            return Ok(None);
        }

        if pending.parsed.is_none() {
            let header = RelayHeader::decode(&mut ByteCursor::from(pending.header.as_slice()))?;
            let size = header.size as usize;
            if size > self.settings.max_body_size {
                return Err(ProtocolError::OversizedMessage {
                    len: size,
                    max: self.settings.max_body_size,
                });
            }
            pending.body.reserve_exact(size);
            pending.parsed = Some(header);
        }

        let take = pending.body_needed().min(self.buffer.readable_len());
        if take > 0 {
            pending.body.extend_from_slice(self.buffer.read_bytes(take)?);
        }
        if pending.body_needed() > 0 {
            return Ok(None);
        }

        let Some(PendingMessage {
            parsed: Some(header),
            body,
            ..
        }) = self.pending.take()
        else {
            return Ok(None);
        };
        Ok(Some(ForwardedPacket { header, body }))
    }

    fn handle_challenge(&mut self, mut message: ByteCursor) -> Result<(), ProtocolError> {
        self.state = RelayState::Closed;

        let challenge = Challenge::decode(&mut message)?;
        self.cipher = Some(StreamCipher::client(&challenge.secret));
        self.send_encrypted(vec![RelayCommand::PROOF])?;
        self.state = RelayState::Proof;
        debug!("relay.challenge.accepted");
        Ok(())
    }

    fn handle_proof(&mut self) {
        self.state = RelayState::Authed;
        info!(realm_id = self.settings.realm_id, "relay.authed");
    }

    async fn handle_forward(&mut self, packet: ForwardedPacket) -> Result<(), ProtocolError> {
        let ctx = HandlerContext {
            store: self.store.as_ref(),
            realm_id: self.settings.realm_id,
        };
        let reply = handlers::handle(&ctx, &packet).await;

        if !self.outbound.is_open() {
            return Err(ProtocolError::PeerGone);
        }

        let Some(reply) = reply else {
            return Ok(());
        };
        match ForwardedPacket::new(packet.header.account_id, reply.opcode, reply.body) {
            Ok(response) => self.send_encrypted(response.encode()),
            Err(err) => {
                warn!(
                    account_id = packet.header.account_id,
                    opcode = reply.opcode,
                    error = %err,
                    "relay.forward.reply_dropped"
                );
                Ok(())
            }
        }
    }

    fn send_encrypted(&mut self, mut bytes: Vec<u8>) -> Result<(), ProtocolError> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or(ProtocolError::MissingSessionKey)?;
        cipher.encrypt(&mut bytes);
        self.outbound.send(bytes);
        Ok(())
    }
}
