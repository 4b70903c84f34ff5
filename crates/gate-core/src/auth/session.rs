use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::messages::{
    self, ChallengeResponse, LogonChallenge, LogonProof, ProofResponse, RealmEntry, RealmList,
    ReconnectChallengeResponse, ReconnectProof,
};
use super::{AuthMessage, AuthState, AuthTable};
use crate::buffer::ByteCursor;
use crate::dispatch::{ReadQuota, Rejection};
use crate::error::ProtocolError;
use crate::opcode::{AuthCommand, AuthResult};
use crate::outbound::Outbound;
use crate::srp::{self, ProofOutcome, SessionKey, SrpServer};
use crate::store::AccountStore;

/// One client-facing auth connection.
///
/// The transport feeds every read into [`AuthConnection::on_read`] and awaits
/// it before reading again. An `Err` means the connection must be closed.
pub struct AuthConnection {
    table: Arc<AuthTable>,
    store: Arc<dyn AccountStore>,
    outbound: Outbound,
    buffer: ByteCursor,
    quota: ReadQuota,
    state: AuthState,
    username: String,
    account_id: u32,
    srp: Option<SrpServer>,
    session_key: Option<SessionKey>,
    reconnect_proof: Option<[u8; 16]>,
}

impl AuthConnection {
    pub fn new(table: Arc<AuthTable>, store: Arc<dyn AccountStore>, outbound: Outbound) -> Self {
        Self {
            table,
            store,
            outbound,
            buffer: ByteCursor::new(),
            quota: ReadQuota::default(),
            state: AuthState::Challenge,
            username: String::new(),
            account_id: 0,
            srp: None,
            session_key: None,
            reconnect_proof: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn account_id(&self) -> u32 {
        self.account_id
    }

    pub fn is_authed(&self) -> bool {
        self.state == AuthState::Authed
    }

    pub async fn on_read(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.buffer.append(bytes);
        self.quota.reset();
        let result = self.process().await;
        self.buffer.compact();
        if result.is_err() {
            self.state = AuthState::Closed;
        }
        result
    }

    async fn process(&mut self) -> Result<(), ProtocolError> {
        while let Some(opcode) = self.buffer.peek_u8() {
            let entry = match self.table.admit(opcode, self.state, &mut self.quota) {
                Ok(entry) => entry,
                Err(Rejection::Unknown) => {
                    warn!(
                        opcode,
                        discarded = self.buffer.readable_len(),
                        "auth.read.unknown_opcode"
                    );
                    self.buffer.clear();
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

            let available = self.buffer.readable_len();
            if available < entry.min_size {
                break;
            }

            let mut size = entry.min_size;
            if matches!(
                entry.kind,
                AuthMessage::LogonChallenge | AuthMessage::ReconnectChallenge
            ) {
                let header = self.buffer.readable();
                let declared = u16::from_le_bytes([header[2], header[3]]) as usize;
                size = LogonChallenge::HEADER_LEN + declared;
                if size > LogonChallenge::MAX_LEN {
                    return Err(ProtocolError::OversizedMessage {
                        len: size,
                        max: LogonChallenge::MAX_LEN,
                    });
                }
                if available < size {
                    break;
                }
            }

            let message = ByteCursor::from(&self.buffer.readable()[..size]);
            self.buffer.advance(size)?;

            match entry.kind {
                AuthMessage::LogonChallenge => self.handle_logon_challenge(message).await?,
                AuthMessage::LogonProof => self.handle_logon_proof(message).await?,
                AuthMessage::ReconnectChallenge => {
                    self.handle_reconnect_challenge(message).await?
                }
                AuthMessage::ReconnectProof => self.handle_reconnect_proof(message)?,
                AuthMessage::RealmList => self.handle_realm_list().await?,
            }
        }
        Ok(())
    }

    /// Fails once the transport has gone away during a store call.
    fn ensure_live(&self) -> Result<(), ProtocolError> {
        if self.outbound.is_open() {
            Ok(())
        } else {
            Err(ProtocolError::PeerGone)
        }
    }

    async fn handle_logon_challenge(&mut self, mut message: ByteCursor) -> Result<(), ProtocolError> {
        self.state = AuthState::Closed;

        let request = LogonChallenge::decode(&mut message)?;
        self.username = request.username;
        debug!(
            username = %self.username,
            build = request.build,
            "auth.challenge.received"
        );

        let lookup = self.store.credentials(&self.username).await;
        self.ensure_live()?;

        let credentials = match lookup {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                info!(username = %self.username, "auth.challenge.unknown_account");
                self.outbound
                    .send(ChallengeResponse::failure(AuthResult::UNKNOWN_ACCOUNT));
                return Ok(());
            }
            Err(err) => {
                warn!(username = %self.username, error = %err, "auth.challenge.store_failed");
                self.outbound
                    .send(ChallengeResponse::failure(AuthResult::DB_BUSY));
                return Ok(());
            }
        };

        self.account_id = credentials.account_id;
        let server = SrpServer::new(credentials.salt, &credentials.verifier);
        let response = ChallengeResponse::success(
            &server.public_ephemeral(),
            &server.generator_bytes(),
            &srp::N_BYTES,
            &server.salt(),
            &srp::VERSION_CHALLENGE,
        );
        self.srp = Some(server);
        self.state = AuthState::Proof;
        self.outbound.send(response);

        info!(
            username = %self.username,
            account_id = self.account_id,
            "auth.challenge.accepted"
        );
        Ok(())
    }

    async fn handle_logon_proof(&mut self, mut message: ByteCursor) -> Result<(), ProtocolError> {
        self.state = AuthState::Closed;

        let request = LogonProof::decode(&mut message)?;
        let server = self.srp.take().ok_or_else(|| ProtocolError::StateViolation {
            opcode: AuthCommand::LOGON_PROOF,
            state: format!("{:?}", AuthState::Proof),
        })?;

        let outcome = server.verify_client_proof(
            &self.username,
            &request.client_ephemeral,
            &request.client_proof,
        )?;

        let (session_key, server_proof) = match outcome {
            ProofOutcome::Accepted {
                session_key,
                server_proof,
            } => (session_key, server_proof),
            ProofOutcome::Rejected => {
                info!(username = %self.username, "auth.proof.mismatch");
                self.outbound
                    .send(ProofResponse::failure(AuthResult::UNKNOWN_ACCOUNT));
                return Ok(());
            }
        };

        let stored = self
            .store
            .store_session_key(&self.username, session_key)
            .await;
        self.ensure_live()?;

        if let Err(err) = stored {
            warn!(username = %self.username, error = %err, "auth.proof.store_failed");
            self.outbound
                .send(ProofResponse::failure(AuthResult::DB_BUSY));
            return Ok(());
        }

        self.outbound.send(ProofResponse::success(&server_proof));
        self.session_key = Some(session_key);
        self.state = AuthState::Authed;
        info!(
            username = %self.username,
            account_id = self.account_id,
            "auth.proof.accepted"
        );
        Ok(())
    }

    async fn handle_reconnect_challenge(
        &mut self,
        mut message: ByteCursor,
    ) -> Result<(), ProtocolError> {
        self.state = AuthState::Closed;

        let request = LogonChallenge::decode(&mut message)?;
        self.username = request.username;

        let credentials = self.store.credentials(&self.username).await;
        self.ensure_live()?;
        let session_key = match credentials {
            Ok(Some(credentials)) => {
                self.account_id = credentials.account_id;
                let key = self.store.session_key(&self.username).await;
                self.ensure_live()?;
                key
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };

        match session_key {
            Ok(Some(key)) => {
                let challenge: [u8; 16] = rand::random();
                self.session_key = Some(key);
                self.reconnect_proof = Some(challenge);
                self.state = AuthState::ReconnectProof;
                self.outbound
                    .send(ReconnectChallengeResponse::success(&challenge));
                info!(username = %self.username, "auth.reconnect.challenged");
            }
            Ok(None) => {
                info!(username = %self.username, "auth.reconnect.no_session");
                self.outbound.send(ReconnectChallengeResponse::failure(
                    AuthResult::UNKNOWN_ACCOUNT,
                ));
            }
            Err(err) => {
                warn!(username = %self.username, error = %err, "auth.reconnect.store_failed");
                self.outbound
                    .send(ReconnectChallengeResponse::failure(AuthResult::DB_BUSY));
            }
        }
        Ok(())
    }

    fn handle_reconnect_proof(&mut self, mut message: ByteCursor) -> Result<(), ProtocolError> {
        self.state = AuthState::Closed;

        let request = ReconnectProof::decode(&mut message)?;
        let (Some(challenge), Some(session_key)) = (self.reconnect_proof.take(), self.session_key)
        else {
            return Err(ProtocolError::MissingSessionKey);
        };

        let expected = srp::reconnect_digest(
            &self.username,
            &request.client_random,
            &challenge,
            &session_key,
        );
        if !srp::digests_match(&expected, &request.client_proof) {
            return Err(ProtocolError::ReconnectMismatch);
        }

        self.outbound.send(messages::reconnect_proof_success());
        self.state = AuthState::Authed;
        info!(username = %self.username, "auth.reconnect.accepted");
        Ok(())
    }

    async fn handle_realm_list(&mut self) -> Result<(), ProtocolError> {
        self.state = AuthState::WaitingForRealms;

        let realms = self.store.realms().await;
        self.ensure_live()?;
        let realms = realms.unwrap_or_else(|err| {
            warn!(error = %err, "auth.realm_list.store_failed");
            Vec::new()
        });

        let counts = self.store.realm_character_counts(self.account_id).await;
        self.ensure_live()?;
        let counts = counts.unwrap_or_else(|err| {
            warn!(
                account_id = self.account_id,
                error = %err,
                "auth.realm_list.counts_failed"
            );
            HashMap::new()
        });

        let entries: Vec<RealmEntry> = realms
            .iter()
            .map(|realm| {
                RealmEntry::from_realm(realm, counts.get(&realm.id).copied().unwrap_or(0))
            })
            .collect();

        self.outbound.send(RealmList::encode(&entries)?);
        self.state = AuthState::Authed;
        debug!(
            account_id = self.account_id,
            realms = entries.len(),
            "auth.realm_list.sent"
        );
        Ok(())
    }
}
