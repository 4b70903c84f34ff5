//! Field-by-field codecs for the client-facing auth protocol.

use crate::buffer::ByteCursor;
use crate::error::{BufferError, ProtocolError};
use crate::opcode::{AuthCommand, AuthResult};
use crate::store::Realm;

/// Logon (and reconnect) challenge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonChallenge {
    pub command: u8,
    pub error: u8,
    pub size: u16,
    pub game_name: [u8; 4],
    pub version: [u8; 3],
    pub build: u16,
    pub platform: [u8; 4],
    pub os: [u8; 4],
    pub country: [u8; 4],
    pub timezone_bias: u32,
    pub ip: u32,
    pub username: String,
}

impl LogonChallenge {
    /// Opcode, error byte and the u16 size of everything after it.
    pub const HEADER_LEN: usize = 4;

    /// Largest acceptable message: the fixed part, one username byte, and a
    /// 16-byte allowance.
    pub const MAX_LEN: usize = 51;

    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        let command = buf.read_u8()?;
        let error = buf.read_u8()?;
        let size = buf.read_u16()?;
        let game_name = buf.read_array()?;
        let version = buf.read_array()?;
        let build = buf.read_u16()?;
        let platform = buf.read_array()?;
        let os = buf.read_array()?;
        let country = buf.read_array()?;
        let timezone_bias = buf.read_u32()?;
        let ip = buf.read_u32()?;
        let username_len = buf.read_u8()? as usize;
        let username = String::from_utf8_lossy(buf.read_bytes(username_len)?).into_owned();

        Ok(Self {
            command,
            error,
            size,
            game_name,
            version,
            build,
            platform,
            os,
            country,
            timezone_bias,
            ip,
            username,
        })
    }

    /// Encodes the request with `size` recomputed from the username.
    ///
    /// Usernames longer than 255 bytes are cut to fit the length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let username = username_bytes(&self.username);
        let mut buf = ByteCursor::with_capacity(Self::MAX_LEN);
        buf.write_u8(self.command);
        buf.write_u8(self.error);
        buf.write_u16(30 + username.len() as u16);
        buf.append(&self.game_name);
        buf.append(&self.version);
        buf.write_u16(self.build);
        buf.append(&self.platform);
        buf.append(&self.os);
        buf.append(&self.country);
        buf.write_u32(self.timezone_bias);
        buf.write_u32(self.ip);
        buf.write_u8(username.len() as u8);
        buf.append(username);
        buf.into_vec()
    }

    /// A 3.3.5a (12340) enUS Windows client request for `username`.
    pub fn wotlk(command: u8, username: &str) -> Self {
        Self {
            command,
            error: 3,
            size: 30 + username_bytes(username).len() as u16,
            game_name: *b"WoW\0",
            version: [3, 3, 5],
            build: 12340,
            platform: *b"68x\0",
            os: *b"niW\0",
            country: *b"SUne",
            timezone_bias: 60,
            ip: u32::from_le_bytes([127, 0, 0, 1]),
            username: username.to_string(),
        }
    }
}

fn username_bytes(username: &str) -> &[u8] {
    let bytes = username.as_bytes();
    &bytes[..bytes.len().min(u8::MAX as usize)]
}

pub struct ChallengeResponse;

impl ChallengeResponse {
    /// Length of a success response carrying a one-byte generator.
    pub const SUCCESS_LEN: usize = 119;

    pub fn success(
        server_ephemeral: &[u8; 32],
        generator: &[u8],
        modulus: &[u8; 32],
        salt: &[u8; 32],
        version_challenge: &[u8; 16],
    ) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(Self::SUCCESS_LEN);
        buf.write_u8(AuthCommand::LOGON_CHALLENGE);
        buf.write_u8(0);
        buf.write_u8(AuthResult::SUCCESS);
        buf.append(server_ephemeral);
        buf.write_u8(generator.len() as u8);
        buf.append(generator);
        buf.write_u8(modulus.len() as u8);
        buf.append(modulus);
        buf.append(salt);
        buf.append(version_challenge);
        buf.write_u8(0);
        buf.into_vec()
    }

    pub fn failure(result: u8) -> Vec<u8> {
        vec![AuthCommand::LOGON_CHALLENGE, 0, result]
    }
}

/// Parsed successful challenge response, as a client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeAccepted {
    pub server_ephemeral: [u8; 32],
    pub generator: Vec<u8>,
    pub modulus: Vec<u8>,
    pub salt: [u8; 32],
    pub version_challenge: [u8; 16],
    pub security_flags: u8,
}

impl ChallengeAccepted {
    /// Reads the body following the opcode, error and result bytes.
    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        let server_ephemeral = buf.read_array()?;
        let g_len = buf.read_u8()? as usize;
        let generator = buf.read_bytes(g_len)?.to_vec();
        let n_len = buf.read_u8()? as usize;
        let modulus = buf.read_bytes(n_len)?.to_vec();
        let salt = buf.read_array()?;
        let version_challenge = buf.read_array()?;
        let security_flags = buf.read_u8()?;
        Ok(Self {
            server_ephemeral,
            generator,
            modulus,
            salt,
            version_challenge,
            security_flags,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonProof {
    pub client_ephemeral: [u8; 32],
    pub client_proof: [u8; 20],
    pub crc_hash: [u8; 20],
    pub key_count: u8,
    pub security_flags: u8,
}

impl LogonProof {
    pub const LEN: usize = 75;

    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        buf.advance(1)?;
        Ok(Self {
            client_ephemeral: buf.read_array()?,
            client_proof: buf.read_array()?,
            crc_hash: buf.read_array()?,
            key_count: buf.read_u8()?,
            security_flags: buf.read_u8()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(Self::LEN);
        buf.write_u8(AuthCommand::LOGON_PROOF);
        buf.append(&self.client_ephemeral);
        buf.append(&self.client_proof);
        buf.append(&self.crc_hash);
        buf.write_u8(self.key_count);
        buf.write_u8(self.security_flags);
        buf.into_vec()
    }
}

pub struct ProofResponse;

impl ProofResponse {
    pub const SUCCESS_LEN: usize = 32;

    pub fn success(server_proof: &[u8; 20]) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(Self::SUCCESS_LEN);
        buf.write_u8(AuthCommand::LOGON_PROOF);
        buf.write_u8(AuthResult::SUCCESS);
        buf.append(server_proof);
        buf.write_u32(0); // account flags
        buf.write_u32(0); // survey id
        buf.write_u16(0); // login flags
        buf.into_vec()
    }

    pub fn failure(result: u8) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(4);
        buf.write_u8(AuthCommand::LOGON_PROOF);
        buf.write_u8(result);
        buf.write_u16(0);
        buf.into_vec()
    }
}

pub struct ReconnectChallengeResponse;

impl ReconnectChallengeResponse {
    pub fn success(reconnect_proof: &[u8; 16]) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(34);
        buf.write_u8(AuthCommand::RECONNECT_CHALLENGE);
        buf.write_u8(AuthResult::SUCCESS);
        buf.append(reconnect_proof);
        buf.append(&[0u8; 16]);
        buf.into_vec()
    }

    pub fn failure(result: u8) -> Vec<u8> {
        vec![AuthCommand::RECONNECT_CHALLENGE, result]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectProof {
    pub client_random: [u8; 16],
    pub client_proof: [u8; 20],
    pub client_checksum: [u8; 20],
    pub key_count: u8,
}

impl ReconnectProof {
    pub const LEN: usize = 58;

    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        buf.advance(1)?;
        Ok(Self {
            client_random: buf.read_array()?,
            client_proof: buf.read_array()?,
            client_checksum: buf.read_array()?,
            key_count: buf.read_u8()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(Self::LEN);
        buf.write_u8(AuthCommand::RECONNECT_PROOF);
        buf.append(&self.client_random);
        buf.append(&self.client_proof);
        buf.append(&self.client_checksum);
        buf.write_u8(self.key_count);
        buf.into_vec()
    }
}

pub fn reconnect_proof_success() -> Vec<u8> {
    vec![AuthCommand::RECONNECT_PROOF, AuthResult::SUCCESS, 0, 0]
}

/// Realm list request: opcode plus four unused bytes.
pub const REALM_LIST_REQUEST_LEN: usize = 5;

/// One row of the realm list as the client displays it.
#[derive(Debug, Clone, PartialEq)]
pub struct RealmEntry {
    pub realm_type: u8,
    pub locked: u8,
    pub flags: u8,
    pub name: String,
    pub address: String,
    pub population: f32,
    pub characters: u8,
    pub timezone: u8,
    pub id: u8,
}

impl RealmEntry {
    pub fn from_realm(realm: &Realm, characters: u8) -> Self {
        Self {
            realm_type: realm.realm_type,
            locked: 0,
            flags: realm.flags.bits(),
            name: realm.name.clone(),
            address: realm.address.clone(),
            population: realm.population,
            characters,
            timezone: realm.timezone,
            id: realm.id,
        }
    }

    fn encode(&self, buf: &mut ByteCursor) {
        buf.write_u8(self.realm_type);
        buf.write_u8(self.locked);
        buf.write_u8(self.flags);
        buf.write_cstring(&self.name);
        buf.write_cstring(&self.address);
        buf.write_f32(self.population);
        buf.write_u8(self.characters);
        buf.write_u8(self.timezone);
        buf.write_u8(self.id);
    }

    fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        Ok(Self {
            realm_type: buf.read_u8()?,
            locked: buf.read_u8()?,
            flags: buf.read_u8()?,
            name: buf.read_cstring(),
            address: buf.read_cstring(),
            population: buf.read_f32()?,
            characters: buf.read_u8()?,
            timezone: buf.read_u8()?,
            id: buf.read_u8()?,
        })
    }
}

pub struct RealmList;

impl RealmList {
    /// Fails when the entry count or the body does not fit its u16 field.
    pub fn encode(entries: &[RealmEntry]) -> Result<Vec<u8>, ProtocolError> {
        let count = u16::try_from(entries.len()).map_err(|_| ProtocolError::OversizedMessage {
            len: entries.len(),
            max: u16::MAX as usize,
        })?;

        let mut body = ByteCursor::new();
        body.write_u32(0);
        body.write_u16(count);
        for entry in entries {
            entry.encode(&mut body);
        }
        body.write_u8(0x10);
        body.write_u8(0x00);

        let body = body.into_vec();
        let size = u16::try_from(body.len()).map_err(|_| ProtocolError::OversizedMessage {
            len: body.len(),
            max: u16::MAX as usize,
        })?;
        let mut out = ByteCursor::with_capacity(body.len() + 3);
        out.write_u8(AuthCommand::REALM_LIST);
        out.write_u16(size);
        out.append(&body);
        Ok(out.into_vec())
    }

    /// Parses a complete realm-list response including its opcode.
    pub fn decode(buf: &mut ByteCursor) -> Result<Vec<RealmEntry>, BufferError> {
        buf.advance(1)?;
        let _size = buf.read_u16()?;
        let _unused = buf.read_u32()?;
        let count = buf.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(RealmEntry::decode(buf)?);
        }
        buf.advance(2)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_request_layout() {
        let request = LogonChallenge::wotlk(AuthCommand::LOGON_CHALLENGE, "ALICE");
        let bytes = request.encode();
        assert_eq!(bytes.len(), 34 + 5);
        assert_eq!(
            u16::from_le_bytes([bytes[2], bytes[3]]) as usize,
            bytes.len() - LogonChallenge::HEADER_LEN
        );

        let decoded = LogonChallenge::decode(&mut ByteCursor::from(bytes)).unwrap();
        assert_eq!(decoded.username, "ALICE");
        assert_eq!(decoded.build, 12340);
    }

    #[test]
    fn truncated_username_is_reported() {
        let mut bytes = LogonChallenge::wotlk(0, "ALICE").encode();
        bytes.truncate(bytes.len() - 2);
        assert!(LogonChallenge::decode(&mut ByteCursor::from(bytes)).is_err());
    }

    #[test]
    fn proof_responses_have_fixed_sizes() {
        let success = ProofResponse::success(&[9; 20]);
        assert_eq!(success.len(), ProofResponse::SUCCESS_LEN);
        assert_eq!(&success[..2], &[AuthCommand::LOGON_PROOF, 0]);
        assert_eq!(&success[2..22], &[9; 20]);

        assert_eq!(
            ProofResponse::failure(AuthResult::UNKNOWN_ACCOUNT),
            vec![1, 4, 0, 0]
        );
    }

    #[test]
    fn realm_list_size_covers_everything_after_it() {
        let entry = RealmEntry {
            realm_type: 1,
            locked: 0,
            flags: 0x40,
            name: "Novus".into(),
            address: "127.0.0.1:8085".into(),
            population: 0.5,
            characters: 2,
            timezone: 1,
            id: 1,
        };
        let bytes = RealmList::encode(std::slice::from_ref(&entry)).unwrap();
        let declared = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        assert_eq!(declared, bytes.len() - 3);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x10, 0x00]);

        let decoded = RealmList::decode(&mut ByteCursor::from(bytes)).unwrap();
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn empty_realm_list_still_carries_trailer() {
        let bytes = RealmList::encode(&[]).unwrap();
        assert_eq!(bytes, vec![0x10, 8, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x00]);
    }

    #[test]
    fn realm_list_too_large_for_size_field_is_refused() {
        let entry = RealmEntry {
            realm_type: 0,
            locked: 0,
            flags: 0,
            name: "A realm with a long name".into(),
            address: "127.0.0.1:8085".into(),
            population: 0.0,
            characters: 0,
            timezone: 1,
            id: 1,
        };
        let entries = vec![entry; 2000];
        assert!(matches!(
            RealmList::encode(&entries),
            Err(ProtocolError::OversizedMessage { max: 65535, .. })
        ));
    }

    #[test]
    fn long_username_is_cut_to_length_prefix() {
        let request = LogonChallenge::wotlk(AuthCommand::LOGON_CHALLENGE, &"A".repeat(300));
        assert_eq!(request.size, 30 + 255);

        let bytes = request.encode();
        assert_eq!(bytes[LogonChallenge::HEADER_LEN + 29], 255);
        assert_eq!(bytes.len(), LogonChallenge::HEADER_LEN + 30 + 255);
    }
}
