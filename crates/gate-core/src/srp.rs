//! SRP6 key exchange as spoken by the 3.3.5a client.
//!
//! Every value that enters a hash is encoded little-endian at a fixed width:
//! ephemerals, salt and `N` at 32 bytes, the session key at 40 bytes and the
//! generator as its single byte.

use num_bigint::{BigInt, Sign};
use sha1::{Digest, Sha1};

use crate::error::ProtocolError;

pub const N_BYTES: [u8; 32] = [
    0xB7, 0x9B, 0x3E, 0x2A, 0x87, 0x82, 0x3C, 0xAB, 0x8F, 0x5E, 0xBF, 0xBF, 0x8E, 0xB1, 0x01, 0x08,
    0x53, 0x50, 0x06, 0x29, 0x8B, 0x5B, 0xAD, 0xBD, 0x5B, 0x53, 0xE1, 0x89, 0x5E, 0x64, 0x4B, 0x89,
];

pub const GENERATOR: u8 = 7;

const MULTIPLIER: u8 = 3;

/// Sent verbatim in every successful challenge response.
pub const VERSION_CHALLENGE: [u8; 16] = [
    0xBA, 0xA3, 0x1E, 0x99, 0xA0, 0x0B, 0x21, 0x57, 0xFC, 0x37, 0x3F, 0xB3, 0x69, 0xCD, 0xD2, 0xF1,
];

pub const SESSION_KEY_LEN: usize = 40;

pub type SessionKey = [u8; SESSION_KEY_LEN];

fn modulus() -> BigInt {
    BigInt::from_bytes_le(Sign::Plus, &N_BYTES)
}

fn generator() -> BigInt {
    BigInt::from(GENERATOR)
}

fn multiplier() -> BigInt {
    BigInt::from(MULTIPLIER)
}

/// Derives the password verifier `g^x mod N` stored in place of the password.
pub fn make_verifier(username: &str, password: &str, salt: &[u8; 32]) -> [u8; 32] {
    let x = calculate_x(username, password, salt);
    pad_to_32_bytes(generator().modpow(&x, &modulus()).to_bytes_le().1)
}

/// Outcome of checking a client's `M1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    Accepted {
        session_key: SessionKey,
        server_proof: [u8; 20],
    },
    Rejected,
}

/// Server half of the exchange for one connection.
#[derive(Debug, Clone)]
pub struct SrpServer {
    modulus: BigInt,
    generator: BigInt,
    salt: [u8; 32],
    verifier: BigInt,
    private_ephemeral: BigInt,
    public_ephemeral: BigInt,
}

impl SrpServer {
    pub fn new(salt: [u8; 32], verifier: &[u8; 32]) -> Self {
        let private_bytes: [u8; 19] = rand::random();
        Self::with_private_ephemeral(salt, verifier, &private_bytes)
    }

    /// Builds the server side from a caller-chosen `b`; used for golden vectors.
    pub fn with_private_ephemeral(salt: [u8; 32], verifier: &[u8; 32], private: &[u8]) -> Self {
        let modulus = modulus();
        let generator = generator();
        let verifier = BigInt::from_bytes_le(Sign::Plus, verifier);
        let private_ephemeral = BigInt::from_bytes_le(Sign::Plus, private);

        let gb = generator.modpow(&private_ephemeral, &modulus);
        let public_ephemeral = mod_floor(&(multiplier() * &verifier + gb), &modulus);

        Self {
            modulus,
            generator,
            salt,
            verifier,
            private_ephemeral,
            public_ephemeral,
        }
    }

    pub fn public_ephemeral(&self) -> [u8; 32] {
        pad_to_32_bytes(self.public_ephemeral.to_bytes_le().1)
    }

    pub fn salt(&self) -> [u8; 32] {
        self.salt
    }

    pub fn generator_bytes(&self) -> Vec<u8> {
        let bytes = self.generator.to_bytes_le().1;
        debug_assert!(bytes.len() <= 32, "generator wider than 32 bytes");
        bytes
    }

    /// Checks `M1` against the value derived from `A` and the verifier.
    ///
    /// `A mod N == 0` is a hard failure; a wrong proof is reported as
    /// [`ProofOutcome::Rejected`].
    pub fn verify_client_proof(
        &self,
        username: &str,
        client_public_ephemeral: &[u8; 32],
        client_proof: &[u8; 20],
    ) -> Result<ProofOutcome, ProtocolError> {
        let client_a = BigInt::from_bytes_le(Sign::Plus, client_public_ephemeral);
        if mod_floor(&client_a, &self.modulus) == BigInt::default() {
            return Err(ProtocolError::DegenerateKey);
        }

        let u = calculate_u(&client_a, &self.public_ephemeral);
        let vu = self.verifier.modpow(&u, &self.modulus);
        let avu = mod_floor(&(&client_a * vu), &self.modulus);
        let s = avu.modpow(&self.private_ephemeral, &self.modulus);
        let session_key = calculate_interleaved(&s);

        let expected_m1 = calculate_m1(
            username,
            &self.salt,
            &client_a,
            &self.public_ephemeral,
            &session_key,
        );

        if !digests_match(&expected_m1, client_proof) {
            return Ok(ProofOutcome::Rejected);
        }

        Ok(ProofOutcome::Accepted {
            session_key,
            server_proof: calculate_m2(&client_a, &expected_m1, &session_key),
        })
    }
}

/// `H(username, R1, reconnect_proof, K)` used by the reconnect handshake.
pub fn reconnect_digest(
    username: &str,
    client_random: &[u8; 16],
    reconnect_proof: &[u8; 16],
    session_key: &SessionKey,
) -> [u8; 20] {
    digest(
        Sha1::new()
            .chain_update(username.as_bytes())
            .chain_update(client_random)
            .chain_update(reconnect_proof)
            .chain_update(session_key),
    )
}

/// Client half of the exchange.
///
/// The gateway never logs in anywhere itself; this exists so the server
/// derivation can be checked against an independent computation.
#[derive(Debug)]
pub struct SrpClient {
    pub session_key: SessionKey,
    modulus: BigInt,
    generator: BigInt,
    private_ephemeral: BigInt,
    public_ephemeral: BigInt,
    server_ephemeral: BigInt,
    salt: [u8; 32],
    client_proof: Option<[u8; 20]>,
}

impl Default for SrpClient {
    fn default() -> Self {
        Self {
            session_key: [0; SESSION_KEY_LEN],
            modulus: BigInt::default(),
            generator: BigInt::default(),
            private_ephemeral: BigInt::default(),
            public_ephemeral: BigInt::default(),
            server_ephemeral: BigInt::default(),
            salt: [0; 32],
            client_proof: None,
        }
    }
}

impl SrpClient {
    pub fn init(&mut self, n: &[u8], g: &[u8], server_ephemeral: &[u8; 32], salt: [u8; 32]) {
        let private_ephemeral: [u8; 19] = rand::random();
        self.init_with_private(n, g, server_ephemeral, salt, &private_ephemeral);
    }

    pub fn init_with_private(
        &mut self,
        n: &[u8],
        g: &[u8],
        server_ephemeral: &[u8; 32],
        salt: [u8; 32],
        private: &[u8],
    ) {
        self.modulus = BigInt::from_bytes_le(Sign::Plus, n);
        self.generator = BigInt::from_bytes_le(Sign::Plus, g);
        self.private_ephemeral = BigInt::from_bytes_le(Sign::Plus, private);
        self.public_ephemeral = self
            .generator
            .modpow(&self.private_ephemeral, &self.modulus);
        self.server_ephemeral = BigInt::from_bytes_le(Sign::Plus, server_ephemeral);
        self.salt = salt;
    }

    pub fn public_ephemeral(&self) -> [u8; 32] {
        pad_to_32_bytes(self.public_ephemeral.to_bytes_le().1)
    }

    pub fn calculate_session_key(&mut self, account: &str, password: &str) {
        let x = calculate_x(account, password, &self.salt);
        let verifier = self.generator.modpow(&x, &self.modulus);

        let u = calculate_u(&self.public_ephemeral, &self.server_ephemeral);
        let base = mod_floor(
            &(&self.server_ephemeral - multiplier() * verifier),
            &self.modulus,
        );
        let s = base.modpow(&(&self.private_ephemeral + u * x), &self.modulus);

        self.session_key = calculate_interleaved(&s);
    }

    pub fn calculate_proof(&mut self, account: &str) -> [u8; 20] {
        let proof = calculate_m1(
            account,
            &self.salt,
            &self.public_ephemeral,
            &self.server_ephemeral,
            &self.session_key,
        );
        self.client_proof = Some(proof);
        proof
    }

    pub fn validate_proof(&self, server_proof: [u8; 20]) -> bool {
        let Some(client_proof) = self.client_proof else {
            return false;
        };

        let expected = digest(
            Sha1::new()
                .chain_update(self.public_ephemeral())
                .chain_update(client_proof)
                .chain_update(self.session_key),
        );
        digests_match(&expected, &server_proof)
    }

    /// `R2` for a reconnect proof, given the server's 16-byte challenge.
    pub fn reconnect_proof(
        &self,
        account: &str,
        client_random: &[u8; 16],
        server_challenge: &[u8; 16],
    ) -> [u8; 20] {
        reconnect_digest(account, client_random, server_challenge, &self.session_key)
    }
}

fn digest(hasher: Sha1) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn calculate_x(account: &str, password: &str, salt: &[u8; 32]) -> BigInt {
    let identity_hash = digest(Sha1::new().chain_update(format!("{account}:{password}").as_bytes()));
    let x = digest(Sha1::new().chain_update(salt).chain_update(identity_hash));
    BigInt::from_bytes_le(Sign::Plus, &x)
}

fn calculate_u(client_a: &BigInt, server_b: &BigInt) -> BigInt {
    let u = digest(
        Sha1::new()
            .chain_update(pad_to_32_bytes(client_a.to_bytes_le().1))
            .chain_update(pad_to_32_bytes(server_b.to_bytes_le().1)),
    );
    BigInt::from_bytes_le(Sign::Plus, &u)
}

fn calculate_m1(
    account: &str,
    salt: &[u8; 32],
    client_a: &BigInt,
    server_b: &BigInt,
    session_key: &SessionKey,
) -> [u8; 20] {
    let n_hash = digest(Sha1::new().chain_update(N_BYTES));
    let g_hash = digest(Sha1::new().chain_update([GENERATOR]));
    let mut xor_hash = [0u8; 20];
    for (index, value) in xor_hash.iter_mut().enumerate() {
        *value = n_hash[index] ^ g_hash[index];
    }

    digest(
        Sha1::new()
            .chain_update(xor_hash)
            .chain_update(digest(Sha1::new().chain_update(account.as_bytes())))
            .chain_update(salt)
            .chain_update(pad_to_32_bytes(client_a.to_bytes_le().1))
            .chain_update(pad_to_32_bytes(server_b.to_bytes_le().1))
            .chain_update(session_key),
    )
}

fn calculate_m2(client_a: &BigInt, client_proof: &[u8; 20], session_key: &SessionKey) -> [u8; 20] {
    digest(
        Sha1::new()
            .chain_update(pad_to_32_bytes(client_a.to_bytes_le().1))
            .chain_update(client_proof)
            .chain_update(session_key),
    )
}

/// SHA1 of the even bytes of `S` fills the even output positions, SHA1 of
/// the odd bytes fills the odd ones.
fn calculate_interleaved(s: &BigInt) -> SessionKey {
    let padded = pad_to_32_bytes(s.to_bytes_le().1);

    let mut even = Sha1::new();
    let mut odd = Sha1::new();
    for pair in padded.chunks_exact(2) {
        even.update([pair[0]]);
        odd.update([pair[1]]);
    }
    let even = digest(even);
    let odd = digest(odd);

    let mut session_key = [0u8; SESSION_KEY_LEN];
    for index in 0..20 {
        session_key[index * 2] = even[index];
        session_key[index * 2 + 1] = odd[index];
    }
    session_key
}

/// Compares every byte regardless of where the first difference is.
pub fn digests_match(expected: &[u8; 20], supplied: &[u8; 20]) -> bool {
    expected
        .iter()
        .zip(supplied.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn pad_to_32_bytes(bytes: Vec<u8>) -> [u8; 32] {
    let mut buffer = [0u8; 32];
    debug_assert!(
        bytes.len() <= 32,
        "expected <=32 bytes, got {}",
        bytes.len()
    );
    let n = bytes.len().min(32);
    buffer[..n].copy_from_slice(&bytes[..n]);
    buffer
}

fn mod_floor(value: &BigInt, modulus: &BigInt) -> BigInt {
    ((value % modulus) + modulus) % modulus
}
