//! Relay stream cipher: RC4 keyed with HMAC-SHA1 over the handshake secret.
//!
//! Each direction owns an independent keystream. The first 1024 keystream
//! bytes are discarded before any traffic is processed.

use std::fmt::{Debug, Formatter};

use hmacsha::HmacSha;
use sha1::Sha1;

const CLIENT_SEED: [u8; 16] = [
    0xC2, 0xB3, 0x72, 0x3C, 0xC6, 0xAE, 0xD9, 0xB5, 0x34, 0x3C, 0x53, 0xEE, 0x2F, 0x43, 0x67, 0xCE,
];

const SERVER_SEED: [u8; 16] = [
    0xCC, 0x98, 0xAE, 0x04, 0xE8, 0x97, 0xEA, 0xCA, 0x12, 0xDD, 0xC0, 0x93, 0x42, 0x91, 0x53, 0x57,
];

const KEYSTREAM_DROP: usize = 1024;

/// Both directions of a ciphered relay link.
pub struct StreamCipher {
    outbound: Rc4,
    inbound: Rc4,
}

impl StreamCipher {
    /// Setup for the side that connected out (the gateway node).
    pub fn client(secret: &[u8]) -> Self {
        Self {
            outbound: keystream(&CLIENT_SEED, secret),
            inbound: keystream(&SERVER_SEED, secret),
        }
    }

    /// Mirror image of [`StreamCipher::client`], for the accepting peer.
    pub fn server(secret: &[u8]) -> Self {
        Self {
            outbound: keystream(&SERVER_SEED, secret),
            inbound: keystream(&CLIENT_SEED, secret),
        }
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.outbound.apply(data);
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.inbound.apply(data);
    }
}

impl Debug for StreamCipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamCipher")
    }
}

fn keystream(seed: &[u8; 16], secret: &[u8]) -> Rc4 {
    let key = HmacSha::new(seed, secret, Sha1::default())
        .compute_digest()
        .to_vec();
    let mut rc4 = Rc4::new(&key);
    let mut sync = [0u8; KEYSTREAM_DROP];
    rc4.apply(&mut sync);
    rc4
}

struct Rc4 {
    i: u8,
    j: u8,
    state: [u8; 256],
}

impl Rc4 {
    // `key` is a 20-byte HMAC digest, never empty.
    fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, x) in state.iter_mut().enumerate() {
            *x = i as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { i: 0, j: 0, state }
    }

    fn next(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[index as usize]
    }

    fn apply(&mut self, data: &mut [u8]) {
        for x in data.iter_mut() {
            *x ^= self.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [0x42; 32];

    #[test]
    fn messages_round_trip_in_send_order() {
        let mut node = StreamCipher::client(&SECRET);
        let mut peer = StreamCipher::server(&SECRET);

        let messages: [&[u8]; 3] = [b"\x01", b"forwarded header", b"and a body"];
        for message in messages {
            let mut wire = message.to_vec();
            node.encrypt(&mut wire);
            assert_ne!(wire, message);
            peer.decrypt(&mut wire);
            assert_eq!(wire, message);
        }

        let mut reply = b"reply".to_vec();
        peer.encrypt(&mut reply);
        node.decrypt(&mut reply);
        assert_eq!(reply, b"reply");
    }

    #[test]
    fn out_of_order_decryption_does_not_recover_plaintext() {
        let mut node = StreamCipher::client(&SECRET);
        let mut peer = StreamCipher::server(&SECRET);

        let mut first = b"first message".to_vec();
        let mut second = b"second message".to_vec();
        node.encrypt(&mut first);
        node.encrypt(&mut second);

        peer.decrypt(&mut second);
        assert_ne!(second, b"second message");
    }

    #[test]
    fn split_application_matches_single_call() {
        let mut whole = StreamCipher::client(&SECRET);
        let mut split = StreamCipher::client(&SECRET);

        let mut a = vec![0u8; 64];
        whole.encrypt(&mut a);

        let mut b = vec![0u8; 64];
        let (head, tail) = b.split_at_mut(17);
        split.encrypt(head);
        split.encrypt(tail);
        assert_eq!(a, b);
    }

    #[test]
    fn keystreams_match_fixed_constants() {
        let mut cipher = StreamCipher::client(&SECRET);
        let mut outbound = [0u8; 8];
        let mut inbound = [0u8; 8];
        cipher.encrypt(&mut outbound);
        cipher.decrypt(&mut inbound);

        assert_eq!(hex::encode(outbound), "ee7940c501c4cc62");
        assert_eq!(hex::encode(inbound), "9291d3a6dd0f7db1");
    }

    #[test]
    fn directions_use_distinct_keystreams() {
        let mut cipher = StreamCipher::client(&SECRET);
        let mut out = [0u8; 16];
        let mut inc = [0u8; 16];
        cipher.encrypt(&mut out);
        cipher.decrypt(&mut inc);
        assert_ne!(out, inc);
    }
}
