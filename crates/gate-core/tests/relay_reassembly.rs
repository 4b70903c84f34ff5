use std::sync::Arc;

use novus_gate_core::cipher::StreamCipher;
use novus_gate_core::opcode::{CharResponse, Opcode, RelayCommand};
use novus_gate_core::relay::messages::{self, Challenge, ForwardedPacket, RelayHeader};
use novus_gate_core::relay::{self, RelayConnection, RelaySettings, RelayState};
use novus_gate_core::store::{
    AccountStore, CharacterStore, MemoryStore, NewCharacter, SpawnPosition,
};
use novus_gate_core::{ByteCursor, Outbound, ProtocolError};
use tokio::sync::mpsc::UnboundedReceiver;

const SECRET: [u8; 32] = [0x3c; 32];
const ACCOUNT: u32 = 5;

struct Link {
    conn: RelayConnection,
    outbound: Outbound,
    rx: UnboundedReceiver<Vec<u8>>,
    peer: StreamCipher,
}

impl Link {
    fn new(store: Arc<MemoryStore>) -> Self {
        let (outbound, rx) = Outbound::channel();
        let conn = RelayConnection::new(
            Arc::new(relay::dispatch_table()),
            store,
            outbound.clone(),
            RelaySettings::default(),
        );
        Self {
            conn,
            outbound,
            rx,
            peer: StreamCipher::server(&SECRET),
        }
    }

    async fn authed(store: Arc<MemoryStore>) -> Self {
        let mut link = Self::new(store);
        link.conn
            .on_read(&Challenge { secret: SECRET }.encode())
            .await
            .unwrap();
        assert_eq!(link.replies_raw(), vec![vec![RelayCommand::PROOF]]);
        assert_eq!(link.conn.state(), RelayState::Proof);

        let proof = link.seal(vec![RelayCommand::PROOF]);
        link.conn.on_read(&proof).await.unwrap();
        assert_eq!(link.conn.state(), RelayState::Authed);
        link
    }

    fn seal(&mut self, mut bytes: Vec<u8>) -> Vec<u8> {
        self.peer.encrypt(&mut bytes);
        bytes
    }

    fn forward(&mut self, opcode: u16, body: Vec<u8>) -> Vec<u8> {
        let bytes = ForwardedPacket::new(ACCOUNT, opcode, body).unwrap().encode();
        self.seal(bytes)
    }

    /// Decrypted outbound messages, in send order.
    fn replies_raw(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(mut message) = self.rx.try_recv() {
            self.peer.decrypt(&mut message);
            out.push(message);
        }
        out
    }

    fn replies(&mut self) -> Vec<ForwardedPacket> {
        self.replies_raw()
            .into_iter()
            .map(|bytes| {
                let mut cursor = ByteCursor::from(bytes);
                let header = RelayHeader::decode(&mut cursor).unwrap();
                let body = cursor.readable().to_vec();
                assert_eq!(header.size as usize, body.len());
                ForwardedPacket { header, body }
            })
            .collect()
    }
}

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_spawn(
        1,
        1,
        SpawnPosition {
            map_id: 0,
            zone_id: 12,
            x: -8949.95,
            y: -132.493,
            z: 83.5312,
            orientation: 0.0,
        },
    ))
}

fn new_character(name: &str, race: u8) -> Vec<u8> {
    messages::encode_char_create(&NewCharacter {
        name: name.into(),
        race,
        class: 1,
        ..Default::default()
    })
}

#[tokio::test]
async fn challenge_and_proof_in_one_read() {
    let mut link = Link::new(store());

    let mut bytes = Challenge { secret: SECRET }.encode();
    let proof = link.seal(vec![RelayCommand::PROOF]);
    bytes.extend_from_slice(&proof);

    link.conn.on_read(&bytes).await.unwrap();
    assert_eq!(link.conn.state(), RelayState::Authed);
    assert_eq!(link.replies_raw(), vec![vec![RelayCommand::PROOF]]);
}

#[tokio::test]
async fn byte_by_byte_delivery_matches_single_read() {
    let mut whole = Link::authed(store()).await;
    let mut split = Link::authed(store()).await;

    let mut stream = whole.forward(Opcode::CMSG_REALM_SPLIT, 0xffff_ffffu32.to_le_bytes().to_vec());
    stream.extend(whole.forward(Opcode::CMSG_UPDATE_ACCOUNT_DATA, vec![7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]));
    whole.conn.on_read(&stream).await.unwrap();

    let mut stream = split.forward(Opcode::CMSG_REALM_SPLIT, 0xffff_ffffu32.to_le_bytes().to_vec());
    stream.extend(split.forward(Opcode::CMSG_UPDATE_ACCOUNT_DATA, vec![7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]));
    for (index, byte) in stream.iter().enumerate() {
        split.conn.on_read(std::slice::from_ref(byte)).await.unwrap();
        if index + 1 < RelayHeader::LEN + 4 {
            assert!(split.rx.try_recv().is_err());
        }
    }

    let expected = whole.replies();
    assert_eq!(expected.len(), 2);
    assert_eq!(split.replies(), expected);

    assert_eq!(expected[0].header.opcode, Opcode::SMSG_REALM_SPLIT);
    assert_eq!(expected[0].header.account_id, ACCOUNT);
    assert_eq!(&expected[0].body[..4], &[0xff; 4]);
    assert_eq!(expected[1].header.opcode, Opcode::SMSG_UPDATE_ACCOUNT_DATA_COMPLETE);
    assert_eq!(expected[1].body, vec![7, 0, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn empty_body_is_handled_without_further_reads() {
    let mut link = Link::authed(store()).await;

    let bytes = link.forward(Opcode::CMSG_READY_FOR_ACCOUNT_DATA_TIMES, Vec::new());
    assert_eq!(bytes.len(), RelayHeader::LEN);
    link.conn.on_read(&bytes).await.unwrap();

    let replies = link.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header.opcode, Opcode::SMSG_ACCOUNT_DATA_TIMES);
    assert_eq!(replies[0].header.account_id, ACCOUNT);
    assert_eq!(replies[0].body.len(), 21);
}

#[tokio::test]
async fn oversized_body_closes_link() {
    let mut link = Link::authed(store()).await;

    let mut header = ByteCursor::new();
    RelayHeader::forward(ACCOUNT, Opcode::CMSG_CHAR_ENUM, 20_000).encode(&mut header);
    let bytes = link.seal(header.into_vec());

    let err = link.conn.on_read(&bytes).await.unwrap_err();
    assert!(matches!(err, ProtocolError::OversizedMessage { len: 20_000, .. }));
    assert_eq!(link.conn.state(), RelayState::Closed);
}

#[tokio::test]
async fn forward_before_handshake_is_a_state_violation() {
    let mut link = Link::new(store());
    let bytes = ForwardedPacket::new(ACCOUNT, Opcode::CMSG_CHAR_ENUM, Vec::new())
        .unwrap()
        .encode();

    let err = link.conn.on_read(&bytes).await.unwrap_err();
    assert!(matches!(err, ProtocolError::StateViolation { .. }));
    assert!(link.replies_raw().is_empty());
}

#[tokio::test]
async fn unhandled_sub_opcode_gets_no_reply() {
    let mut link = Link::authed(store()).await;

    let mut bytes = link.forward(0x1234, vec![1, 2, 3]);
    bytes.extend(link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new()));
    link.conn.on_read(&bytes).await.unwrap();

    let replies = link.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header.opcode, Opcode::SMSG_CHAR_ENUM);
    assert_eq!(replies[0].body, vec![0]);
}

#[tokio::test]
async fn character_screen_round_trip() {
    let store = store();
    let mut link = Link::authed(store.clone()).await;

    let create = link.forward(Opcode::CMSG_CHAR_CREATE, new_character("jAINA", 1));
    link.conn.on_read(&create).await.unwrap();
    let reply = link.replies().remove(0);
    assert_eq!(reply.header.opcode, Opcode::SMSG_CHAR_CREATE);
    assert_eq!(reply.body, vec![CharResponse::CREATE_SUCCESS]);

    let duplicate = link.forward(Opcode::CMSG_CHAR_CREATE, new_character("JAINA", 1));
    link.conn.on_read(&duplicate).await.unwrap();
    assert_eq!(link.replies()[0].body, vec![CharResponse::CREATE_NAME_IN_USE]);

    let no_spawn = link.forward(Opcode::CMSG_CHAR_CREATE, new_character("Thrall", 2));
    link.conn.on_read(&no_spawn).await.unwrap();
    assert_eq!(link.replies()[0].body, vec![CharResponse::CREATE_DISABLED]);

    let enumerate = link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new());
    link.conn.on_read(&enumerate).await.unwrap();
    let reply = link.replies().remove(0);
    let characters = messages::decode_char_enum(&mut ByteCursor::from(reply.body)).unwrap();
    assert_eq!(characters.len(), 1);
    let (guid, name) = characters[0].clone();
    assert_eq!(name, "Jaina");
    assert_eq!(store.realm_character_counts(ACCOUNT).await.unwrap()[&1], 1);

    let stranger = store
        .create_character(
            ACCOUNT + 1,
            NewCharacter {
                name: "Arthas".into(),
                ..Default::default()
            },
            SpawnPosition::default(),
        )
        .await
        .unwrap();
    let steal = link.forward(Opcode::CMSG_CHAR_DELETE, stranger.to_le_bytes().to_vec());
    link.conn.on_read(&steal).await.unwrap();
    assert_eq!(link.replies()[0].body, vec![CharResponse::DELETE_FAILED]);
    assert!(store.character(stranger).await.is_some());

    let delete = link.forward(Opcode::CMSG_CHAR_DELETE, guid.to_le_bytes().to_vec());
    link.conn.on_read(&delete).await.unwrap();
    let reply = link.replies().remove(0);
    assert_eq!(reply.header.opcode, Opcode::SMSG_CHAR_DELETE);
    assert_eq!(reply.body, vec![CharResponse::DELETE_SUCCESS]);
    assert!(store.character(guid).await.is_none());
    assert_eq!(store.realm_character_counts(ACCOUNT).await.unwrap()[&1], 0);
}

#[tokio::test]
async fn reply_is_dropped_once_peer_is_gone() {
    let mut link = Link::authed(store()).await;
    let bytes = link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new());

    link.outbound.close();
    let err = link.conn.on_read(&bytes).await.unwrap_err();
    assert!(matches!(err, ProtocolError::PeerGone));
    assert!(link.replies_raw().is_empty());
}

#[tokio::test]
async fn unknown_command_is_discarded_and_keystream_stays_in_step() {
    let mut link = Link::authed(store()).await;

    let mut bytes = link.seal(vec![0x7f, 1, 2, 3]);
    bytes.extend(link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new()));
    link.conn.on_read(&bytes).await.unwrap();
    assert_eq!(link.conn.state(), RelayState::Authed);
    assert!(link.replies_raw().is_empty());

    let lone = link.seal(vec![0x7f]);
    link.conn.on_read(&lone).await.unwrap();
    assert!(link.replies_raw().is_empty());

    let enumerate = link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new());
    link.conn.on_read(&enumerate).await.unwrap();
    let replies = link.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header.opcode, Opcode::SMSG_CHAR_ENUM);
    assert_eq!(replies[0].header.account_id, ACCOUNT);
    assert_eq!(replies[0].body, vec![0]);
}

#[tokio::test]
async fn reply_too_large_to_frame_is_dropped_and_link_survives() {
    let store = store();
    for index in 0..300 {
        store
            .create_character(
                ACCOUNT,
                NewCharacter {
                    name: format!("Hero{index}"),
                    ..Default::default()
                },
                SpawnPosition::default(),
            )
            .await
            .unwrap();
    }
    let mut link = Link::authed(store).await;

    let enumerate = link.forward(Opcode::CMSG_CHAR_ENUM, Vec::new());
    link.conn.on_read(&enumerate).await.unwrap();
    assert!(link.replies_raw().is_empty());
    assert_eq!(link.conn.state(), RelayState::Authed);

    let split = link.forward(Opcode::CMSG_REALM_SPLIT, 3u32.to_le_bytes().to_vec());
    link.conn.on_read(&split).await.unwrap();
    let replies = link.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header.opcode, Opcode::SMSG_REALM_SPLIT);
    assert_eq!(&replies[0].body[..4], &3u32.to_le_bytes());
}
