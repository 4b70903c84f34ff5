//! Wire layouts for the node-to-node relay and the forwarded client packets
//! it carries.

use crate::buffer::ByteCursor;
use crate::error::{BufferError, ProtocolError};
use crate::opcode::RelayCommand;
use crate::store::{CharacterRecord, NewCharacter};

/// Connect-time announcement: command, type, protocol version, build.
pub fn greeting(version: u16, build: u16) -> Vec<u8> {
    let mut buf = ByteCursor::with_capacity(6);
    buf.write_u8(RelayCommand::CHALLENGE);
    buf.write_u8(0);
    buf.write_u16(version);
    buf.write_u16(build);
    buf.into_vec()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub secret: [u8; 32],
}

impl Challenge {
    pub const LEN: usize = 33;

    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        buf.advance(1)?;
        Ok(Self {
            secret: buf.read_array()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(Self::LEN);
        buf.write_u8(RelayCommand::CHALLENGE);
        buf.append(&self.secret);
        buf.into_vec()
    }
}

/// Fixed header in front of every forwarded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayHeader {
    pub command: u8,
    pub account_id: u32,
    pub opcode: u16,
    pub size: u16,
}

impl RelayHeader {
    pub const LEN: usize = 9;

    pub fn forward(account_id: u32, opcode: u16, size: u16) -> Self {
        Self {
            command: RelayCommand::FORWARD_PACKET,
            account_id,
            opcode,
            size,
        }
    }

    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        Ok(Self {
            command: buf.read_u8()?,
            account_id: buf.read_u32()?,
            opcode: buf.read_u16()?,
            size: buf.read_u16()?,
        })
    }

    pub fn encode(&self, buf: &mut ByteCursor) {
        buf.write_u8(self.command);
        buf.write_u32(self.account_id);
        buf.write_u16(self.opcode);
        buf.write_u16(self.size);
    }
}

/// A fully reassembled forwarded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedPacket {
    pub header: RelayHeader,
    pub body: Vec<u8>,
}

impl ForwardedPacket {
    /// Fails when `body` is longer than the header's u16 size field.
    pub fn new(account_id: u32, opcode: u16, body: Vec<u8>) -> Result<Self, ProtocolError> {
        let size = u16::try_from(body.len()).map_err(|_| ProtocolError::OversizedMessage {
            len: body.len(),
            max: u16::MAX as usize,
        })?;
        Ok(Self {
            header: RelayHeader::forward(account_id, opcode, size),
            body,
        })
    }

    /// Header and body back to back, in plaintext.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = ByteCursor::with_capacity(RelayHeader::LEN + self.body.len());
        self.header.encode(&mut buf);
        buf.append(&self.body);
        buf.into_vec()
    }
}

// Client message bodies.

pub fn decode_char_create(buf: &mut ByteCursor) -> Result<NewCharacter, BufferError> {
    let name = buf.read_cstring();
    Ok(NewCharacter {
        name,
        race: buf.read_u8()?,
        class: buf.read_u8()?,
        gender: buf.read_u8()?,
        skin: buf.read_u8()?,
        face: buf.read_u8()?,
        hair_style: buf.read_u8()?,
        hair_color: buf.read_u8()?,
        facial_style: buf.read_u8()?,
        outfit_id: buf.read_u8()?,
    })
}

pub fn encode_char_create(character: &NewCharacter) -> Vec<u8> {
    let mut buf = ByteCursor::with_capacity(character.name.len() + 10);
    buf.write_cstring(&character.name);
    for value in [
        character.race,
        character.class,
        character.gender,
        character.skin,
        character.face,
        character.hair_style,
        character.hair_color,
        character.facial_style,
        character.outfit_id,
    ] {
        buf.write_u8(value);
    }
    buf.into_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAccountData {
    pub data_type: u32,
    pub timestamp: u32,
    pub decompressed_size: u32,
}

impl UpdateAccountData {
    pub fn decode(buf: &mut ByteCursor) -> Result<Self, BufferError> {
        Ok(Self {
            data_type: buf.read_u32()?,
            timestamp: buf.read_u32()?,
            decompressed_size: buf.read_u32()?,
        })
    }
}

// Server message bodies.

/// Per-character cache mask advertised in account data times.
pub const ACCOUNT_DATA_MASK: u32 = 0x15;

pub fn account_data_times(server_time: u32) -> Vec<u8> {
    let mut buf = ByteCursor::with_capacity(21);
    buf.write_u32(server_time);
    buf.write_u8(1);
    buf.write_u32(ACCOUNT_DATA_MASK);
    for bit in 0..8 {
        if ACCOUNT_DATA_MASK & (1 << bit) != 0 {
            buf.write_u32(0);
        }
    }
    buf.into_vec()
}

pub fn update_account_data_complete(data_type: u32) -> Vec<u8> {
    let mut buf = ByteCursor::with_capacity(8);
    buf.write_u32(data_type);
    buf.write_u32(0);
    buf.into_vec()
}

pub fn realm_split(request: u32) -> Vec<u8> {
    let mut buf = ByteCursor::with_capacity(17);
    buf.write_u32(request);
    buf.write_u32(0); // normal, not split
    buf.write_cstring("01/01/01");
    buf.into_vec()
}

const EQUIPMENT_SLOTS: usize = 23;

/// Most characters a single list can carry.
pub const MAX_LISTED_CHARACTERS: usize = u8::MAX as usize;

/// Encodes the first [`MAX_LISTED_CHARACTERS`] records.
pub fn char_enum(characters: &[CharacterRecord]) -> Vec<u8> {
    let listed = &characters[..characters.len().min(MAX_LISTED_CHARACTERS)];
    let mut buf = ByteCursor::new();
    buf.write_u8(listed.len() as u8);
    for character in listed {
        buf.write_u64(character.guid);
        buf.write_cstring(&character.name);
        buf.write_u8(character.race);
        buf.write_u8(character.class);
        buf.write_u8(character.gender);
        buf.write_u8(character.skin);
        buf.write_u8(character.face);
        buf.write_u8(character.hair_style);
        buf.write_u8(character.hair_color);
        buf.write_u8(character.facial_style);
        buf.write_u8(character.level);
        buf.write_u32(character.position.zone_id);
        buf.write_u32(character.position.map_id);
        buf.write_f32(character.position.x);
        buf.write_f32(character.position.y);
        buf.write_f32(character.position.z);
        buf.write_u32(0); // guild id
        buf.write_u32(0); // character flags
        buf.write_u32(0); // customize flags
        buf.write_u8(1); // first login
        buf.write_u32(0); // pet display id
        buf.write_u32(0); // pet level
        buf.write_u32(0); // pet family
        for _ in 0..EQUIPMENT_SLOTS {
            buf.write_u32(0);
            buf.write_u8(0);
            buf.write_u32(0);
        }
    }
    buf.into_vec()
}

/// Reads back the guid and name of each entry in a character list.
pub fn decode_char_enum(buf: &mut ByteCursor) -> Result<Vec<(u64, String)>, BufferError> {
    let count = buf.read_u8()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let guid = buf.read_u64()?;
        let name = buf.read_cstring();
        // appearance, level, zone, map, position, guild, flags, first login, pet
        buf.advance(9 + 4 + 4 + 12 + 12 + 1 + 12)?;
        buf.advance(EQUIPMENT_SLOTS * 9)?;
        out.push((guid, name));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_six_bytes() {
        assert_eq!(greeting(335, 12340), vec![0, 0, 0x4f, 0x01, 0x34, 0x30]);
    }

    #[test]
    fn header_layout_is_packed() {
        let packet = ForwardedPacket::new(0x0403_0201, 0x0037, vec![0xee]).unwrap();
        assert_eq!(
            packet.encode(),
            vec![2, 0x01, 0x02, 0x03, 0x04, 0x37, 0x00, 0x01, 0x00, 0xee]
        );
    }

    #[test]
    fn account_data_times_has_one_slot_per_mask_bit() {
        let body = account_data_times(100);
        assert_eq!(body.len(), 4 + 1 + 4 + 3 * 4);
        assert_eq!(&body[..4], &100u32.to_le_bytes());
        assert_eq!(body[4], 1);
    }

    #[test]
    fn realm_split_ends_with_date_string() {
        let body = realm_split(7);
        assert_eq!(&body[..8], &[7, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&body[8..], b"01/01/01\0");
    }

    #[test]
    fn char_create_body_decodes_in_field_order() {
        let character = NewCharacter {
            name: "grom".into(),
            race: 2,
            class: 1,
            gender: 0,
            skin: 3,
            face: 4,
            hair_style: 5,
            hair_color: 6,
            facial_style: 7,
            outfit_id: 0,
        };
        let bytes = encode_char_create(&character);
        let decoded = decode_char_create(&mut ByteCursor::from(bytes)).unwrap();
        assert_eq!(decoded, character);
    }

    #[test]
    fn char_enum_entries_can_be_walked() {
        let record = CharacterRecord {
            guid: 9,
            account_id: 1,
            name: "Jaina".into(),
            race: 1,
            class: 8,
            gender: 1,
            skin: 0,
            face: 0,
            hair_style: 0,
            hair_color: 0,
            facial_style: 0,
            level: 1,
            position: Default::default(),
        };
        let body = char_enum(&[record.clone(), CharacterRecord { guid: 10, ..record }]);
        let entries = decode_char_enum(&mut ByteCursor::from(body)).unwrap();
        assert_eq!(
            entries,
            vec![(9, "Jaina".to_string()), (10, "Jaina".to_string())]
        );
    }

    #[test]
    fn body_longer_than_size_field_is_refused() {
        assert!(ForwardedPacket::new(1, 0x0037, vec![0; u16::MAX as usize]).is_ok());
        assert!(matches!(
            ForwardedPacket::new(1, 0x0037, vec![0; u16::MAX as usize + 1]),
            Err(ProtocolError::OversizedMessage { len: 65536, .. })
        ));
    }

    #[test]
    fn char_enum_lists_at_most_255_characters() {
        let records: Vec<CharacterRecord> = (0..300)
            .map(|guid| CharacterRecord {
                guid,
                account_id: 1,
                name: format!("C{guid}"),
                race: 1,
                class: 1,
                gender: 0,
                skin: 0,
                face: 0,
                hair_style: 0,
                hair_color: 0,
                facial_style: 0,
                level: 1,
                position: Default::default(),
            })
            .collect();

        let entries = decode_char_enum(&mut ByteCursor::from(char_enum(&records))).unwrap();
        assert_eq!(entries.len(), MAX_LISTED_CHARACTERS);
        assert_eq!(entries.last().unwrap().0, 254);
    }
}
