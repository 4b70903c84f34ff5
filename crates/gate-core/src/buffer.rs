//! Growable byte buffer with independent read and write cursors.
//!
//! Every multi-byte value is little-endian and fixed-width. Reads never go
//! out of bounds: a short buffer yields [`BufferError::TruncatedRead`] and
//! leaves the read cursor where it was.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::BufferError;

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteCursor {
    // `data.len()` is the write cursor.
    data: Vec<u8>,
    read_pos: usize,
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn write_pos(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet read.
    pub fn readable_len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.readable_len() == 0
    }

    pub fn readable(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// Mutable view of the stored bytes starting at absolute offset `from`.
    ///
    /// Used for in-place decryption of freshly received bytes. `from` is
    /// clamped to the write cursor.
    pub fn bytes_mut_from(&mut self, from: usize) -> &mut [u8] {
        let from = from.min(self.data.len());
        &mut self.data[from..]
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.readable().first().copied()
    }

    fn ensure(&self, wanted: usize) -> Result<(), BufferError> {
        let available = self.readable_len();
        if available < wanted {
            return Err(BufferError::TruncatedRead { wanted, available });
        }
        Ok(())
    }

    pub fn advance(&mut self, len: usize) -> Result<(), BufferError> {
        self.ensure(len)?;
        self.read_pos += len;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], BufferError> {
        self.ensure(len)?;
        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, BufferError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    /// Reads up to a NUL terminator or the end of the buffer.
    ///
    /// A missing terminator is not an error; whatever was accumulated is
    /// returned. Invalid UTF-8 is replaced lossily.
    pub fn read_cstring(&mut self) -> String {
        let rest = self.readable();
        let (text, consumed) = match rest.iter().position(|b| *b == 0) {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        let value = String::from_utf8_lossy(text).into_owned();
        self.read_pos += consumed;
        value
    }

    /// Appends raw bytes, growing capacity geometrically.
    pub fn append(&mut self, bytes: &[u8]) {
        let needed = self.data.len() + bytes.len();
        if needed > self.data.capacity() {
            let grow = bytes.len().max(self.data.capacity());
            self.data.reserve(grow);
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.append(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.append(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.append(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.append(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.append(&value.to_le_bytes());
    }

    /// Writes the string bytes followed by a NUL terminator.
    pub fn write_cstring(&mut self, value: &str) {
        self.append(value.as_bytes());
        self.write_u8(0);
    }

    /// Moves the unread tail to offset zero. Returns how far bytes shifted.
    pub fn compact(&mut self) -> usize {
        let shift = self.read_pos;
        if shift > 0 {
            self.data.drain(..shift);
            self.read_pos = 0;
        }
        shift
    }

    /// Drops all content and resets both cursors.
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.compact();
        self.data
    }
}

impl From<Vec<u8>> for ByteCursor {
    fn from(data: Vec<u8>) -> Self {
        Self { data, read_pos: 0 }
    }
}

impl From<&[u8]> for ByteCursor {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}
