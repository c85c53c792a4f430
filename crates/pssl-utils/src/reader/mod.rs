//! Bounds-checked reader for untrusted wire buffers.
//!
//! Reads never fail and never go past the end of the buffer: a read that
//! would overrun returns zero (or an empty slice) and latches the
//! [`ByteReader::overrun`] flag. Parsers bound the declared message length
//! up front, read every field, and check the flag once at the end.

/// Cursor over an untrusted byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            overrun: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether any read has tried to go past the end of the buffer.
    pub fn overrun(&self) -> bool {
        self.overrun
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            self.overrun = true;
            self.pos = self.data.len();
            return None;
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(out)
    }

    /// Read one byte, or 0 past the end.
    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map_or(0, |b| b[0])
    }

    /// Read a big-endian u16, or 0 past the end.
    pub fn read_u16(&mut self) -> u16 {
        self.take(2).map_or(0, |b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 24-bit value, or 0 past the end.
    pub fn read_u24(&mut self) -> u32 {
        self.take(3)
            .map_or(0, |b| u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Read a big-endian u32, or 0 past the end.
    pub fn read_u32(&mut self) -> u32 {
        self.take(4)
            .map_or(0, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read `len` raw bytes, or an empty slice past the end.
    pub fn read_bytes(&mut self, len: usize) -> &'a [u8] {
        self.take(len).unwrap_or(&[])
    }

    /// Read exactly `N` bytes into an array (zero-filled past the end).
    pub fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(b) = self.take(N) {
            out.copy_from_slice(b);
        }
        out
    }

    /// Read an 8-bit length-prefixed vector.
    pub fn read_vec8(&mut self) -> &'a [u8] {
        let len = self.read_u8() as usize;
        self.read_bytes(len)
    }

    /// Read a 16-bit length-prefixed vector.
    pub fn read_vec16(&mut self) -> &'a [u8] {
        let len = self.read_u16() as usize;
        self.read_bytes(len)
    }

    /// Read a 24-bit length-prefixed vector.
    pub fn read_vec24(&mut self) -> &'a [u8] {
        let len = self.read_u24() as usize;
        self.read_bytes(len)
    }

    /// Read `len` bytes as text, replacing invalid UTF-8.
    pub fn read_string(&mut self, len: usize) -> String {
        String::from_utf8_lossy(self.read_bytes(len)).into_owned()
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) {
        let _ = self.take(len);
    }

    /// Split off a sub-reader over the next `len` bytes.
    ///
    /// If fewer than `len` bytes remain, this reader is marked overrun and
    /// the sub-reader covers nothing.
    pub fn sub_reader(&mut self, len: usize) -> ByteReader<'a> {
        ByteReader::new(self.read_bytes(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_reads() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8(), 0x01);
        assert_eq!(r.read_u16(), 0x0203);
        assert_eq!(r.read_u24(), 0x040506);
        assert_eq!(r.read_u32(), 0x0708090a);
        assert!(r.is_empty());
        assert!(!r.overrun());
    }

    #[test]
    fn test_overrun_returns_zero_and_latches() {
        let data = [0xff];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16(), 0);
        assert!(r.overrun());
        // Subsequent reads keep returning zero.
        assert_eq!(r.read_u8(), 0);
        assert!(r.read_bytes(4).is_empty());
    }

    #[test]
    fn test_length_prefixed_vectors() {
        let data = [0x02, 0xaa, 0xbb, 0x00, 0x01, 0xcc, 0x00, 0x00, 0x01, 0xdd];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_vec8(), &[0xaa, 0xbb]);
        assert_eq!(r.read_vec16(), &[0xcc]);
        assert_eq!(r.read_vec24(), &[0xdd]);
        assert!(!r.overrun());
    }

    #[test]
    fn test_vector_longer_than_buffer() {
        let data = [0x05, 0x01, 0x02];
        let mut r = ByteReader::new(&data);
        assert!(r.read_vec8().is_empty());
        assert!(r.overrun());
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let data = [0x01, 0x02, 0x03];
        let mut r = ByteReader::new(&data);
        let mut sub = r.sub_reader(2);
        assert_eq!(sub.read_u16(), 0x0102);
        assert_eq!(sub.read_u8(), 0);
        assert!(sub.overrun());
        assert!(!r.overrun());
        assert_eq!(r.read_u8(), 0x03);
    }

    #[test]
    fn test_read_string_and_array() {
        let data = *b"abcXYZ";
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_string(3), "abc");
        let arr: [u8; 3] = r.read_array();
        assert_eq!(&arr, b"XYZ");
        let arr: [u8; 2] = r.read_array();
        assert_eq!(arr, [0, 0]);
        assert!(r.overrun());
    }
}
