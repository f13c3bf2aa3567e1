pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";

pub const IDAT: [u8; 4] = *b"IDAT";

pub const IEND: [u8; 4] = *b"IEND";

/// Apple's proprietary chunk type, sitting where IHDR must start in a
/// standards-compliant PNG.
pub const CGBI: [u8; 4] = *b"CgBI";

/// Byte offset of the first chunk's type field (signature + length field).
pub const CHUNK_TYPE_OFFSET: usize = 12;

/// Classifies a byte sequence as CgBI-corrupted.
///
/// Fails closed: anything shorter than 16 bytes, or without the `CgBI`
/// marker at bytes 12..16, is "not CgBI".
pub fn is_cgbi(data: &[u8]) -> bool {
    data.len() >= CHUNK_TYPE_OFFSET + 4
        && data[CHUNK_TYPE_OFFSET..CHUNK_TYPE_OFFSET + 4] == CGBI
}

/// Rewrites the `CgBI` marker at bytes 12..16 to `IHDR`, leaving the rest
/// of the sequence untouched.
///
/// The result is deliberately not a spec-correct PNG: the first chunk's
/// length field still describes the CgBI payload. Whether the patched bytes
/// decode depends entirely on the image library's tolerance, so this is a
/// last-resort heuristic, not a CgBI decoder.
pub fn patch_cgbi_marker(data: &[u8]) -> Option<Vec<u8>> {
    if !is_cgbi(data) {
        return None;
    }

    let mut patched = data.to_vec();
    patched[CHUNK_TYPE_OFFSET..CHUNK_TYPE_OFFSET + 4].copy_from_slice(&IHDR);
    Some(patched)
}

const CRC_TABLE: [u32; 256] = generate_crc_table();

const fn generate_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let poly: u32 = 0xEDB88320;

    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn crc_update(mut crc: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC_TABLE[index] ^ (crc >> 8);
    }
    crc
}

/// CRC-32 over a chunk's type field and payload, as stored in the chunk
/// trailer.
#[inline]
pub fn chunk_crc(chunk_type: &[u8; 4], payload: &[u8]) -> u32 {
    !crc_update(crc_update(0xFFFF_FFFF, chunk_type), payload)
}

/// One chunk as laid out in the file.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub chunk_type: [u8; 4],
    pub payload: &'a [u8],
    pub stored_crc: u32,
}

impl Chunk<'_> {
    #[inline]
    pub fn crc_valid(&self) -> bool {
        chunk_crc(&self.chunk_type, self.payload) == self.stored_crc
    }
}

/// Bounds-checked walk over the chunk sequence after the PNG signature.
/// Stops silently at the first truncated or oversized chunk.
pub struct ChunkIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkIter<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 || data[..8] != PNG_SIGNATURE {
            return None;
        }

        Some(Self { data, pos: 8 })
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.pos + 12 > self.data.len() {
            return None;
        }

        let length = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]) as usize;

        let total_size = 4 + 4 + length + 4;
        if self.pos + total_size > self.data.len() {
            return None;
        }

        let chunk_type: [u8; 4] = [
            self.data[self.pos + 4],
            self.data[self.pos + 5],
            self.data[self.pos + 6],
            self.data[self.pos + 7],
        ];

        let payload = &self.data[self.pos + 8..self.pos + 8 + length];
        let crc_start = self.pos + 8 + length;
        let stored_crc = u32::from_be_bytes([
            self.data[crc_start],
            self.data[crc_start + 1],
            self.data[crc_start + 2],
            self.data[crc_start + 3],
        ]);

        self.pos += total_size;

        Some(Chunk {
            chunk_type,
            payload,
            stored_crc,
        })
    }
}
