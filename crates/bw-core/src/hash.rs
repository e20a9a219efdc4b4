//! Hash functions for Blockwise
//!
//! Index tables are keyed by a 32-bit Murmur3 hash of the keyword or domain
//! string. The full key string is stored next to the hash, so a collision
//! costs one extra string comparison and never a wrong answer.
//!
//! # Sentinel Handling
//!
//! Empty slot sentinel in hash tables is `0`.
//! [`hash_key`] never returns it.

const KEY_SEED: u32 = 0x811c9dc5;

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical keyword and domain lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut chunks = data.chunks_exact(4);

    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Hash an index key (keyword or domain). Never returns 0.
#[inline]
pub fn hash_key(key: &str) -> u32 {
    match murmur3_32(key.as_bytes(), KEY_SEED) {
        0 => 1,
        h => h,
    }
}

/// Compute CRC32 for snapshot integrity checking.
/// Uses the standard CRC32 polynomial (IEEE 802.3).
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0xffffffff, data) ^ 0xffffffff
}

/// Feed more bytes into a running CRC32 state (pre-inverted).
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    static CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 {
                    0xedb88320 ^ (c >> 1)
                } else {
                    c >> 1
                };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc
}
