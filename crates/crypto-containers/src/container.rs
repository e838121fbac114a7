//! Chunked AEAD file container (§4.6, §6).
//!
//! The underlying file is a fixed-size first chunk followed by equal-size
//! subsequent chunks. Each chunk is sealed independently with a key (and
//! nonce) derived via HKDF from a per-file salt and the chunk's index, so
//! no nonce or per-chunk key material needs to be stored — only the salt
//! and the two chunk sizes, which is enough arithmetic to locate any
//! chunk's ciphertext offset without a full boundary table. That's what
//! makes random access possible: read the 22-byte header plus the small
//! descriptor that follows it, then seek straight to the chunk that holds
//! the requested plaintext offset.
//!
//! Layout: `header(22B) ‖ descriptor(44B) ‖ chunk0 ‖ chunk1 ‖ …`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::CryptoError;

const HEADER_LEN: usize = 22;
const DESCRIPTOR_LEN: usize = 44;
const AEAD_TAG_LEN: usize = 16;
const VERSION: u8 = 1;

const MAGIC_CHUNKED: [u8; 3] = *b"HCC";
const MAGIC_STREAMING: [u8; 3] = *b"HCS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A random-access, file-backed object value.
    Chunked,
    /// A one-shot blob (session tickets, config) sealed and read whole.
    Streaming,
}

impl ContainerKind {
    fn magic(self) -> [u8; 3] {
        match self {
            ContainerKind::Chunked => MAGIC_CHUNKED,
            ContainerKind::Streaming => MAGIC_STREAMING,
        }
    }

    fn from_magic(magic: [u8; 3]) -> Result<Self, CryptoError> {
        match magic {
            MAGIC_CHUNKED => Ok(ContainerKind::Chunked),
            MAGIC_STREAMING => Ok(ContainerKind::Streaming),
            other => Err(CryptoError::InvalidHeader(format!("unrecognized magic {other:?}"))),
        }
    }
}

/// 256-bit master key the per-chunk keys are derived from.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct ContainerKey([u8; 32]);

impl ContainerKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

struct Descriptor {
    salt: [u8; 32],
    first_chunk_size: u32,
    chunk_size: u32,
    chunk_count: u32,
}

impl Descriptor {
    fn encode(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut buf = [0u8; DESCRIPTOR_LEN];
        buf[0..32].copy_from_slice(&self.salt);
        buf[32..36].copy_from_slice(&self.first_chunk_size.to_le_bytes());
        buf[36..40].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[40..44].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != DESCRIPTOR_LEN {
            return Err(CryptoError::InvalidHeader("descriptor length mismatch".into()));
        }
        let mut salt = [0u8; 32];
        salt.copy_from_slice(&bytes[0..32]);
        Ok(Self {
            salt,
            first_chunk_size: u32::from_le_bytes(bytes[32..36].try_into().unwrap()),
            chunk_size: u32::from_le_bytes(bytes[36..40].try_into().unwrap()),
            chunk_count: u32::from_le_bytes(bytes[40..44].try_into().unwrap()),
        })
    }

    /// Plaintext length of chunk `index`, given the total plaintext size.
    fn chunk_plain_len(&self, index: u32, plaintext_size: u64) -> u64 {
        let before = self.plain_offset(index);
        let nominal = if index == 0 { self.first_chunk_size } else { self.chunk_size } as u64;
        nominal.min(plaintext_size.saturating_sub(before))
    }

    /// Plaintext byte offset at which chunk `index` begins.
    fn plain_offset(&self, index: u32) -> u64 {
        if index == 0 {
            0
        } else {
            self.first_chunk_size as u64 + (index as u64 - 1) * self.chunk_size as u64
        }
    }

    fn chunk_index_for_offset(&self, offset: u64) -> u32 {
        if offset < self.first_chunk_size as u64 {
            0
        } else {
            1 + ((offset - self.first_chunk_size as u64) / self.chunk_size as u64) as u32
        }
    }
}

fn derive_chunk_key_nonce(key: &ContainerKey, salt: &[u8; 32], index: u32) -> ([u8; 32], [u8; 24]) {
    let hk = Hkdf::<Sha256>::new(Some(salt), key.as_bytes());
    let mut okm = [0u8; 56];
    let mut info = Vec::with_capacity(9);
    info.extend_from_slice(b"chunk");
    info.extend_from_slice(&index.to_be_bytes());
    hk.expand(&info, &mut okm).expect("56 bytes is within HKDF-SHA256's output limit");
    let mut chunk_key = [0u8; 32];
    let mut nonce = [0u8; 24];
    chunk_key.copy_from_slice(&okm[0..32]);
    nonce.copy_from_slice(&okm[32..56]);
    (chunk_key, nonce)
}

fn seal_chunk(key: &ContainerKey, salt: &[u8; 32], index: u32, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (chunk_key, nonce) = derive_chunk_key_nonce(key, salt, index);
    let cipher = XChaCha20Poly1305::new((&chunk_key).into());
    cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

fn open_chunk(key: &ContainerKey, salt: &[u8; 32], index: u32, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (chunk_key, nonce) = derive_chunk_key_nonce(key, salt, index);
    let cipher = XChaCha20Poly1305::new((&chunk_key).into());
    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Seals `plaintext` into a complete container file's bytes.
pub fn seal(
    key: &ContainerKey,
    kind: ContainerKind,
    plaintext: &[u8],
    first_chunk_size: u32,
    chunk_size: u32,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);

    let plaintext_size = plaintext.len() as u64;
    let chunk_count = if plaintext.is_empty() {
        0
    } else if (plaintext.len() as u64) <= first_chunk_size as u64 {
        1
    } else {
        let remainder = plaintext.len() as u64 - first_chunk_size as u64;
        let trailing_chunks = remainder.div_ceil(chunk_size as u64);
        1 + trailing_chunks as u32
    };

    let descriptor = Descriptor { salt, first_chunk_size, chunk_size, chunk_count };

    let mut body = Vec::new();
    let mut offset = 0usize;
    for index in 0..chunk_count {
        let plain_len = descriptor.chunk_plain_len(index, plaintext_size) as usize;
        let chunk_plain = &plaintext[offset..offset + plain_len];
        body.extend_from_slice(&seal_chunk(key, &salt, index, chunk_plain)?);
        offset += plain_len;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + DESCRIPTOR_LEN + body.len());
    out.extend_from_slice(&kind.magic());
    out.push(VERSION);
    out.extend_from_slice(&(DESCRIPTOR_LEN as u16).to_le_bytes());
    out.extend_from_slice(&plaintext_size.to_le_bytes());
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(&descriptor.encode());
    out.extend_from_slice(&body);
    Ok(out)
}

struct ParsedHeader {
    #[allow(dead_code)]
    kind: ContainerKind,
    plaintext_size: u64,
    descriptor: Descriptor,
    body_start: usize,
}

fn parse_header(file: &[u8]) -> Result<ParsedHeader, CryptoError> {
    if file.len() < HEADER_LEN {
        return Err(CryptoError::InvalidHeader("file shorter than header".into()));
    }
    let magic: [u8; 3] = file[0..3].try_into().unwrap();
    let kind = ContainerKind::from_magic(magic)?;
    let version = file[3];
    if version != VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    let descriptor_len = u16::from_le_bytes(file[4..6].try_into().unwrap()) as usize;
    let plaintext_size = u64::from_le_bytes(file[6..14].try_into().unwrap());
    let _ciphertext_size = u64::from_le_bytes(file[14..22].try_into().unwrap());
    if file.len() < HEADER_LEN + descriptor_len {
        return Err(CryptoError::InvalidHeader("file shorter than descriptor".into()));
    }
    let descriptor = Descriptor::decode(&file[HEADER_LEN..HEADER_LEN + descriptor_len])?;
    Ok(ParsedHeader { kind, plaintext_size, descriptor, body_start: HEADER_LEN + descriptor_len })
}

/// Decrypts the whole container back into its plaintext.
pub fn open(key: &ContainerKey, file: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let header = parse_header(file)?;
    let mut out = Vec::with_capacity(header.plaintext_size as usize);
    let mut cursor = header.body_start;
    let mut index = 0u32;
    while (out.len() as u64) < header.plaintext_size {
        let plain_len = header.descriptor.chunk_plain_len(index, header.plaintext_size) as usize;
        let cipher_len = plain_len + AEAD_TAG_LEN;
        if cursor + cipher_len > file.len() {
            return Err(CryptoError::InvalidHeader("truncated chunk".into()));
        }
        let chunk = open_chunk(key, &header.descriptor.salt, index, &file[cursor..cursor + cipher_len])?;
        out.extend_from_slice(&chunk);
        cursor += cipher_len;
        index += 1;
    }
    Ok(out)
}

/// Decrypts only the chunk(s) covering `[offset, offset + len)`, exposing
/// plaintext offsets to the caller without decrypting the whole file.
pub fn read_range(key: &ContainerKey, file: &[u8], offset: u64, len: u64) -> Result<Vec<u8>, CryptoError> {
    let header = parse_header(file)?;
    if offset > header.plaintext_size {
        return Err(CryptoError::OffsetOutOfRange { offset, plaintext_len: header.plaintext_size });
    }
    let end = (offset + len).min(header.plaintext_size);
    let mut out = Vec::with_capacity((end - offset) as usize);

    let start_index = header.descriptor.chunk_index_for_offset(offset);
    let end_index = if end == offset { start_index } else { header.descriptor.chunk_index_for_offset(end - 1) };

    // Cumulative ciphertext offset up to `start_index`: every preceding
    // chunk's length is derivable from the descriptor, so this is
    // arithmetic rather than a stored table.
    let mut cursor = header.body_start;
    for index in 0..start_index {
        let plain_len = header.descriptor.chunk_plain_len(index, header.plaintext_size) as usize;
        cursor += plain_len + AEAD_TAG_LEN;
    }

    for index in start_index..=end_index {
        let plain_len = header.descriptor.chunk_plain_len(index, header.plaintext_size) as usize;
        let cipher_len = plain_len + AEAD_TAG_LEN;
        if cursor + cipher_len > file.len() {
            return Err(CryptoError::InvalidHeader("truncated chunk".into()));
        }
        let chunk_plain = open_chunk(key, &header.descriptor.salt, index, &file[cursor..cursor + cipher_len])?;
        let chunk_start = header.descriptor.plain_offset(index);
        let lo = offset.max(chunk_start) - chunk_start;
        let hi = end.min(chunk_start + plain_len as u64) - chunk_start;
        out.extend_from_slice(&chunk_plain[lo as usize..hi as usize]);
        cursor += cipher_len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_single_chunk_file() {
        let key = ContainerKey::generate();
        let plaintext = b"hello, container";
        let file = seal(&key, ContainerKind::Chunked, plaintext, 4096, 4096).unwrap();
        let decoded = open(&key, &file).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn roundtrips_across_multiple_chunks() {
        let key = ContainerKey::generate();
        let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = seal(&key, ContainerKind::Chunked, &plaintext, 1024, 2048).unwrap();
        let decoded = open(&key, &file).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn read_range_matches_a_full_open_slice() {
        let key = ContainerKey::generate();
        let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = seal(&key, ContainerKind::Chunked, &plaintext, 1024, 2048).unwrap();
        let slice = read_range(&key, &file, 1500, 3000).unwrap();
        assert_eq!(slice, plaintext[1500..4500]);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let key = ContainerKey::generate();
        let other = ContainerKey::generate();
        let file = seal(&key, ContainerKind::Chunked, b"secret", 64, 64).unwrap();
        assert!(open(&other, &file).is_err());
    }

    #[test]
    fn tampered_chunk_fails_authentication() {
        let key = ContainerKey::generate();
        let mut file = seal(&key, ContainerKind::Chunked, b"tamper me", 64, 64).unwrap();
        let last = file.len() - 1;
        file[last] ^= 0xFF;
        assert!(open(&key, &file).is_err());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = ContainerKey::generate();
        let file = seal(&key, ContainerKind::Chunked, b"", 64, 64).unwrap();
        assert_eq!(open(&key, &file).unwrap(), Vec::<u8>::new());
    }
}
