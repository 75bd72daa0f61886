//! AES-128 primitives of the NTAG 424 DNA secure channel.
//!
//! Everything here is a pure function over byte buffers; the session layer
//! owns all state. Padding is ISO 9797-1 method 2 (`0x80` marker, zero
//! fill), applied and stripped manually so the cipher modes always run
//! without padding.

use {
    aes::Aes128,
    cipher::{
        block_padding::NoPadding, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit,
        KeyIvInit,
    },
    cmac::{Cmac, Mac},
    crc::{Crc, CRC_32_JAMCRC},
    std::array,
    thiserror::Error,
};

use crate::ensure_err;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// The all-zero IV used by the authentication exchange and PICC-data
/// decryption.
pub const ZERO_IV: [u8; 16] = [0; 16];

type CbcEnc = cbc::Encryptor<Aes128>;
type CbcDec = cbc::Decryptor<Aes128>;

const JAMCRC: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("input of {len} bytes is not a multiple of the AES block size")]
    NotBlockAligned { len: usize },

    #[error("plaintext carries no 0x80 padding marker")]
    MalformedPadding,

    #[error("buffer lengths differ ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// AES-128 ECB over one or more blocks. No padding is applied or removed.
pub fn ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    ensure_err!(
        data.len() % BLOCK_SIZE == 0,
        Error::NotBlockAligned { len: data.len() }
    );
    let aes = Aes128::new(key.into());
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(BLOCK_SIZE) {
        let block: &mut [u8; BLOCK_SIZE] = block.try_into().unwrap();
        aes.encrypt_block(block.into());
    }
    Ok(out)
}

/// AES-128 ECB of a single block, used for session IV derivation.
pub fn ecb_encrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let mut out = *block;
    Aes128::new(key.into()).encrypt_block((&mut out).into());
    out
}

/// AES-128 CBC encryption. With `pad` the ISO 9797-1 padding is appended
/// first (a full padding block when the input is already aligned);
/// otherwise the input must be block aligned.
pub fn cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8], pad: bool) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    if pad {
        pad_iso9797(&mut buf);
    } else {
        ensure_err!(
            buf.len() % BLOCK_SIZE == 0,
            Error::NotBlockAligned { len: buf.len() }
        );
    }
    let len = buf.len();
    CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .unwrap();
    Ok(buf)
}

/// AES-128 CBC decryption. With `strip_padding` the plaintext is truncated
/// at its last `0x80` byte; a plaintext without one is malformed.
pub fn cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    data: &[u8],
    strip_padding: bool,
) -> Result<Vec<u8>> {
    ensure_err!(
        data.len() % BLOCK_SIZE == 0,
        Error::NotBlockAligned { len: data.len() }
    );
    let mut buf = data.to_vec();
    CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .unwrap();
    if strip_padding {
        let len = buf
            .iter()
            .rposition(|&b| b == 0x80)
            .ok_or(Error::MalformedPadding)?;
        buf.truncate(len);
    }
    Ok(buf)
}

/// ISO 9797-1 padding method 2: append `0x80`, zero-fill to the block
/// boundary.
pub fn pad_iso9797(bytes: &mut Vec<u8>) {
    bytes.push(0x80);
    bytes.resize(bytes.len().next_multiple_of(BLOCK_SIZE), 0x00);
}

/// AES-CMAC (NIST SP 800-38B).
pub fn cmac(key: &[u8; 16], msg: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(key.into());
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// Truncate a CMAC to its eight odd-indexed bytes (AN12196 p. 21).
pub fn reduce_mac(mac: &[u8; 16]) -> [u8; 8] {
    array::from_fn(|i| mac[2 * i + 1])
}

/// CRC-32/JAMCRC (the bitwise complement of CRC-32/ISO-HDLC), as required
/// by ChangeKey.
pub fn crc32jam(data: &[u8]) -> u32 {
    JAMCRC.checksum(data)
}

/// Rotate a buffer left by one byte.
pub fn rotate_left<const N: usize>(data: &[u8; N]) -> [u8; N] {
    array::from_fn(|i| data[(i + 1) % N])
}

/// Rotate a buffer right by one byte.
pub fn rotate_right<const N: usize>(data: &[u8; N]) -> [u8; N] {
    array::from_fn(|i| data[(i + N - 1) % N])
}

/// Byte-wise XOR of two equal-length buffers.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    ensure_err!(
        a.len() == b.len(),
        Error::LengthMismatch {
            left: a.len(),
            right: b.len()
        }
    );
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
