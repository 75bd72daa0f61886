//! Offline validation of Secure Dynamic Messaging data.
//!
//! An SDM-enabled tag mirrors its UID, read counter and a truncated CMAC
//! into the URL of its NDEF record on every read. Given the file keys,
//! this module checks such a mirror without a card present: decrypt the
//! PICC data, rebuild the per-read session MAC key and compare the
//! signature in constant time. See AN12196 section 4.4.

use {
    crate::{
        crypto,
        utils::u24_from_le,
    },
    subtle::ConstantTimeEq,
};

const SV2_PREFIX: [u8; 6] = [0x3C, 0xC3, 0x00, 0x01, 0x00, 0x80];

/// PICC-data tag bit: a 7-byte UID follows.
const TAG_UID: u8 = 0b1000_0000;
/// PICC-data tag bit: a 3-byte read counter follows.
const TAG_READ_COUNTER: u8 = 0b0100_0000;

/// Plain PICC data recovered from an SDM mirror.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PiccData {
    pub uid: Option<[u8; 7]>,
    pub read_counter: Option<u32>,
}

/// Check a truncated SDM MAC against the UID and read counter it covers.
///
/// `mac_key` is the key the `sdmFileRead` access right names. The counter
/// is 24-bit on the card; only the low three bytes participate.
pub fn validate_mac(
    mac_key: &[u8; 16],
    uid: Option<&[u8; 7]>,
    read_counter: Option<u32>,
    signature: &[u8; 8],
) -> bool {
    let mut sv2 = [0u8; 16];
    sv2[..6].copy_from_slice(&SV2_PREFIX);
    let mut pos = 6;
    if let Some(uid) = uid {
        sv2[pos..pos + 7].copy_from_slice(uid);
        pos += 7;
    }
    if let Some(counter) = read_counter {
        sv2[pos..pos + 3].copy_from_slice(&counter.to_le_bytes()[..3]);
    }

    let session_key = crypto::cmac(mac_key, &sv2);
    let expected = crypto::reduce_mac(&crypto::cmac(&session_key, &[]));
    bool::from(expected.ct_eq(signature))
}

/// Decrypt a 16-byte encrypted PICC data blob.
///
/// The leading tag byte announces which fields follow; its low bits carry
/// variant information and are left alone.
pub fn decrypt_picc_data(key: &[u8; 16], encrypted: &[u8; 16]) -> crypto::Result<PiccData> {
    let plain = crypto::cbc_decrypt(key, &crypto::ZERO_IV, encrypted, false)?;
    let tag = plain[0];

    let mut data = PiccData {
        uid: None,
        read_counter: None,
    };
    let mut pos = 1;
    if tag & TAG_UID != 0 {
        data.uid = Some(plain[pos..pos + 7].try_into().unwrap());
        pos += 7;
    }
    if tag & TAG_READ_COUNTER != 0 {
        data.read_counter = Some(u24_from_le([plain[pos], plain[pos + 1], plain[pos + 2]]));
    }
    Ok(data)
}

/// Decrypt PICC data and verify its SDM MAC.
///
/// `None` means the signature did not match; none of the decrypted fields
/// may be trusted then.
pub fn decrypt_and_validate(
    decryption_key: &[u8; 16],
    mac_key: &[u8; 16],
    encrypted_picc: &[u8; 16],
    signature: &[u8; 8],
) -> crypto::Result<Option<PiccData>> {
    let data = decrypt_picc_data(decryption_key, encrypted_picc)?;
    let valid = validate_mac(mac_key, data.uid.as_ref(), data.read_counter, signature);
    Ok(valid.then_some(data))
}
