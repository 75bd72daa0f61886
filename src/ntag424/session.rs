//! Session key derivation, AN12196 section 6.6.

use {
    super::{Error, Result},
    crate::{crypto, ensure_err},
    std::array,
};

/// Keys and transaction identifier installed by a completed
/// AuthenticateEV2First exchange. Immutable once installed.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    /// Transaction identifier chosen by the card.
    pub ti: [u8; 4],
    /// `SesAuthENCKey`.
    pub enc_key: [u8; 16],
    /// `SesAuthMACKey`.
    pub mac_key: [u8; 16],
}

impl Session {
    /// Decrypt the step-2 response, verify the `RndA` round trip and
    /// derive the session keys from the two nonces.
    pub fn derive(
        key: &[u8; 16],
        ec_rnd_ap: &[u8],
        rnd_a: &[u8; 16],
        rnd_b: &[u8; 16],
    ) -> Result<Self> {
        let plain = crypto::cbc_decrypt(key, &crypto::ZERO_IV, ec_rnd_ap, false)?;
        ensure_err!(plain.len() >= 20, Error::MalformedResponse);

        let ti: [u8; 4] = plain[0..4].try_into().unwrap();
        let rnd_a_rot: [u8; 16] = plain[4..20].try_into().unwrap();
        ensure_err!(crypto::rotate_right(&rnd_a_rot) == *rnd_a, Error::AuthMismatch);

        let (enc_key, mac_key) = derive_keys(key, rnd_a, rnd_b);
        Ok(Self {
            ti,
            enc_key,
            mac_key,
        })
    }
}

/// `(SesAuthENCKey, SesAuthMACKey)` per AN12196 section 6.6.2.
pub(crate) fn derive_keys(
    key: &[u8; 16],
    rnd_a: &[u8; 16],
    rnd_b: &[u8; 16],
) -> ([u8; 16], [u8; 16]) {
    let sv1 = session_vector([0xA5, 0x5A], rnd_a, rnd_b);
    let sv2 = session_vector([0x5A, 0xA5], rnd_a, rnd_b);
    (crypto::cmac(key, &sv1), crypto::cmac(key, &sv2))
}

/// `label ‖ 00 01 00 80 ‖ RndA[0..2] ‖ (RndA[2..8] ⊕ RndB[0..6]) ‖
/// RndB[6..16] ‖ RndA[8..16]`
fn session_vector(label: [u8; 2], rnd_a: &[u8; 16], rnd_b: &[u8; 16]) -> [u8; 32] {
    let xor6: [u8; 6] = array::from_fn(|i| rnd_a[2 + i] ^ rnd_b[i]);
    let mut sv = [0u8; 32];
    sv[0..2].copy_from_slice(&label);
    sv[2..6].copy_from_slice(&[0x00, 0x01, 0x00, 0x80]);
    sv[6..8].copy_from_slice(&rnd_a[0..2]);
    sv[8..14].copy_from_slice(&xor6);
    sv[14..24].copy_from_slice(&rnd_b[6..16]);
    sv[24..32].copy_from_slice(&rnd_a[8..16]);
    sv
}
