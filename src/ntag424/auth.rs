//! AuthenticateEV2First, AN12196 section 6.5.

use {
    super::{CommMode, Error, Ntag424, Result, Session},
    crate::{crypto, ensure_err},
    rand::Rng,
    tracing::debug,
};

/// Command code opening a first authentication.
const AUTH_EV2_FIRST: u8 = 0x71;
/// Additional-frame command code carrying the second step.
const ADDITIONAL_FRAME: u8 = 0xAF;

impl Ntag424 {
    /// Run the two-step mutual authentication against `key_number` and
    /// install the derived session, resetting the command counter.
    ///
    /// A failure at any step leaves the previously installed session, if
    /// any, in place: the new session replaces the old one only on full
    /// success.
    pub fn authenticate(
        &mut self,
        rng: &mut impl Rng,
        key_number: u8,
        key: &[u8; 16],
    ) -> Result<()> {
        ensure_err!(key_number <= 4, Error::InvalidKeyNumber { value: key_number });

        // Step 1: request the card nonce. The PCDcap2 length is declared
        // zero.
        let resp = self.send(AUTH_EV2_FIRST, &[key_number, 0x00], &[], CommMode::Plain)?;
        ensure_err!(resp.status.is_additional_frame(), Error::Card(resp.status));
        let ec_rnd_b = resp.data.ok_or(Error::MalformedResponse)?;
        ensure_err!(ec_rnd_b.len() == 16, Error::MalformedResponse);
        let rnd_b: [u8; 16] = crypto::cbc_decrypt(key, &crypto::ZERO_IV, &ec_rnd_b, false)?
            .try_into()
            .unwrap();

        // Step 2: prove knowledge of the key with our own nonce and the
        // rotated card nonce.
        let rnd_a: [u8; 16] = rng.gen();
        let mut msg = [0u8; 32];
        msg[..16].copy_from_slice(&rnd_a);
        msg[16..].copy_from_slice(&crypto::rotate_left(&rnd_b));
        let payload = crypto::cbc_encrypt(key, &crypto::ZERO_IV, &msg, false)?;

        let resp = self.send(ADDITIONAL_FRAME, &[], &payload, CommMode::Plain)?;
        ensure_err!(
            resp.is_ok() && resp.status.sw2() == 0x00,
            Error::Card(resp.status)
        );
        let ec_rnd_ap = resp.data.ok_or(Error::MalformedResponse)?;

        let session = Session::derive(key, &ec_rnd_ap, &rnd_a, &rnd_b)?;
        debug!(ti = %hex::encode(session.ti), key_number, "session established");
        self.session = Some(session);
        self.cmd_counter = 0;
        Ok(())
    }
}
