//! The three communication modes of the native command set.
//!
//! MAC mode protects command and response with a truncated AES-CMAC keyed
//! by `SesAuthMACKey`; full mode additionally enciphers command and
//! response data under `SesAuthENCKey` with an IV bound to the transaction
//! identifier and command counter. See AN12196 sections 6.9 and 6.10.

use {
    super::{Error, Ntag424, Result},
    crate::{crypto, ensure_err, iso7816::CommandResponse},
    subtle::ConstantTimeEq,
};

/// Communication mode of a native command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommMode {
    Plain,
    Mac,
    Full,
}

impl CommMode {
    /// The 2-bit wire encoding used in file options. `0b10` does not
    /// exist.
    pub fn bits(self) -> u8 {
        match self {
            Self::Plain => 0b00,
            Self::Mac => 0b01,
            Self::Full => 0b11,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0b00 => Ok(Self::Plain),
            0b01 => Ok(Self::Mac),
            0b11 => Ok(Self::Full),
            _ => Err(Error::UnsupportedCommMode { bits }),
        }
    }
}

impl Ntag424 {
    /// Issue a native command under `mode` and return the verified,
    /// decrypted response.
    ///
    /// Error statuses are returned as-is, without response verification,
    /// for the caller to inspect.
    pub fn send(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
        mode: CommMode,
    ) -> Result<CommandResponse> {
        match mode {
            CommMode::Plain => self.send_plain(command, header, data),
            CommMode::Mac => self.send_mac(command, header, data),
            CommMode::Full => self.send_full(command, header, data),
        }
    }

    fn send_plain(&mut self, command: u8, header: &[u8], data: &[u8]) -> Result<CommandResponse> {
        let mut payload = header.to_vec();
        payload.extend_from_slice(data);
        self.send_native(command, payload)
    }

    fn send_mac(&mut self, command: u8, header: &[u8], data: &[u8]) -> Result<CommandResponse> {
        // Without a session the command goes out unprotected.
        let Some(session) = &self.session else {
            return self.send_plain(command, header, data);
        };
        let (mac_key, ti) = (session.mac_key, session.ti);

        let mut mac_in = vec![command];
        mac_in.extend_from_slice(&self.cmd_counter.to_le_bytes());
        mac_in.extend_from_slice(&ti);
        mac_in.extend_from_slice(header);
        mac_in.extend_from_slice(data);
        let request_mac = crypto::reduce_mac(&crypto::cmac(&mac_key, &mac_in));

        let mut payload = header.to_vec();
        payload.extend_from_slice(data);
        payload.extend_from_slice(&request_mac);
        let CommandResponse { status, data } = self.send_native(command, payload)?;

        if !status.is_ok() {
            return Ok(CommandResponse { status, data });
        }
        let Some(body) = data else {
            return Ok(CommandResponse { status, data: None });
        };
        ensure_err!(body.len() >= 8, Error::MalformedResponse);
        let (body, response_mac) = body.split_at(body.len() - 8);

        // The counter advanced with the send; the response is MACed over
        // SW2 and the new value.
        let mut mac_in = vec![status.sw2()];
        mac_in.extend_from_slice(&self.cmd_counter.to_le_bytes());
        mac_in.extend_from_slice(&ti);
        mac_in.extend_from_slice(body);
        let expected = crypto::reduce_mac(&crypto::cmac(&mac_key, &mac_in));
        ensure_err!(
            bool::from(expected.ct_eq(response_mac)),
            Error::ResponseMacMismatch
        );

        Ok(CommandResponse {
            status,
            data: (!body.is_empty()).then(|| body.to_vec()),
        })
    }

    fn send_full(&mut self, command: u8, header: &[u8], data: &[u8]) -> Result<CommandResponse> {
        let Some(session) = &self.session else {
            return Err(Error::NotAuthenticated);
        };
        let (enc_key, ti) = (session.enc_key, session.ti);

        // Empty data goes out unencrypted; only the MACs protect the
        // exchange then.
        let ciphertext = if data.is_empty() {
            Vec::new()
        } else {
            let iv = self.session_iv(&enc_key, &ti, [0xA5, 0x5A]);
            crypto::cbc_encrypt(&enc_key, &iv, data, true)?
        };

        let CommandResponse { status, data } = self.send_mac(command, header, &ciphertext)?;
        if !status.is_ok() {
            return Ok(CommandResponse { status, data });
        }
        let Some(body) = data else {
            return Ok(CommandResponse { status, data: None });
        };

        let iv = self.session_iv(&enc_key, &ti, [0x5A, 0xA5]);
        let plaintext = crypto::cbc_decrypt(&enc_key, &iv, &body, true)?;
        Ok(CommandResponse {
            status,
            data: Some(plaintext),
        })
    }

    /// `E(SesAuthENCKey, label ‖ TI ‖ CmdCtr ‖ 0…)`, AN12196 section 6.10.
    fn session_iv(&self, enc_key: &[u8; 16], ti: &[u8; 4], label: [u8; 2]) -> [u8; 16] {
        let mut input = [0u8; 16];
        input[0..2].copy_from_slice(&label);
        input[2..6].copy_from_slice(ti);
        input[6..8].copy_from_slice(&self.cmd_counter.to_le_bytes());
        crypto::ecb_encrypt_block(enc_key, &input)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{super::testing::MockReader, *},
        crate::{crypto, ntag424::{session::Session, Ntag424}},
        hex_literal::hex,
    };

    const MAC_KEY: [u8; 16] = hex!("fc4af159b62e549b5812394cab1918cc");
    const ENC_KEY: [u8; 16] = hex!("7a93d6571e4b180fca6ac90c9a7488d4");
    const TI: [u8; 4] = hex!("11223344");

    fn session() -> Session {
        Session {
            ti: TI,
            enc_key: ENC_KEY,
            mac_key: MAC_KEY,
        }
    }

    fn request_mac(command: u8, counter: u16, payload: &[u8]) -> [u8; 8] {
        let mut mac_in = vec![command];
        mac_in.extend_from_slice(&counter.to_le_bytes());
        mac_in.extend_from_slice(&TI);
        mac_in.extend_from_slice(payload);
        crypto::reduce_mac(&crypto::cmac(&MAC_KEY, &mac_in))
    }

    fn response_mac(sw2: u8, counter: u16, body: &[u8]) -> [u8; 8] {
        let mut mac_in = vec![sw2];
        mac_in.extend_from_slice(&counter.to_le_bytes());
        mac_in.extend_from_slice(&TI);
        mac_in.extend_from_slice(body);
        crypto::reduce_mac(&crypto::cmac(&MAC_KEY, &mac_in))
    }

    fn mac_frame(command: u8, counter: u16, header: &[u8], data: &[u8]) -> Vec<u8> {
        let mut payload = header.to_vec();
        payload.extend_from_slice(data);
        let mut macced = payload.clone();
        macced.extend_from_slice(&request_mac(command, counter, &payload));
        let mut frame = vec![0x90, command, 0x00, 0x00, macced.len() as u8];
        frame.extend_from_slice(&macced);
        frame.push(0x00);
        frame
    }

    #[test]
    fn test_plain_counter_advances_per_send() {
        let exchanges = (0..3)
            .map(|_| (vec![0x90, 0x60, 0x00, 0x00, 0x00], vec![0x91, 0x00]))
            .collect();
        let mut tag = Ntag424::new(MockReader::new(exchanges));
        for expected in 1..=3 {
            tag.send(0x60, &[], &[], CommMode::Plain).unwrap();
            assert_eq!(tag.cmd_counter, expected);
        }
    }

    #[test]
    fn test_plain_counter_wraps() {
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![0x90, 0x60, 0x00, 0x00, 0x00],
            vec![0x91, 0x00],
        )]));
        tag.cmd_counter = u16::MAX;
        tag.send(0x60, &[], &[], CommMode::Plain).unwrap();
        assert_eq!(tag.cmd_counter, 0);
    }

    #[test]
    fn test_counter_unchanged_on_transport_failure() {
        let mut tag = Ntag424::new(MockReader::failing());
        let err = tag.send(0x60, &[], &[], CommMode::Plain).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(tag.cmd_counter, 0);
    }

    #[test]
    fn test_mac_without_session_falls_back_to_plain() {
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![0x90, 0x64, 0x00, 0x00, 0x01, 0x00, 0x00],
            vec![0x00, 0x91, 0x00],
        )]));
        let resp = tag.send(0x64, &[0x00], &[], CommMode::Mac).unwrap();
        assert_eq!(resp.data, Some(vec![0x00]));
    }

    #[test]
    fn test_mac_round_trip_verifies_response() {
        let body = [0x01];
        let mut response = body.to_vec();
        response.extend_from_slice(&response_mac(0x00, 1, &body));
        response.extend_from_slice(&[0x91, 0x00]);

        let mut tag = Ntag424::new(MockReader::new(vec![(
            mac_frame(0x64, 0, &[0x00], &[]),
            response,
        )]));
        tag.session = Some(session());

        let resp = tag.send(0x64, &[0x00], &[], CommMode::Mac).unwrap();
        assert_eq!(resp.data, Some(vec![0x01]));
        assert_eq!(tag.cmd_counter, 1);
    }

    #[test]
    fn test_mac_response_tamper_detected() {
        let body = [0x01];
        for flipped in 0..9 {
            let mut response = body.to_vec();
            response.extend_from_slice(&response_mac(0x00, 1, &body));
            response[flipped] ^= 0x01;
            response.extend_from_slice(&[0x91, 0x00]);

            let mut tag = Ntag424::new(MockReader::new(vec![(
                mac_frame(0x64, 0, &[0x00], &[]),
                response,
            )]));
            tag.session = Some(session());

            let err = tag.send(0x64, &[0x00], &[], CommMode::Mac).unwrap_err();
            assert!(matches!(err, Error::ResponseMacMismatch));
        }
    }

    #[test]
    fn test_mac_error_status_skips_verification() {
        // Payload with a nonsense MAC; the error status must come back
        // untouched, counter still advanced.
        let mut tag = Ntag424::new(MockReader::new(vec![(
            mac_frame(0x64, 0, &[0x00], &[]),
            vec![0x91, 0xAE],
        )]));
        tag.session = Some(session());

        let resp = tag.send(0x64, &[0x00], &[], CommMode::Mac).unwrap();
        assert!(!resp.is_ok());
        assert_eq!(resp.data, None);
        assert_eq!(tag.cmd_counter, 1);
    }

    #[test]
    fn test_full_without_session_is_rejected() {
        let mut tag = Ntag424::new(MockReader::new(Vec::new()));
        let err = tag.send(0x5C, &[0x00], &[0x02], CommMode::Full).unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[test]
    fn test_full_with_empty_data_equals_mac_frame() {
        // GetCardUID carries no command data, so the request frame must be
        // byte-identical to the MAC-mode frame.
        let expected = mac_frame(0x51, 0, &[], &[]);

        let mut tag = Ntag424::new(MockReader::new(vec![(expected, vec![0x91, 0x00])]));
        tag.session = Some(session());
        let resp = tag.send(0x51, &[], &[], CommMode::Full).unwrap();
        assert_eq!(resp.data, None);
    }

    #[test]
    fn test_full_encrypts_command_and_decrypts_response() {
        let plaintext_out = hex!("00112233445566");
        let iv_cmd = {
            let mut input = [0u8; 16];
            input[0..2].copy_from_slice(&[0xA5, 0x5A]);
            input[2..6].copy_from_slice(&TI);
            // Counter is zero before the send.
            crypto::ecb_encrypt_block(&ENC_KEY, &input)
        };
        let ciphertext = crypto::cbc_encrypt(&ENC_KEY, &iv_cmd, &plaintext_out, true).unwrap();

        let plaintext_back = hex!("aabbccddee");
        let iv_resp = {
            let mut input = [0u8; 16];
            input[0..2].copy_from_slice(&[0x5A, 0xA5]);
            input[2..6].copy_from_slice(&TI);
            input[6..8].copy_from_slice(&1u16.to_le_bytes());
            crypto::ecb_encrypt_block(&ENC_KEY, &input)
        };
        let body = crypto::cbc_encrypt(&ENC_KEY, &iv_resp, &plaintext_back, true).unwrap();
        let mut response = body.clone();
        response.extend_from_slice(&response_mac(0x00, 1, &body));
        response.extend_from_slice(&[0x91, 0x00]);

        let mut tag = Ntag424::new(MockReader::new(vec![(
            mac_frame(0x8D, 0, &[0x02], &ciphertext),
            response,
        )]));
        tag.session = Some(session());

        let resp = tag
            .send(0x8D, &[0x02], &plaintext_out, CommMode::Full)
            .unwrap();
        assert_eq!(resp.data, Some(plaintext_back.to_vec()));
    }

    #[test]
    fn test_comm_mode_encoding() {
        assert_eq!(CommMode::Plain.bits(), 0b00);
        assert_eq!(CommMode::Mac.bits(), 0b01);
        assert_eq!(CommMode::Full.bits(), 0b11);
        for mode in [CommMode::Plain, CommMode::Mac, CommMode::Full] {
            assert_eq!(CommMode::from_bits(mode.bits()).unwrap(), mode);
        }
        assert!(matches!(
            CommMode::from_bits(0b10),
            Err(Error::UnsupportedCommMode { bits: 0b10 })
        ));
    }
}
