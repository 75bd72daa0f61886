//! Test doubles: a scripted reader and a card-side simulation of the
//! authentication exchange.

use {
    crate::{crypto, reader::ReaderPort},
    anyhow::{anyhow, Result},
    std::collections::VecDeque,
};

/// Reader fed with `(expected frame, response)` pairs. Panics on any
/// deviation from the script.
pub(crate) struct MockReader {
    exchanges: VecDeque<(Vec<u8>, Vec<u8>)>,
    fail: bool,
}

impl MockReader {
    pub fn new(exchanges: Vec<(Vec<u8>, Vec<u8>)>) -> Box<Self> {
        Box::new(Self {
            exchanges: exchanges.into(),
            fail: false,
        })
    }

    /// A reader whose transmissions always time out.
    pub fn failing() -> Box<Self> {
        Box::new(Self {
            exchanges: VecDeque::new(),
            fail: true,
        })
    }
}

impl ReaderPort for MockReader {
    fn transmit(&mut self, frame: &[u8], _max_response_len: u8) -> Result<Vec<u8>> {
        if self.fail {
            return Err(anyhow!("transmit timeout"));
        }
        let (expected, response) = self
            .exchanges
            .pop_front()
            .expect("no exchange scripted for this frame");
        assert_eq!(hex::encode(frame), hex::encode(&expected));
        Ok(response)
    }
}

/// Executes the card side of AuthenticateEV2First with a fixed key, nonce
/// and transaction identifier, so the host state machine can be driven
/// end to end.
pub(crate) struct CardSim {
    pub key: [u8; 16],
    pub rnd_b: [u8; 16],
    pub ti: [u8; 4],
    /// When set, step 2 is answered with an authentication error.
    pub fail_step2: bool,
}

impl CardSim {
    pub fn new(key: [u8; 16]) -> Box<Self> {
        Box::new(Self {
            key,
            rnd_b: [0x42; 16],
            ti: [0xDE, 0xAD, 0xBE, 0xEF],
            fail_step2: false,
        })
    }
}

impl ReaderPort for CardSim {
    fn transmit(&mut self, frame: &[u8], _max_response_len: u8) -> Result<Vec<u8>> {
        assert_eq!(frame[0], 0x90, "not a native frame");
        match frame[1] {
            0x71 => {
                let mut resp =
                    crypto::cbc_encrypt(&self.key, &crypto::ZERO_IV, &self.rnd_b, false).unwrap();
                resp.extend_from_slice(&[0x91, 0xAF]);
                Ok(resp)
            }
            0xAF => {
                if self.fail_step2 {
                    return Ok(vec![0x91, 0xAE]);
                }
                let payload = &frame[5..frame.len() - 1];
                let plain =
                    crypto::cbc_decrypt(&self.key, &crypto::ZERO_IV, payload, false).unwrap();
                let rnd_a: [u8; 16] = plain[..16].try_into().unwrap();
                assert_eq!(plain[16..], crypto::rotate_left(&self.rnd_b));

                // TI ‖ RndA' ‖ PDcap2 ‖ PCDcap2
                let mut body = self.ti.to_vec();
                body.extend_from_slice(&crypto::rotate_left(&rnd_a));
                body.extend_from_slice(&[0; 12]);
                let mut resp =
                    crypto::cbc_encrypt(&self.key, &crypto::ZERO_IV, &body, false).unwrap();
                resp.extend_from_slice(&[0x91, 0x00]);
                Ok(resp)
            }
            _ => Ok(vec![0x91, 0x1C]),
        }
    }
}
