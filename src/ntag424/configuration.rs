//! SetConfiguration option groups, NT4H2421Gx data sheet section 10.3.

use {
    super::{Error, Result},
    crate::ensure_err,
};

/// Back-modulation strength of the RF interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackModulation {
    Standard,
    Strong,
}

/// Non-zero ceiling and decrement of the failed-authentication counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthFailLimit {
    pub limit: u16,
    pub decrement: u16,
}

/// One SetConfiguration update. Serialized as `(option, data)` and always
/// sent fully enciphered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigurationUpdate {
    /// PICC-level configuration. The random ID is one-way: it can only
    /// ever be switched on.
    Picc { use_random_id: bool },

    /// Secure Dynamic Messaging defaults.
    Sdm { disable_chained_write: bool },

    /// PD capability bytes, including the LRP secure-messaging opt-in.
    Capability {
        enable_lrp: bool,
        pd_cap2_5: u8,
        pd_cap2_6: u8,
    },

    /// Failed-authentication rate limiting. `None` disables the counter.
    AuthFailCounter { limit: Option<AuthFailLimit> },

    /// RF back-modulation tuning.
    Hardware { back_modulation: BackModulation },
}

impl ConfigurationUpdate {
    /// `(option byte, data)` for the SetConfiguration command.
    pub fn serialize(&self) -> Result<(u8, Vec<u8>)> {
        Ok(match *self {
            Self::Picc { use_random_id } => {
                ensure_err!(
                    use_random_id,
                    Error::IllegalConfig("the random ID cannot be switched off")
                );
                (0x00, vec![0x02])
            }

            Self::Sdm {
                disable_chained_write,
            } => (
                0x04,
                vec![0x00, if disable_chained_write { 0x04 } else { 0x00 }],
            ),

            Self::Capability {
                enable_lrp,
                pd_cap2_5,
                pd_cap2_6,
            } => {
                let mut data = vec![0u8; 10];
                data[4] = if enable_lrp { 0x02 } else { 0x00 };
                data[8] = pd_cap2_5;
                data[9] = pd_cap2_6;
                (0x05, data)
            }

            Self::AuthFailCounter { limit: Some(limit) } => {
                ensure_err!(
                    limit.limit > 0 && limit.decrement > 0,
                    Error::IllegalConfig("auth fail counter limit and decrement must be non-zero")
                );
                let mut data = vec![0x01];
                data.extend_from_slice(&limit.limit.to_le_bytes());
                data.extend_from_slice(&limit.decrement.to_le_bytes());
                (0x0A, data)
            }
            Self::AuthFailCounter { limit: None } => (0x0A, vec![0; 5]),

            Self::Hardware { back_modulation } => (
                0x0B,
                vec![(back_modulation == BackModulation::Strong) as u8],
            ),
        })
    }
}
