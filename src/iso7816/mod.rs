//! ISO/IEC 7816-4 command framing.

mod status_word;

pub use self::status_word::StatusWord;

/// Class byte of the NXP native command wrapping.
pub const NATIVE_CLA: u8 = 0x90;

/// A short-form command APDU.
///
/// `Lc` is always emitted as a single byte (the low byte of the data
/// length); the target reader class does not support extended length.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Apdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl Apdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// NXP native wrapping: `90 INS 00 00 Lc <header ‖ data ‖ mac> 00`.
    ///
    /// See AN12196 section 5.2. The secure-messaging layer, not this
    /// framer, computes and verifies the trailing MAC inside the payload.
    pub fn native(ins: u8, payload: Vec<u8>) -> Self {
        Self::new(NATIVE_CLA, ins, 0x00, 0x00).data(payload).le(0x00)
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Encode as `CLA INS P1 P2 [Lc data] [Le]`. Empty data elides the
    /// `Lc` field entirely.
    pub fn encode(&self) -> Vec<u8> {
        let mut apdu = vec![self.cla, self.ins, self.p1, self.p2];
        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            apdu.push(le);
        }
        apdu
    }
}

/// A response APDU split into its payload and trailing status word.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResponse {
    pub status: StatusWord,
    pub data: Option<Vec<u8>>,
}

impl CommandResponse {
    /// Split `… SW1 SW2`. Returns `None` for responses shorter than the
    /// status word.
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        let (data, status) = raw.split_at(raw.len().checked_sub(2)?);
        Some(Self {
            status: StatusWord::from([status[0], status[1]]),
            data: (!data.is_empty()).then(|| data.to_vec()),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
