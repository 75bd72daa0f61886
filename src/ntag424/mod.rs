//! NTAG 424 DNA tag session.

mod auth;
mod commands;
mod configuration;
mod file_settings;
mod files;
mod secure_messaging;
mod session;
#[cfg(test)]
mod testing;

pub use self::{
    configuration::{AuthFailLimit, BackModulation, ConfigurationUpdate},
    file_settings::{
        EncryptedFileData, FileAccessRights, FileSettings, GetFileSettings, SdmAccessRights,
        SdmEncoding, SdmOptions, TagParams, ACCESS_FREE, ACCESS_NONE,
    },
    files::{SelectMode, StandardFile},
    secure_messaging::CommMode,
};
use {
    self::session::Session,
    crate::{
        crypto,
        iso7816::{Apdu, CommandResponse, StatusWord},
        reader::ReaderPort,
    },
    thiserror::Error,
    tracing::trace,
};

/// Response length passed to the reader. The validated reader class caps
/// responses at 128 bytes and the engine never attempts a chained read.
const MAX_RESPONSE_LEN: u8 = 0x80;

/// A tag session over a connected reader.
///
/// All native card operations funnel through [`Ntag424::send`], which
/// frames the command for its communication mode while keeping the command
/// counter and transaction identifier consistent with the card.
pub struct Ntag424 {
    /// Reader connected to the tag.
    reader: Box<dyn ReaderPort>,

    /// Installed by a successful AuthenticateEV2First; replaced atomically
    /// on re-authentication, untouched by command failures.
    session: Option<Session>,

    /// 16-bit command counter, little-endian on the wire. Advances once
    /// per issued native command, wraps modulo 2^16, resets to zero on
    /// authentication.
    cmd_counter: u16,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reader transport failed: {0}")]
    Transport(anyhow::Error),

    #[error("response shorter than a status word")]
    MalformedResponse,

    #[error("{command} returned {len} bytes, expected {expected}")]
    ResponseLength {
        command: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("card returned error status {0}")]
    Card(StatusWord),

    #[error("card failed the RndA round trip")]
    AuthMismatch,

    #[error("response MAC verification failed")]
    ResponseMacMismatch,

    #[error("command requires an authenticated session")]
    NotAuthenticated,

    #[error(transparent)]
    Crypto(#[from] crypto::Error),

    #[error("key number {value} is outside 0..=4")]
    InvalidKeyNumber { value: u8 },

    #[error("file number {value} is outside 0..={max}")]
    InvalidFileNumber { value: u8, max: u8 },

    #[error("{field} is {len} bytes, at most {max} allowed")]
    DataTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} value {value} does not fit 24 bits")]
    ValueTooLarge { field: &'static str, value: u32 },

    #[error("{field} access right {value:#x} is not a key number, 0xE or 0xF")]
    InvalidAccessRight { field: &'static str, value: u8 },

    #[error("unsupported communication mode encoding {bits:#04b}")]
    UnsupportedCommMode { bits: u8 },

    #[error("unsupported file type {value:#04x}")]
    UnsupportedFileType { value: u8 },

    #[error("SDM encoding mode is not ASCII")]
    UnsupportedEncoding,

    #[error("reserved bits set in {field} ({value:#010b})")]
    ReservedBits { field: &'static str, value: u8 },

    #[error("piccDataOffset is required when sdmMetaRead is a key number")]
    PiccOffsetRequired,

    #[error("piccDataOffset must be absent when sdmMetaRead denies access")]
    PiccOffsetForbidden,

    #[error("{field} is required when sdmFileRead grants access")]
    MissingSdmField { field: &'static str },

    #[error("{field} is {value}, allowed range is {min}..{max}")]
    OffsetOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("encryptedFileData length {length} is not a multiple of 32")]
    EncryptedLengthUnaligned { length: u32 },

    #[error("file settings end before {field}")]
    SettingsTruncated { field: &'static str },

    #[error("{len} unparsed bytes at the end of the file settings")]
    TrailingBytes { len: usize },

    #[error("illegal configuration: {0}")]
    IllegalConfig(&'static str),

    #[error("reserved counter bytes are non-zero")]
    RfuNonZero,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Ntag424 {
    pub fn new(reader: Box<dyn ReaderPort>) -> Self {
        Self {
            reader,
            session: None,
            cmd_counter: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Transmit a raw ISO frame outside the secure channel. Does not touch
    /// the command counter.
    pub fn send_iso(&mut self, apdu: &Apdu) -> Result<CommandResponse> {
        let frame = apdu.encode();
        trace!(tx = %hex::encode(&frame), "iso apdu");
        let raw = self
            .reader
            .transmit(&frame, MAX_RESPONSE_LEN)
            .map_err(Error::Transport)?;
        trace!(rx = %hex::encode(&raw), "iso response");
        CommandResponse::from_raw(&raw).ok_or(Error::MalformedResponse)
    }

    /// Wrap a native command payload, transmit it and advance the command
    /// counter. The counter moves iff the card produced a response frame,
    /// so a failed transmission retries with identical wire bytes.
    fn send_native(&mut self, command: u8, payload: Vec<u8>) -> Result<CommandResponse> {
        let frame = Apdu::native(command, payload).encode();
        trace!(tx = %hex::encode(&frame), "native apdu");
        let raw = self
            .reader
            .transmit(&frame, MAX_RESPONSE_LEN)
            .map_err(Error::Transport)?;
        trace!(rx = %hex::encode(&raw), "native response");
        let resp = CommandResponse::from_raw(&raw).ok_or(Error::MalformedResponse)?;
        self.cmd_counter = self.cmd_counter.wrapping_add(1);
        Ok(resp)
    }
}
