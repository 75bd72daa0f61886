//! Reader transport contract.

use anyhow::Result;

/// A connected ISO/IEC 7816 T=1 endpoint, typically a PC/SC card handle
/// with an NTAG 424 DNA in the field.
///
/// The session engine owns the port for the lifetime of the tag session
/// and issues one command at a time.
pub trait ReaderPort {
    /// Deliver `frame` as a single APDU and return the complete response,
    /// including the trailing status word.
    ///
    /// `max_response_len` is advisory; the engine always passes `0x80` to
    /// match the validated reader class.
    fn transmit(&mut self, frame: &[u8], max_response_len: u8) -> Result<Vec<u8>>;
}
