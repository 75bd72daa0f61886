//! ISO-level file access: select, read and write of the standard files.

use {
    super::{Error, Ntag424, Result},
    crate::{ensure_err, iso7816::Apdu},
};

/// ISO SelectFile modes (P1), ISO/IEC 7816-4 table 63.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SelectMode {
    MfDfEf = 0b000,
    ChildDf = 0b001,
    EfUnderCurrentDf = 0b010,
    ParentDf = 0b011,
    ByDfName = 0b100,
    FromMf = 0b1000,
    FromCurrentDf = 0b1001,
}

/// The three standard data files personalized on every NTAG 424 DNA.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StandardFile {
    CapabilityContainer,
    Ndef,
    Proprietary,
}

impl StandardFile {
    /// 2-byte ISO elementary-file identifier.
    pub fn iso_id(self) -> [u8; 2] {
        match self {
            Self::CapabilityContainer => [0xE1, 0x03],
            Self::Ndef => [0xE1, 0x04],
            Self::Proprietary => [0xE1, 0x05],
        }
    }

    /// File number used by the native command set.
    pub fn file_number(self) -> u8 {
        match self {
            Self::CapabilityContainer => 1,
            Self::Ndef => 2,
            Self::Proprietary => 3,
        }
    }
}

impl Ntag424 {
    /// Card UID via the PC/SC pseudo-APDU `FF CA 00 00 00`.
    ///
    /// This one is answered by the reader, not the card; it works on the
    /// validated ACR122x reader class but is not an ISO card command.
    pub fn get_uid(&mut self) -> Result<Vec<u8>> {
        let resp = self.send_iso(&Apdu::new(0xFF, 0xCA, 0x00, 0x00).le(0x00))?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        resp.data.ok_or(Error::MalformedResponse)
    }

    /// ISO SelectFile with `P2 = 0x0C` (no response data requested).
    ///
    /// See ISO/IEC 7816-4 section 11.2.2.
    pub fn select_file(&mut self, file_id: &[u8], mode: SelectMode) -> Result<()> {
        ensure_err!(
            file_id.len() <= 16,
            Error::DataTooLong {
                field: "file_id",
                len: file_id.len(),
                max: 16
            }
        );
        let resp = self.send_iso(&Apdu::new(0x00, 0xA4, mode as u8, 0x0C).data(file_id.to_vec()))?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }

    /// Select the NDEF file and read it from offset zero in one go.
    pub fn read_standard_file(&mut self) -> Result<Vec<u8>> {
        self.select_file(&StandardFile::Ndef.iso_id(), SelectMode::EfUnderCurrentDf)?;
        let resp = self.send_iso(&Apdu::new(0x00, 0xB0, 0x00, 0x00).le(0x00))?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(resp.data.unwrap_or_default())
    }

    /// Select the NDEF file and overwrite it from offset zero.
    pub fn write_standard_file(&mut self, contents: &[u8]) -> Result<()> {
        ensure_err!(
            contents.len() <= 255,
            Error::DataTooLong {
                field: "contents",
                len: contents.len(),
                max: 255
            }
        );
        self.select_file(&StandardFile::Ndef.iso_id(), SelectMode::EfUnderCurrentDf)?;
        let resp = self.send_iso(&Apdu::new(0x00, 0xD6, 0x00, 0x00).data(contents.to_vec()))?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }
}
