//! Native command surface of the NT4H2421Gx.

use {
    super::{
        file_settings::{FileSettings, GetFileSettings, TagParams},
        CommMode, ConfigurationUpdate, Error, Ntag424, Result,
    },
    crate::{crypto, ensure_err, utils::u24_to_le},
};

const GET_CARD_UID: u8 = 0x51;
const SET_CONFIGURATION: u8 = 0x5C;
const CHANGE_FILE_SETTINGS: u8 = 0x5F;
const GET_KEY_VERSION: u8 = 0x64;
const WRITE_DATA: u8 = 0x8D;
const CHANGE_KEY: u8 = 0xC4;
const GET_FILE_SETTINGS: u8 = 0xF5;
const GET_FILE_COUNTERS: u8 = 0xF6;

impl Ntag424 {
    /// The 7-byte card UID, readable under encryption even with the
    /// random ID active. The card itself enforces prior authentication.
    pub fn get_card_uid(&mut self, mode: CommMode) -> Result<[u8; 7]> {
        let resp = self.send(GET_CARD_UID, &[], &[], mode)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        let data = resp.data.ok_or(Error::MalformedResponse)?;
        data.as_slice()
            .try_into()
            .map_err(|_| Error::ResponseLength {
                command: "GetCardUID",
                len: data.len(),
                expected: 7,
            })
    }

    /// Version byte of an application key.
    pub fn get_key_version(&mut self, key_number: u8) -> Result<u8> {
        ensure_err!(key_number <= 4, Error::InvalidKeyNumber { value: key_number });
        let resp = self.send(GET_KEY_VERSION, &[key_number], &[], CommMode::Mac)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        match resp.data.as_deref() {
            Some([version]) => Ok(*version),
            other => Err(Error::ResponseLength {
                command: "GetKeyVersion",
                len: other.map_or(0, <[u8]>::len),
                expected: 1,
            }),
        }
    }

    /// The SDM read counter of a file. The reply carries two RFU bytes
    /// after the 24-bit counter which must be zero.
    pub fn get_file_counters(&mut self, file_number: u8) -> Result<u32> {
        ensure_err!(
            file_number <= 31,
            Error::InvalidFileNumber {
                value: file_number,
                max: 31
            }
        );
        let resp = self.send(GET_FILE_COUNTERS, &[file_number], &[], CommMode::Full)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        let data = resp.data.ok_or(Error::MalformedResponse)?;
        ensure_err!(
            data.len() == 5,
            Error::ResponseLength {
                command: "GetFileCounters",
                len: data.len(),
                expected: 5,
            }
        );
        ensure_err!(data[3] == 0 && data[4] == 0, Error::RfuNonZero);
        Ok(crate::utils::u24_from_le([data[0], data[1], data[2]]))
    }

    /// Write `data` into a file at `offset`.
    pub fn write_data(
        &mut self,
        mode: CommMode,
        file_number: u8,
        data: &[u8],
        offset: u32,
    ) -> Result<()> {
        ensure_err!(
            file_number <= 31,
            Error::InvalidFileNumber {
                value: file_number,
                max: 31
            }
        );
        let mut header = vec![file_number];
        header.extend_from_slice(&u24_to_le(offset).ok_or(Error::ValueTooLarge {
            field: "offset",
            value: offset,
        })?);
        let length = data.len() as u32;
        header.extend_from_slice(&u24_to_le(length).ok_or(Error::ValueTooLarge {
            field: "length",
            value: length,
        })?);
        let resp = self.send(WRITE_DATA, &header, data, mode)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }

    /// Replace `key_number` with `new_key`.
    ///
    /// Keys other than the authentication master key prove knowledge of
    /// the old key via XOR and carry a JAMCRC over the new key.
    pub fn change_key(
        &mut self,
        key_number: u8,
        old_key: &[u8; 16],
        new_key: &[u8; 16],
        new_key_version: u8,
    ) -> Result<()> {
        ensure_err!(key_number <= 4, Error::InvalidKeyNumber { value: key_number });
        let mut data = if key_number == 0 {
            new_key.to_vec()
        } else {
            crypto::xor(old_key, new_key)?
        };
        data.push(new_key_version);
        if key_number != 0 {
            data.extend_from_slice(&crypto::crc32jam(new_key).to_le_bytes());
        }
        let resp = self.send(CHANGE_KEY, &[key_number], &data, CommMode::Full)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }

    /// Apply one SetConfiguration option group.
    pub fn set_configuration(&mut self, update: &ConfigurationUpdate) -> Result<()> {
        let (option, data) = update.serialize()?;
        let resp = self.send(SET_CONFIGURATION, &[option], &data, CommMode::Full)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }

    /// Raw GetFileSettings response bytes.
    ///
    /// Requested in MAC mode; before authentication the dispatcher sends
    /// it plain.
    pub fn get_file_settings_raw(&mut self, file_number: u8) -> Result<Vec<u8>> {
        ensure_err!(
            file_number <= 15,
            Error::InvalidFileNumber {
                value: file_number,
                max: 15
            }
        );
        let resp = self.send(GET_FILE_SETTINGS, &[file_number], &[], CommMode::Mac)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        resp.data.ok_or(Error::MalformedResponse)
    }

    /// Decoded file settings of `file_number`.
    pub fn get_file_settings(&mut self, file_number: u8) -> Result<GetFileSettings> {
        GetFileSettings::parse(&self.get_file_settings_raw(file_number)?)
    }

    /// ChangeFileSettings with a pre-serialized payload. Fully enciphered
    /// when a session is installed, plain otherwise.
    pub fn set_file_settings_raw(&mut self, file_number: u8, payload: &[u8]) -> Result<()> {
        ensure_err!(
            file_number <= 15,
            Error::InvalidFileNumber {
                value: file_number,
                max: 15
            }
        );
        let mode = if self.is_authenticated() {
            CommMode::Full
        } else {
            CommMode::Plain
        };
        let resp = self.send(CHANGE_FILE_SETTINGS, &[file_number], payload, mode)?;
        ensure_err!(resp.is_ok(), Error::Card(resp.status));
        Ok(())
    }

    /// Validate and apply new file settings.
    pub fn set_file_settings(
        &mut self,
        file_number: u8,
        settings: &FileSettings,
        params: &TagParams,
    ) -> Result<()> {
        let payload = settings.serialize(params)?;
        self.set_file_settings_raw(file_number, &payload)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{super::testing::MockReader, *},
        crate::ntag424::Ntag424,
    };

    #[test]
    fn test_get_key_version_checks_payload_length() {
        // Unauthenticated: MAC mode degrades to plain.
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![0x90, 0x64, 0x00, 0x00, 0x01, 0x02, 0x00],
            vec![0x01, 0x02, 0x91, 0x00],
        )]));
        let err = tag.get_key_version(2).unwrap_err();
        assert!(matches!(
            err,
            Error::ResponseLength {
                command: "GetKeyVersion",
                len: 2,
                expected: 1,
            }
        ));
    }

    #[test]
    fn test_get_key_version_plain_round_trip() {
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![0x90, 0x64, 0x00, 0x00, 0x01, 0x00, 0x00],
            vec![0x01, 0x91, 0x00],
        )]));
        assert_eq!(tag.get_key_version(0).unwrap(), 0x01);
    }

    #[test]
    fn test_write_data_header_layout() {
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![
                0x90, 0x8D, 0x00, 0x00, 0x0A, 0x02, 0x10, 0x00, 0x00, 0x03, 0x00, 0x00, 0xAA,
                0xBB, 0xCC, 0x00,
            ],
            vec![0x91, 0x00],
        )]));
        tag.write_data(CommMode::Plain, 2, &[0xAA, 0xBB, 0xCC], 16)
            .unwrap();
    }

    #[test]
    fn test_change_key_rejects_bad_key_number() {
        let mut tag = Ntag424::new(MockReader::new(Vec::new()));
        assert!(matches!(
            tag.change_key(5, &[0; 16], &[1; 16], 0),
            Err(Error::InvalidKeyNumber { value: 5 })
        ));
    }

    #[test]
    fn test_file_number_bounds() {
        let mut tag = Ntag424::new(MockReader::new(Vec::new()));
        assert!(matches!(
            tag.get_file_settings_raw(16),
            Err(Error::InvalidFileNumber { value: 16, max: 15 })
        ));
        assert!(matches!(
            tag.get_file_counters(32),
            Err(Error::InvalidFileNumber { value: 32, max: 31 })
        ));
    }

    #[test]
    fn test_get_file_settings_parses_plain_response() {
        let mut response = vec![0x00, 0x00, 0xE0, 0xEE, 0x00, 0x01, 0x00];
        response.extend_from_slice(&[0x91, 0x00]);
        let mut tag = Ntag424::new(MockReader::new(vec![(
            vec![0x90, 0xF5, 0x00, 0x00, 0x01, 0x02, 0x00],
            response,
        )]));
        let settings = tag.get_file_settings(2).unwrap();
        assert_eq!(settings.file_size, 256);
        assert_eq!(settings.settings.access.change, 0);
    }
}
