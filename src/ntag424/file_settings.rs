//! File-settings structures of GetFileSettings and ChangeFileSettings.
//!
//! The wire form is a flag-driven, length-varying structure; every
//! cross-field rule is checked before a single byte is emitted, and a
//! parsed buffer must be consumed exactly. See NT4H2421Gx data sheet
//! sections 9.2.7 and 10.7.

use {
    super::{CommMode, Error, Result},
    crate::{
        ensure_err,
        utils::{u24_from_le, u24_to_le},
    },
};

/// Free access, encoded as `0xE` in an access-rights nibble.
pub const ACCESS_FREE: u8 = 0xE;
/// No access, encoded as `0xF`.
pub const ACCESS_NONE: u8 = 0xF;

const FILE_OPTION_SDM: u8 = 0b0100_0000;
const FILE_OPTION_RFU: u8 = 0b0011_1100;

const SDM_FLAG_UID: u8 = 0b1000_0000;
const SDM_FLAG_READ_COUNTER: u8 = 0b0100_0000;
const SDM_FLAG_READ_COUNTER_LIMIT: u8 = 0b0010_0000;
const SDM_FLAG_ENCRYPTED_FILE_DATA: u8 = 0b0001_0000;
const SDM_FLAG_RFU: u8 = 0b0000_1110;
const SDM_FLAG_ASCII: u8 = 0b0000_0001;

/// Per-operation access conditions of a data file. Each nibble is a key
/// number `0..=4`, [`ACCESS_FREE`] or [`ACCESS_NONE`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileAccessRights {
    pub read: u8,
    pub write: u8,
    pub read_write: u8,
    pub change: u8,
}

impl FileAccessRights {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("read", self.read),
            ("write", self.write),
            ("readWrite", self.read_write),
            ("change", self.change),
        ] {
            ensure_err!(
                matches!(value, 0..=4 | ACCESS_FREE | ACCESS_NONE),
                Error::InvalidAccessRight { field, value }
            );
        }
        Ok(())
    }
}

/// SDM access conditions. `file_read` is a key number or [`ACCESS_NONE`];
/// free access does not exist for it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SdmAccessRights {
    pub meta_read: u8,
    pub file_read: u8,
    pub counter_retrieval: u8,
}

impl SdmAccessRights {
    fn validate(&self) -> Result<()> {
        ensure_err!(
            matches!(self.meta_read, 0..=4 | ACCESS_FREE | ACCESS_NONE),
            Error::InvalidAccessRight {
                field: "sdmMetaRead",
                value: self.meta_read
            }
        );
        ensure_err!(
            matches!(self.file_read, 0..=4 | ACCESS_NONE),
            Error::InvalidAccessRight {
                field: "sdmFileRead",
                value: self.file_read
            }
        );
        ensure_err!(
            matches!(self.counter_retrieval, 0..=4 | ACCESS_FREE | ACCESS_NONE),
            Error::InvalidAccessRight {
                field: "sdmCtrRet",
                value: self.counter_retrieval
            }
        );
        Ok(())
    }
}

/// SDM data encoding. Only ASCII exists on this IC.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SdmEncoding {
    #[default]
    Ascii,
}

/// Slice of the file mirrored in encrypted form.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EncryptedFileData {
    pub offset: u32,
    pub length: u32,
}

/// Secure Dynamic Messaging mirroring configuration.
///
/// Which offsets may or must be present depends on the access rights; the
/// rules are enforced by [`FileSettings::serialize`] and mirrored on
/// parse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SdmOptions {
    pub access: SdmAccessRights,
    pub encoding: SdmEncoding,
    pub uid_offset: Option<u32>,
    pub read_counter_offset: Option<u32>,
    pub picc_data_offset: Option<u32>,
    pub mac_input_offset: Option<u32>,
    pub mac_offset: Option<u32>,
    pub encrypted_file_data: Option<EncryptedFileData>,
    pub read_counter_limit: Option<u32>,
}

impl SdmOptions {
    /// Options with the given access rights and no mirroring fields.
    pub fn new(access: SdmAccessRights) -> Self {
        Self {
            access,
            encoding: SdmEncoding::Ascii,
            uid_offset: None,
            read_counter_offset: None,
            picc_data_offset: None,
            mac_input_offset: None,
            mac_offset: None,
            encrypted_file_data: None,
            read_counter_limit: None,
        }
    }
}

/// Mutable subset of a file's settings, the payload of
/// ChangeFileSettings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileSettings {
    pub comm_mode: CommMode,
    pub access: FileAccessRights,
    pub sdm_options: Option<SdmOptions>,
}

/// A GetFileSettings response: the settings plus the fixed file header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GetFileSettings {
    /// Always zero (standard data file).
    pub file_type: u8,
    pub file_size: u32,
    pub settings: FileSettings,
}

/// Physical parameters of the standard data file, needed to range-check
/// SDM offsets against the file they point into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagParams {
    pub file_size: u32,
    pub encoded_uid_length: u32,
    pub encoded_read_counter_length: u32,
    pub picc_data_length: u32,
}

impl FileSettings {
    /// Serialize for ChangeFileSettings. Every cross-field and range rule
    /// is validated before any byte is emitted.
    pub fn serialize(&self, params: &TagParams) -> Result<Vec<u8>> {
        self.access.validate()?;
        if let Some(sdm) = &self.sdm_options {
            sdm.validate(params)?;
        }

        let mut out = Vec::new();
        let mut file_option = self.comm_mode.bits();
        if self.sdm_options.is_some() {
            file_option |= FILE_OPTION_SDM;
        }
        out.push(file_option);
        out.push((self.access.read_write << 4) | self.access.change);
        out.push((self.access.read << 4) | self.access.write);
        if let Some(sdm) = &self.sdm_options {
            sdm.serialize_into(&mut out);
        }
        Ok(out)
    }
}

impl SdmOptions {
    fn validate(&self, params: &TagParams) -> Result<()> {
        self.access.validate()?;

        match self.access.meta_read {
            0..=4 => ensure_err!(self.picc_data_offset.is_some(), Error::PiccOffsetRequired),
            ACCESS_NONE => {
                ensure_err!(self.picc_data_offset.is_none(), Error::PiccOffsetForbidden)
            }
            _ => {}
        }
        if self.access.file_read != ACCESS_NONE {
            ensure_err!(
                self.mac_input_offset.is_some(),
                Error::MissingSdmField {
                    field: "macInputOffset"
                }
            );
            ensure_err!(
                self.mac_offset.is_some(),
                Error::MissingSdmField { field: "macOffset" }
            );
        }

        // Everything emitted is a 3-byte little-endian field.
        for (field, value) in [
            ("uidOffset", self.uid_offset),
            ("readCounterOffset", self.read_counter_offset),
            ("piccDataOffset", self.picc_data_offset),
            ("macInputOffset", self.mac_input_offset),
            ("macOffset", self.mac_offset),
            ("encryptedFileData.offset", self.encrypted_file_data.map(|e| e.offset)),
            ("encryptedFileData.length", self.encrypted_file_data.map(|e| e.length)),
            ("readCounterLimit", self.read_counter_limit),
        ] {
            if let Some(value) = value {
                ensure_err!(
                    value <= 0x00FF_FFFF,
                    Error::ValueTooLarge { field, value }
                );
            }
        }

        if let Some(uid_offset) = self.uid_offset {
            check_range(
                "uidOffset",
                uid_offset,
                0,
                params.file_size.saturating_sub(params.encoded_uid_length),
            )?;
        }
        if let Some(counter_offset) = self.read_counter_offset {
            check_range(
                "readCounterOffset",
                counter_offset,
                0,
                params
                    .file_size
                    .saturating_sub(params.encoded_read_counter_length),
            )?;
        }
        if let Some(picc_offset) = self.picc_data_offset {
            check_range(
                "piccDataOffset",
                picc_offset,
                0,
                params.file_size.saturating_sub(params.picc_data_length),
            )?;
        }

        if let (Some(mac_input), Some(mac)) = (self.mac_input_offset, self.mac_offset) {
            // The MAC input window must start no later than the MAC
            // itself.
            check_range("macInputOffset", mac_input, 0, mac.saturating_add(1))?;
            if let Some(enc) = self.encrypted_file_data {
                check_range(
                    "encryptedFileData.offset",
                    enc.offset,
                    mac_input,
                    mac.saturating_sub(32),
                )?;
                check_range(
                    "encryptedFileData.length",
                    enc.length,
                    32,
                    mac.saturating_sub(enc.offset),
                )?;
                ensure_err!(
                    enc.length % 32 == 0,
                    Error::EncryptedLengthUnaligned { length: enc.length }
                );
                // Strict lower bound: the MAC starts after the encrypted
                // block ends.
                check_range(
                    "macOffset",
                    mac,
                    enc.offset.saturating_add(enc.length).saturating_add(1),
                    params.file_size.saturating_sub(16),
                )?;
            } else {
                check_range(
                    "macOffset",
                    mac,
                    mac_input,
                    params.file_size.saturating_sub(16),
                )?;
            }
        }

        Ok(())
    }

    /// Wire encoding. `validate` must have passed; this only emits.
    fn serialize_into(&self, out: &mut Vec<u8>) {
        let mut flags = SDM_FLAG_ASCII;
        if self.uid_offset.is_some() {
            flags |= SDM_FLAG_UID;
        }
        if self.read_counter_offset.is_some() {
            flags |= SDM_FLAG_READ_COUNTER;
        }
        if self.read_counter_limit.is_some() {
            flags |= SDM_FLAG_READ_COUNTER_LIMIT;
        }
        if self.encrypted_file_data.is_some() {
            flags |= SDM_FLAG_ENCRYPTED_FILE_DATA;
        }
        out.push(flags);
        out.push(0xF0 | self.access.counter_retrieval);
        out.push((self.access.meta_read << 4) | self.access.file_read);

        // The variable tail, in wire order.
        if self.access.meta_read == ACCESS_FREE {
            if let Some(offset) = self.uid_offset {
                push_u24(out, offset);
            }
            if let Some(offset) = self.read_counter_offset {
                push_u24(out, offset);
            }
        }
        if matches!(self.access.meta_read, 0..=4) {
            if let Some(offset) = self.picc_data_offset {
                push_u24(out, offset);
            }
        }
        if self.access.file_read != ACCESS_NONE {
            if let Some(offset) = self.mac_input_offset {
                push_u24(out, offset);
            }
            if let Some(enc) = self.encrypted_file_data {
                push_u24(out, enc.offset);
                push_u24(out, enc.length);
            }
            if let Some(offset) = self.mac_offset {
                push_u24(out, offset);
            }
        }
        if let Some(limit) = self.read_counter_limit {
            push_u24(out, limit);
        }
    }

    fn parse(cur: &mut Cursor) -> Result<Self> {
        let flags = cur.u8("sdmOptions")?;
        ensure_err!(flags & SDM_FLAG_ASCII != 0, Error::UnsupportedEncoding);
        ensure_err!(
            flags & SDM_FLAG_RFU == 0,
            Error::ReservedBits {
                field: "sdmOptions",
                value: flags
            }
        );

        let low = cur.u8("sdmAccessRights")?;
        ensure_err!(
            low & 0xF0 == 0xF0,
            Error::ReservedBits {
                field: "sdmAccessRights",
                value: low
            }
        );
        let high = cur.u8("sdmAccessRights")?;
        let access = SdmAccessRights {
            counter_retrieval: low & 0x0F,
            meta_read: high >> 4,
            file_read: high & 0x0F,
        };
        access.validate()?;

        // Tail presence mirrors the serializer: flag bits gated by the
        // access rights.
        let mut options = Self::new(access);
        if access.meta_read == ACCESS_FREE {
            if flags & SDM_FLAG_UID != 0 {
                options.uid_offset = Some(cur.u24("uidOffset")?);
            }
            if flags & SDM_FLAG_READ_COUNTER != 0 {
                options.read_counter_offset = Some(cur.u24("readCounterOffset")?);
            }
        }
        if matches!(access.meta_read, 0..=4) {
            options.picc_data_offset = Some(cur.u24("piccDataOffset")?);
        }
        if access.file_read != ACCESS_NONE {
            options.mac_input_offset = Some(cur.u24("macInputOffset")?);
            if flags & SDM_FLAG_ENCRYPTED_FILE_DATA != 0 {
                options.encrypted_file_data = Some(EncryptedFileData {
                    offset: cur.u24("encryptedFileData.offset")?,
                    length: cur.u24("encryptedFileData.length")?,
                });
            }
            options.mac_offset = Some(cur.u24("macOffset")?);
        }
        if flags & SDM_FLAG_READ_COUNTER_LIMIT != 0 {
            options.read_counter_limit = Some(cur.u24("readCounterLimit")?);
        }
        Ok(options)
    }
}

impl GetFileSettings {
    /// Decode a GetFileSettings response. The whole buffer must be
    /// consumed.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);

        let file_type = cur.u8("fileType")?;
        ensure_err!(
            file_type == 0,
            Error::UnsupportedFileType { value: file_type }
        );
        let file_option = cur.u8("fileOption")?;
        ensure_err!(
            file_option & FILE_OPTION_RFU == 0,
            Error::ReservedBits {
                field: "fileOption",
                value: file_option
            }
        );
        let comm_mode = CommMode::from_bits(file_option & 0b11)?;

        let part1 = cur.u8("accessRights")?;
        let part2 = cur.u8("accessRights")?;
        let access = FileAccessRights {
            read_write: part1 >> 4,
            change: part1 & 0x0F,
            read: part2 >> 4,
            write: part2 & 0x0F,
        };
        access.validate()?;
        let file_size = cur.u24("fileSize")?;

        let sdm_options = if file_option & FILE_OPTION_SDM != 0 {
            Some(SdmOptions::parse(&mut cur)?)
        } else {
            None
        };

        ensure_err!(
            cur.remaining() == 0,
            Error::TrailingBytes {
                len: cur.remaining()
            }
        );
        Ok(Self {
            file_type,
            file_size,
            settings: FileSettings {
                comm_mode,
                access,
                sdm_options,
            },
        })
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    ensure_err!(
        value >= min && value < max,
        Error::OffsetOutOfRange {
            field,
            value,
            min,
            max
        }
    );
    Ok(())
}

fn push_u24(out: &mut Vec<u8>, value: u32) {
    // Every emitted field was checked to fit 24 bits during validation.
    out.extend_from_slice(&u24_to_le(value).unwrap());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(Error::SettingsTruncated { field })?;
        self.pos += 1;
        Ok(byte)
    }

    fn u24(&mut self, field: &'static str) -> Result<u32> {
        let end = self.pos + 3;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(Error::SettingsTruncated { field })?;
        self.pos = end;
        Ok(u24_from_le([bytes[0], bytes[1], bytes[2]]))
    }
}
