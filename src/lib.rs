//! Host-side session engine for the NXP NTAG 424 DNA (NT4H2421Gx).
//!
//! The [`ntag424::Ntag424`] session drives a connected ISO/IEC 7816-4 reader
//! through mutual authentication (`AuthenticateEV2First`), exchanges native
//! commands under the three communication modes (plain, CMAC-protected,
//! fully enciphered) and decodes the card's file-settings and configuration
//! structures. The [`sdm`] module validates Secure Dynamic Messaging data
//! offline, without a card present.
//!
//! The reader itself is not part of this crate: callers supply any
//! [`reader::ReaderPort`], typically a thin wrapper around a PC/SC card
//! handle.

mod utils;

pub mod crypto;
pub mod iso7816;
pub mod ntag424;
pub mod reader;
pub mod sdm;

pub use self::{
    ntag424::{CommMode, Error, Ntag424, Result},
    reader::ReaderPort,
};
