//! Protocol module - command and event records for the patch loader.

pub mod command;
pub mod constants;
pub mod event;

pub use command::{CodecError, HciCommand, ResetParams};
pub use constants::*;
pub use event::{
    BootNotification, ChipVersionInfo, CommandComplete, DownloadResponse, HciEvent, LocalVersion,
    decode_rom_version,
};
