//! HCI event decoding.
//!
//! Events arrive as `code | parameter length | parameters`. The fixed
//! records the bootloader returns are decoded from the return parameters
//! of a Command Complete event.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use super::command::CodecError;
use super::constants::*;

/// A raw HCI event split into code and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciEvent {
    pub code: u8,
    pub params: Vec<u8>,
}

impl HciEvent {
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        if raw.len() < HCI_EVENT_HDR_SIZE {
            return Err(CodecError::BufferTooSmall {
                expected: HCI_EVENT_HDR_SIZE,
                actual: raw.len(),
            });
        }
        let declared = raw[1] as usize;
        let params = raw
            .get(HCI_EVENT_HDR_SIZE..HCI_EVENT_HDR_SIZE + declared)
            .ok_or(CodecError::BufferTooSmall {
                expected: HCI_EVENT_HDR_SIZE + declared,
                actual: raw.len(),
            })?;
        Ok(Self {
            code: raw[0],
            params: params.to_vec(),
        })
    }

    /// Interpret this event as Command Complete for `opcode`.
    pub fn command_complete(&self, opcode: u16) -> Result<CommandComplete<'_>, CodecError> {
        if self.code != HCI_EV_CMD_COMPLETE {
            return Err(CodecError::UnexpectedEvent {
                expected: HCI_EV_CMD_COMPLETE,
                actual: self.code,
            });
        }
        if self.params.len() < 3 {
            return Err(CodecError::BufferTooSmall {
                expected: 3,
                actual: self.params.len(),
            });
        }
        let actual = u16::from_le_bytes([self.params[1], self.params[2]]);
        if actual != opcode {
            return Err(CodecError::UnexpectedOpcode {
                expected: opcode,
                actual,
            });
        }
        Ok(CommandComplete {
            num_cmds: self.params[0],
            opcode,
            return_params: &self.params[3..],
        })
    }
}

/// Command Complete event view.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    pub num_cmds: u8,
    pub opcode: u16,
    pub return_params: &'a [u8],
}

impl<'a> CommandComplete<'a> {
    /// Fail on a missing or non-zero status byte, returning the bytes after it.
    pub fn check_status(&self) -> Result<&'a [u8], CodecError> {
        match self.return_params.split_first() {
            Some((0, rest)) => Ok(rest),
            Some((&status, _)) => Err(CodecError::CommandStatus {
                opcode: self.opcode,
                status,
            }),
            None => Err(CodecError::BufferTooSmall {
                expected: 1,
                actual: 0,
            }),
        }
    }
}

/// Decode the ROM version from a Read ROM Version completion.
///
/// The return parameters are exactly `status | version`.
pub fn decode_rom_version(event: &HciEvent) -> Result<u8, CodecError> {
    let cc = event.command_complete(HCI_OP_RTL_READ_ROM_VERSION)?;
    if cc.return_params.len() != 2 {
        return Err(CodecError::ReturnLength {
            opcode: HCI_OP_RTL_READ_ROM_VERSION,
            expected: 2,
            actual: cc.return_params.len(),
        });
    }
    let rest = cc.check_status()?;
    Ok(rest[0])
}

/// Result of HCI Read Local Version Information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalVersion {
    pub hci_version: u8,
    pub hci_revision: u16,
    pub lmp_version: u8,
    pub manufacturer: u16,
    pub lmp_subversion: u16,
}

impl LocalVersion {
    pub const SIZE: usize = 8;

    pub fn decode(event: &HciEvent) -> Result<Self, CodecError> {
        let cc = event.command_complete(HCI_OP_READ_LOCAL_VERSION)?;
        let rest = cc.check_status()?;
        if rest.len() < Self::SIZE {
            return Err(CodecError::BufferTooSmall {
                expected: Self::SIZE,
                actual: rest.len(),
            });
        }
        let mut cursor = Cursor::new(rest);
        let read = |c: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            Ok(Self {
                hci_version: c.read_u8()?,
                hci_revision: c.read_u16::<LittleEndian>()?,
                lmp_version: c.read_u8()?,
                manufacturer: c.read_u16::<LittleEndian>()?,
                lmp_subversion: c.read_u16::<LittleEndian>()?,
            })
        };
        // Length was checked above; a short read cannot happen here.
        read(&mut cursor).map_err(|_| CodecError::BufferTooSmall {
            expected: Self::SIZE,
            actual: rest.len(),
        })
    }
}

/// Hardware/firmware identity reported by the vendor read-version command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChipVersionInfo {
    pub hw_platform: u8,
    pub hw_variant: u8,
    pub hw_revision: u8,
    pub fw_variant: u8,
    /// Major in the high nibble, minor in the low nibble.
    pub fw_revision: u8,
    pub fw_build_num: u8,
    pub fw_build_ww: u8,
    /// Years since 2000.
    pub fw_build_yy: u8,
    pub fw_patch_num: u8,
}

impl ChipVersionInfo {
    pub const SIZE: usize = 9;

    pub fn decode(event: &HciEvent) -> Result<Self, CodecError> {
        let cc = event.command_complete(HCI_OP_RTL_READ_VERSION)?;
        let rest = cc.check_status()?;
        let b: &[u8; Self::SIZE] = rest
            .get(..Self::SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(CodecError::BufferTooSmall {
                expected: Self::SIZE,
                actual: rest.len(),
            })?;
        Ok(Self {
            hw_platform: b[0],
            hw_variant: b[1],
            hw_revision: b[2],
            fw_variant: b[3],
            fw_revision: b[4],
            fw_build_num: b[5],
            fw_build_ww: b[6],
            fw_build_yy: b[7],
            fw_patch_num: b[8],
        })
    }

    pub fn fw_revision_major(&self) -> u8 {
        self.fw_revision >> 4
    }

    pub fn fw_revision_minor(&self) -> u8 {
        self.fw_revision & 0x0F
    }

    pub fn build_year(&self) -> u16 {
        2000 + self.fw_build_yy as u16
    }
}

impl fmt::Display for ChipVersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "revision {}.{} build {} week {} {}",
            self.fw_revision_major(),
            self.fw_revision_minor(),
            self.fw_build_num,
            self.fw_build_ww,
            self.build_year()
        )
    }
}

/// Bulk acknowledgement of one download fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResponse {
    pub status: u8,
}

impl DownloadResponse {
    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let event = HciEvent::parse(raw)?;
        let cc = event.command_complete(HCI_OP_RTL_DOWNLOAD_FW)?;
        let status = *cc
            .return_params
            .first()
            .ok_or(CodecError::BufferTooSmall {
                expected: 1,
                actual: 0,
            })?;
        Ok(Self { status })
    }
}

/// Vendor notification emitted by operational firmware after reboot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootNotification {
    pub num_cmds: u8,
    pub params: Vec<u8>,
}

impl BootNotification {
    pub fn decode(event: &HciEvent) -> Result<Self, CodecError> {
        if event.code != HCI_EV_VENDOR {
            return Err(CodecError::UnexpectedEvent {
                expected: HCI_EV_VENDOR,
                actual: event.code,
            });
        }
        let num_cmds = *event.params.first().ok_or(CodecError::BufferTooSmall {
            expected: 1,
            actual: 0,
        })?;
        Ok(Self {
            num_cmds,
            params: event.params[1..].to_vec(),
        })
    }

    pub fn is_bootup(&self) -> bool {
        self.num_cmds == BOOTUP_NUM_CMDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(opcode: u16, ret: &[u8]) -> Vec<u8> {
        let mut raw = vec![HCI_EV_CMD_COMPLETE, (3 + ret.len()) as u8, 0x01];
        raw.extend_from_slice(&opcode.to_le_bytes());
        raw.extend_from_slice(ret);
        raw
    }

    #[test]
    fn test_parse_rejects_short_event() {
        assert!(HciEvent::parse(&[0x0E]).is_err());
        // Declares 4 params, carries 2.
        assert!(HciEvent::parse(&[0x0E, 0x04, 0x01, 0x02]).is_err());
    }

    #[test]
    fn test_rom_version() {
        let event = HciEvent::parse(&complete(HCI_OP_RTL_READ_ROM_VERSION, &[0x00, 0x05])).unwrap();
        assert_eq!(decode_rom_version(&event).unwrap(), 0x05);

        let failed = HciEvent::parse(&complete(HCI_OP_RTL_READ_ROM_VERSION, &[0x01, 0x05])).unwrap();
        assert!(matches!(
            decode_rom_version(&failed),
            Err(CodecError::CommandStatus { status: 0x01, .. })
        ));

        let long = HciEvent::parse(&complete(HCI_OP_RTL_READ_ROM_VERSION, &[0, 5, 0])).unwrap();
        assert!(matches!(
            decode_rom_version(&long),
            Err(CodecError::ReturnLength { actual: 3, .. })
        ));
    }

    #[test]
    fn test_wrong_opcode() {
        let event = HciEvent::parse(&complete(HCI_OP_READ_LOCAL_VERSION, &[0x00, 0x05])).unwrap();
        assert!(matches!(
            decode_rom_version(&event),
            Err(CodecError::UnexpectedOpcode { .. })
        ));
    }

    #[test]
    fn test_local_version() {
        let ret = [0x00, 0x08, 0x0B, 0x00, 0x08, 0x5D, 0x00, 0x23, 0x87];
        let event = HciEvent::parse(&complete(HCI_OP_READ_LOCAL_VERSION, &ret)).unwrap();
        let v = LocalVersion::decode(&event).unwrap();
        assert_eq!(v.hci_version, 0x08);
        assert_eq!(v.hci_revision, 0x000B);
        assert_eq!(v.manufacturer, 0x005D);
        assert_eq!(v.lmp_subversion, 0x8723);
    }

    #[test]
    fn test_chip_version_info() {
        let ret = [0x00, 0x37, 0x11, 0x10, 0x23, 0x21, 0x05, 0x30, 0x14, 0x00];
        let event = HciEvent::parse(&complete(HCI_OP_RTL_READ_VERSION, &ret)).unwrap();
        let info = ChipVersionInfo::decode(&event).unwrap();
        assert_eq!(info.hw_platform, 0x37);
        assert_eq!(info.fw_revision_major(), 2);
        assert_eq!(info.fw_revision_minor(), 1);
        assert_eq!(info.build_year(), 2020);
        assert_eq!(info.to_string(), "revision 2.1 build 5 week 48 2020");
    }

    #[test]
    fn test_boot_notification() {
        let event = HciEvent::parse(&[0xFF, 0x03, 0x02, 0x00, 0x01]).unwrap();
        let note = BootNotification::decode(&event).unwrap();
        assert!(note.is_bootup());

        let other = HciEvent::parse(&[0xFF, 0x01, 0x06]).unwrap();
        assert!(!BootNotification::decode(&other).unwrap().is_bootup());
    }

    #[test]
    fn test_download_response() {
        let resp = DownloadResponse::decode(&complete(HCI_OP_RTL_DOWNLOAD_FW, &[0x00, 0x03])).unwrap();
        assert_eq!(resp.status, 0);

        let rejected = DownloadResponse::decode(&complete(HCI_OP_RTL_DOWNLOAD_FW, &[0x1F])).unwrap();
        assert_eq!(rejected.status, 0x1F);
        assert!(DownloadResponse::decode(&complete(HCI_OP_RTL_DOWNLOAD_FW, &[])).is_err());
    }
}
