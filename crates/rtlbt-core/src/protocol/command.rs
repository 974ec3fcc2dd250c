//! HCI command encoding.
//!
//! Every request sent to the bootloader shares one layout:
//! `opcode (u16 LE) | parameter length (u8) | parameters`.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {len} bytes, maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Unexpected event: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedEvent { expected: u8, actual: u8 },
    #[error("Unexpected opcode: expected 0x{expected:04X}, got 0x{actual:04X}")]
    UnexpectedOpcode { expected: u16, actual: u16 },
    #[error("Command 0x{opcode:04X} failed with status 0x{status:02X}")]
    CommandStatus { opcode: u16, status: u8 },
    #[error("Unexpected return length for 0x{opcode:04X}: expected {expected}, got {actual}")]
    ReturnLength {
        opcode: u16,
        expected: usize,
        actual: usize,
    },
}

/// Parameters of the vendor reset command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetParams {
    pub reset_type: u8,
    pub patch_enable: u8,
    pub ddc_reload: u8,
    pub boot_option: u8,
    pub boot_param: u32,
}

impl ResetParams {
    pub const SIZE: usize = 8;

    /// Soft reset that boots the downloaded patch at `boot_addr`.
    pub fn boot(boot_addr: u32) -> Self {
        Self {
            reset_type: RESET_TYPE_SOFT,
            patch_enable: 0x01,
            ddc_reload: 0x00,
            boot_option: 0x01,
            boot_param: boot_addr,
        }
    }

    /// Reset that forces the controller back into its ROM bootloader.
    pub fn to_bootloader() -> Self {
        Self {
            reset_type: RESET_TYPE_BOOTLOADER,
            patch_enable: 0x01,
            ddc_reload: 0x01,
            boot_option: 0x00,
            boot_param: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.reset_type;
        buf[1] = self.patch_enable;
        buf[2] = self.ddc_reload;
        buf[3] = self.boot_option;
        LittleEndian::write_u32(&mut buf[4..8], self.boot_param);
        buf
    }
}

/// An encoded-on-demand HCI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciCommand {
    opcode: u16,
    payload: Vec<u8>,
}

impl HciCommand {
    /// Build a command, refusing payloads that would not fit the command buffer.
    pub fn new(opcode: u16, payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() > MAX_COMMAND_PAYLOAD {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_COMMAND_PAYLOAD,
            });
        }
        Ok(Self {
            opcode,
            payload: payload.to_vec(),
        })
    }

    fn bare(opcode: u16) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    pub fn read_local_version() -> Self {
        Self::bare(HCI_OP_READ_LOCAL_VERSION)
    }

    pub fn read_rom_version() -> Self {
        Self::bare(HCI_OP_RTL_READ_ROM_VERSION)
    }

    pub fn read_version() -> Self {
        Self::bare(HCI_OP_RTL_READ_VERSION)
    }

    pub fn reset(params: &ResetParams) -> Self {
        Self {
            opcode: HCI_OP_RTL_RESET,
            payload: params.to_bytes().to_vec(),
        }
    }

    /// Download command: index byte followed by up to [`RTL_FRAG_LEN`] patch bytes.
    pub fn download_fragment(index: u8, data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > RTL_FRAG_LEN {
            return Err(CodecError::PayloadTooLarge {
                len: data.len(),
                max: RTL_FRAG_LEN,
            });
        }
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(index);
        payload.extend_from_slice(data);
        Self::new(HCI_OP_RTL_DOWNLOAD_FW, &payload)
    }

    /// Secure-send command: caller-chosen fragment type followed by one chunk.
    pub fn secure_send(fragment_type: u8, chunk: &[u8]) -> Result<Self, CodecError> {
        if chunk.len() > RTL_FRAG_LEN {
            return Err(CodecError::PayloadTooLarge {
                len: chunk.len(),
                max: RTL_FRAG_LEN,
            });
        }
        let mut payload = Vec::with_capacity(1 + chunk.len());
        payload.push(fragment_type);
        payload.extend_from_slice(chunk);
        Self::new(HCI_OP_RTL_SECURE_SEND, &payload)
    }

    /// DDC write: the whole record, length byte included.
    pub fn write_ddc(record: &[u8]) -> Result<Self, CodecError> {
        Self::new(HCI_OP_RTL_WRITE_DDC, record)
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total encoded length, header included.
    pub fn encoded_len(&self) -> usize {
        HCI_COMMAND_HDR_SIZE + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        LittleEndian::write_u16(&mut buf[0..2], self.opcode);
        // `new` bounds the payload, so the length always fits one byte.
        buf[2] = self.payload.len() as u8;
        buf[HCI_COMMAND_HDR_SIZE..].copy_from_slice(&self.payload);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_little_endian() {
        let bytes = HciCommand::read_rom_version().to_bytes();
        assert_eq!(bytes, vec![0x6D, 0xFC, 0x00]);

        let bytes = HciCommand::read_local_version().to_bytes();
        assert_eq!(bytes, vec![0x01, 0x10, 0x00]);
    }

    #[test]
    fn test_payload_limit() {
        let max = vec![0xAA; MAX_COMMAND_PAYLOAD];
        let cmd = HciCommand::new(HCI_OP_RTL_WRITE_DDC, &max).unwrap();
        assert_eq!(cmd.encoded_len(), CMD_BUF_MAX_SIZE);
        assert_eq!(cmd.to_bytes()[2], MAX_COMMAND_PAYLOAD as u8);

        let over = vec![0xAA; MAX_COMMAND_PAYLOAD + 1];
        assert!(matches!(
            HciCommand::new(HCI_OP_RTL_WRITE_DDC, &over),
            Err(CodecError::PayloadTooLarge { len: 254, max: 253 })
        ));
    }

    #[test]
    fn test_download_fragment_layout() {
        let data = [1u8, 2, 3];
        let bytes = HciCommand::download_fragment(0x85, &data)
            .unwrap()
            .to_bytes();
        assert_eq!(bytes, vec![0x20, 0xFC, 0x04, 0x85, 1, 2, 3]);

        let too_long = vec![0u8; RTL_FRAG_LEN + 1];
        assert!(HciCommand::download_fragment(0, &too_long).is_err());
    }

    #[test]
    fn test_reset_params() {
        let bytes = HciCommand::reset(&ResetParams::boot(0x1234_5678)).to_bytes();
        assert_eq!(
            bytes,
            vec![0x01, 0xFC, 0x08, 0x00, 0x01, 0x00, 0x01, 0x78, 0x56, 0x34, 0x12]
        );

        let bl = ResetParams::to_bootloader().to_bytes();
        assert_eq!(bl, [0x01, 0x01, 0x01, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn test_secure_send_prefixes_type() {
        let cmd = HciCommand::secure_send(0x02, &[9, 9]).unwrap();
        assert_eq!(cmd.opcode(), HCI_OP_RTL_SECURE_SEND);
        assert_eq!(cmd.payload(), &[0x02, 9, 9]);
    }
}
