//! Protocol constants for the Realtek USB Bluetooth patch loader.
//!
//! Derived from the Linux `btrtl` driver headers and the vendor command set
//! the ROM bootloader answers to.

// ============================================================================
// Device Identification
// ============================================================================

/// Realtek Semiconductor Vendor ID
pub const REALTEK_VENDOR_ID: u16 = 0x0BDA;

/// Known Realtek Bluetooth USB product IDs.
pub const SUPPORTED_PIDS: &[u16] = &[
    0x8761, 0x8821, 0xB720, 0xB723, 0xB728, 0xB822, 0xC821, 0xC82C, 0xD723, 0x1724,
];

// ============================================================================
// Size Constants
// ============================================================================

/// HCI command header: opcode (2) + parameter length (1).
pub const HCI_COMMAND_HDR_SIZE: usize = 3;

/// HCI event header: event code (1) + parameter length (1).
pub const HCI_EVENT_HDR_SIZE: usize = 2;

/// Largest command buffer the bootloader accepts, header included.
pub const CMD_BUF_MAX_SIZE: usize = 256;

/// Largest parameter block that fits in [`CMD_BUF_MAX_SIZE`].
pub const MAX_COMMAND_PAYLOAD: usize = CMD_BUF_MAX_SIZE - HCI_COMMAND_HDR_SIZE;

/// Patch bytes carried by one download fragment.
pub const RTL_FRAG_LEN: usize = 252;

/// Final-fragment flag in the download index byte.
pub const FRAG_FINAL_FLAG: u8 = 0x80;

/// Sequence bits of the download index byte.
pub const FRAG_INDEX_MASK: u8 = 0x7F;

/// Read size for event and bulk responses.
pub const EVENT_BUF_SIZE: usize = 256;

// ============================================================================
// Opcodes (OGF/OCF packed, little-endian on the wire)
// ============================================================================

pub const HCI_OP_READ_LOCAL_VERSION: u16 = 0x1001;

/// Vendor reset / boot into the downloaded patch
pub const HCI_OP_RTL_RESET: u16 = 0xFC01;

/// Vendor read version (hardware/firmware identity)
pub const HCI_OP_RTL_READ_VERSION: u16 = 0xFC05;

/// Secure send of a typed fragment
pub const HCI_OP_RTL_SECURE_SEND: u16 = 0xFC09;

pub const HCI_OP_RTL_DOWNLOAD_FW: u16 = 0xFC20;

pub const HCI_OP_RTL_READ_ROM_VERSION: u16 = 0xFC6D;

/// Write one device configuration (DDC) record
pub const HCI_OP_RTL_WRITE_DDC: u16 = 0xFC8B;

// ============================================================================
// Events
// ============================================================================

pub const HCI_EV_CMD_COMPLETE: u8 = 0x0E;

/// Vendor-specific event, also used for the bootup notification
pub const HCI_EV_VENDOR: u8 = 0xFF;

/// "Number of commands" value carried by the bootup notification
pub const BOOTUP_NUM_CMDS: u8 = 0x02;

// ============================================================================
// Reset parameters
// ============================================================================

pub const RESET_TYPE_SOFT: u8 = 0x00;
pub const RESET_TYPE_BOOTLOADER: u8 = 0x01;

// ============================================================================
// Timeouts (milliseconds)
// ============================================================================

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Booting into operational firmware should not take longer than this.
pub const DEFAULT_BOOT_TIMEOUT_MS: u64 = 1000;
