//! Chip identification and firmware selection.
//!
//! Chip families are table rows keyed by LMP subversion rather than types.
//! The sequencer only sees the [`ChipProfile`] capability set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::engine::ProtocolEngine;
use crate::error::SetupError;
use crate::protocol::{ChipVersionInfo, LocalVersion};
use crate::transport::HciTransport;

/// Only hardware platform the loader accepts.
pub const SUPPORTED_HW_PLATFORM: u8 = 0x37;

/// Accepted hardware variants.
pub const SUPPORTED_HW_VARIANTS: &[u8] = &[0x0B, 0x0C, 0x11, 0x12, 0x13, 0x14];

/// Firmware variant reported while the ROM bootloader is running.
pub const FW_VARIANT_BOOTLOADER: u8 = 0x06;
/// Firmware variant reported by operational firmware.
pub const FW_VARIANT_FIRMWARE: u8 = 0x23;

/// What is currently running on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareVariant {
    Bootloader,
    Firmware,
}

impl fmt::Display for FirmwareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareVariant::Bootloader => write!(f, "Bootloader"),
            FirmwareVariant::Firmware => write!(f, "Firmware"),
        }
    }
}

/// Check a chip against the platform/variant whitelist.
pub fn validate_chip_info(info: &ChipVersionInfo) -> Result<FirmwareVariant, SetupError> {
    if info.hw_platform != SUPPORTED_HW_PLATFORM {
        return Err(SetupError::UnsupportedDevice(format!(
            "hardware platform 0x{:02x}",
            info.hw_platform
        )));
    }
    if !SUPPORTED_HW_VARIANTS.contains(&info.hw_variant) {
        return Err(SetupError::UnsupportedDevice(format!(
            "hardware variant 0x{:02x}",
            info.hw_variant
        )));
    }
    match info.fw_variant {
        FW_VARIANT_BOOTLOADER => Ok(FirmwareVariant::Bootloader),
        FW_VARIANT_FIRMWARE => Ok(FirmwareVariant::Firmware),
        other => Err(SetupError::UnsupportedDevice(format!(
            "firmware variant 0x{:02x}",
            other
        ))),
    }
}

/// Per-family behavior the sequencer depends on.
pub trait ChipProfile {
    /// Firmware container name for this chip, `None` if unsupported.
    fn firmware_name(&self, version: &LocalVersion) -> Option<String>;

    /// Optional device configuration (DDC) blob name.
    fn config_name(&self, _version: &LocalVersion) -> Option<String> {
        None
    }

    /// Extra commands after the patch is running and DDC is applied.
    fn post_configure<T: HciTransport>(
        &self,
        _engine: &ProtocolEngine<'_, T>,
        _timeout: Duration,
    ) -> Result<(), SetupError> {
        Ok(())
    }
}

/// One supported chip family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipEntry {
    pub lmp_subversion: u16,
    pub firmware: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl ChipEntry {
    pub fn new(lmp_subversion: u16, firmware: impl Into<String>) -> Self {
        Self {
            lmp_subversion,
            firmware: firmware.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }
}

const BUILTIN_CHIPS: &[(u16, &str)] = &[
    (0x8723, "rtl8723b_fw.bin"),
    (0x8821, "rtw8821c_fw.bin"),
    (0x8703, "rtl8723aufw_A.bin"),
    (0x8192, "rtl8192eu_nic.bin"),
];

/// Read-only chip table; the first row matching a subversion wins.
#[derive(Debug, Clone)]
pub struct ChipTable {
    entries: Vec<ChipEntry>,
}

impl ChipTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_CHIPS
                .iter()
                .map(|(subver, name)| ChipEntry::new(*subver, *name))
                .collect(),
        }
    }

    /// Built-in table with `extra` rows taking precedence.
    pub fn with_overrides(extra: &[ChipEntry]) -> Self {
        let mut entries = extra.to_vec();
        entries.extend(Self::builtin().entries);
        Self { entries }
    }

    pub fn lookup(&self, lmp_subversion: u16) -> Option<&ChipEntry> {
        self.entries
            .iter()
            .find(|e| e.lmp_subversion == lmp_subversion)
    }

    pub fn entries(&self) -> &[ChipEntry] {
        &self.entries
    }
}

impl Default for ChipTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ChipProfile for ChipTable {
    fn firmware_name(&self, version: &LocalVersion) -> Option<String> {
        self.lookup(version.lmp_subversion)
            .map(|e| e.firmware.clone())
    }

    fn config_name(&self, version: &LocalVersion) -> Option<String> {
        self.lookup(version.lmp_subversion)
            .and_then(|e| e.config.clone())
    }
}
