//! Realtek "epatch" firmware container parsing.
//!
//! A V1 container (`"Realtech"` signature) is laid out as:
//!
//! ```text
//! signature[8] | fw_version u32 | num_patches u16
//! chip_id   u16 x num_patches
//! length    u16 x num_patches
//! offset    u32 x num_patches
//! ... patch bodies addressed by (offset, length) ...
//! ```
//!
//! All integers are little-endian. Chip ids are stored as ROM version + 1.
//! V2 containers (`"RTBTCore"`) are recognized but their section walk is
//! not implemented.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// V1 container signature.
pub const EPATCH_SIGNATURE: &[u8; 8] = b"Realtech";

/// V2 container signature.
pub const EPATCH_SIGNATURE_V2: &[u8; 8] = b"RTBTCore";

/// Trailing signature some V1 containers carry after the last patch.
pub const EXTENSION_SIGNATURE: [u8; 4] = [0x51, 0x04, 0xFD, 0x77];

/// signature + fw_version + num_patches
pub const EPATCH_HEADER_SIZE: usize = 14;

/// signature + fw_version[8] + num_sections
pub const EPATCH_V2_HEADER_SIZE: usize = 20;

/// Bytes of per-patch table data (chip id + length + offset).
const PATCH_TABLE_ENTRY_SIZE: usize = 2 + 2 + 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown container signature")]
    UnknownFormat,
    #[error("Container truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    #[error("{format} patch extraction is not implemented")]
    NotImplemented { format: ContainerFormat },
    #[error("No patch for ROM version 0x{rom_version:02x}")]
    NoPatchForVersion { rom_version: u8 },
}

/// Container format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    V1,
    V2,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::V1 => write!(f, "epatch V1"),
            ContainerFormat::V2 => write!(f, "epatch V2"),
        }
    }
}

impl ContainerFormat {
    /// Identify the container by its 8-byte signature.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data.get(..8)? {
            sig if sig == EPATCH_SIGNATURE => Some(ContainerFormat::V1),
            sig if sig == EPATCH_SIGNATURE_V2 => Some(ContainerFormat::V2),
            _ => None,
        }
    }
}

/// One row of the V1 patch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchEntry {
    pub index: usize,
    pub chip_id: u16,
    pub length: u16,
    pub offset: u32,
}

impl PatchEntry {
    /// ROM version this entry serves, if the chip id maps onto one.
    pub fn rom_version(&self) -> Option<u8> {
        self.chip_id
            .checked_sub(1)
            .and_then(|v| u8::try_from(v).ok())
    }

    fn range(&self) -> Option<(usize, usize)> {
        let start = self.offset as usize;
        let end = start.checked_add(self.length as usize)?;
        Some((start, end))
    }
}

/// The patch selected for one ROM version, copied out of its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePatch {
    data: Vec<u8>,
    pub rom_version: u8,
    pub fw_version: u32,
    pub offset: u32,
}

impl FirmwarePatch {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

fn read_u16_at(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    data.get(offset..offset + 2)
        .map(LittleEndian::read_u16)
        .ok_or(ParseError::Truncated {
            needed: offset + 2,
            actual: data.len(),
        })
}

fn read_u32_at(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    data.get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or(ParseError::Truncated {
            needed: offset + 4,
            actual: data.len(),
        })
}

/// Parsed V1 header plus its patch table.
#[derive(Debug, Clone)]
struct PatchTable {
    fw_version: u32,
    entries: Vec<PatchEntry>,
    /// First byte after the three parallel arrays.
    end: usize,
}

fn read_patch_table(data: &[u8]) -> Result<PatchTable, ParseError> {
    if data.len() < EPATCH_HEADER_SIZE {
        return Err(ParseError::Truncated {
            needed: EPATCH_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let fw_version = read_u32_at(data, 8)?;
    let num_patches = read_u16_at(data, 12)? as usize;

    let chip_id_base = EPATCH_HEADER_SIZE;
    let length_base = chip_id_base + 2 * num_patches;
    let offset_base = length_base + 2 * num_patches;
    let end = EPATCH_HEADER_SIZE + PATCH_TABLE_ENTRY_SIZE * num_patches;
    if data.len() < end {
        return Err(ParseError::Truncated {
            needed: end,
            actual: data.len(),
        });
    }

    let entries = (0..num_patches)
        .map(|i| {
            Ok(PatchEntry {
                index: i,
                chip_id: read_u16_at(data, chip_id_base + 2 * i)?,
                length: read_u16_at(data, length_base + 2 * i)?,
                offset: read_u32_at(data, offset_base + 4 * i)?,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    Ok(PatchTable {
        fw_version,
        entries,
        end,
    })
}

/// Locate and copy the patch for `rom_version` out of a firmware container.
///
/// Pure over its inputs; the returned patch owns its bytes.
pub fn extract_patch(data: &[u8], rom_version: u8) -> Result<FirmwarePatch, ParseError> {
    if data.len() <= 8 {
        warn!(len = data.len(), "Firmware container is too short");
        return Err(ParseError::Truncated {
            needed: 9,
            actual: data.len(),
        });
    }

    match ContainerFormat::detect(data) {
        Some(ContainerFormat::V1) => extract_v1(data, rom_version),
        Some(ContainerFormat::V2) => {
            warn!("Found V2 firmware signature, extraction not implemented");
            Err(ParseError::NotImplemented {
                format: ContainerFormat::V2,
            })
        }
        None => {
            warn!("Unknown firmware signature");
            Err(ParseError::UnknownFormat)
        }
    }
}

fn extract_v1(data: &[u8], rom_version: u8) -> Result<FirmwarePatch, ParseError> {
    let table = read_patch_table(data)?;
    debug!(
        fw_version = %format!("0x{:08x}", table.fw_version),
        patches = table.entries.len(),
        "Found V1 firmware signature"
    );

    // The container stores chip ids one above the ROM version the device reports.
    let wanted = u16::from(rom_version) + 1;
    let entry = table
        .entries
        .iter()
        .find(|e| e.chip_id == wanted)
        .filter(|e| e.offset != 0)
        .ok_or(ParseError::NoPatchForVersion { rom_version })?;

    let (start, end) = entry.range().ok_or(ParseError::Truncated {
        needed: usize::MAX,
        actual: data.len(),
    })?;
    if end > data.len() {
        return Err(ParseError::Truncated {
            needed: end,
            actual: data.len(),
        });
    }
    if start < table.end {
        return Err(ParseError::MalformedContainer(format!(
            "patch {} at 0x{:x} overlaps the header (ends at 0x{:x})",
            entry.index, start, table.end
        )));
    }

    info!(
        rom_version = %format!("0x{:02x}", rom_version),
        offset = %format!("0x{:x}", start),
        length = entry.length,
        "Found patch"
    );

    Ok(FirmwarePatch {
        data: data[start..end].to_vec(),
        rom_version,
        fw_version: table.fw_version,
        offset: entry.offset,
    })
}

/// Version field of a container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerVersion {
    V1(u32),
    V2([u8; 8]),
}

impl fmt::Display for ContainerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerVersion::V1(v) => write!(f, "0x{:08x}", v),
            ContainerVersion::V2(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Structural report of a firmware container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub format: ContainerFormat,
    pub size: usize,
    pub version: ContainerVersion,
    /// V1 patch table (empty for V2).
    pub patches: Vec<PatchEntry>,
    /// V2 section count.
    pub num_sections: Option<u32>,
    pub has_extension_signature: bool,
}

impl ContainerInfo {
    pub fn inspect(data: &[u8]) -> Result<Self, ParseError> {
        let format = ContainerFormat::detect(data).ok_or(if data.len() < 8 {
            ParseError::Truncated {
                needed: 8,
                actual: data.len(),
            }
        } else {
            ParseError::UnknownFormat
        })?;
        let has_extension_signature = data.ends_with(&EXTENSION_SIGNATURE);

        match format {
            ContainerFormat::V1 => {
                let table = read_patch_table(data)?;
                Ok(Self {
                    format,
                    size: data.len(),
                    version: ContainerVersion::V1(table.fw_version),
                    patches: table.entries,
                    num_sections: None,
                    has_extension_signature,
                })
            }
            ContainerFormat::V2 => {
                let header = data
                    .get(..EPATCH_V2_HEADER_SIZE)
                    .ok_or(ParseError::Truncated {
                        needed: EPATCH_V2_HEADER_SIZE,
                        actual: data.len(),
                    })?;
                let mut version = [0u8; 8];
                version.copy_from_slice(&header[8..16]);
                Ok(Self {
                    format,
                    size: data.len(),
                    version: ContainerVersion::V2(version),
                    patches: Vec::new(),
                    num_sections: Some(LittleEndian::read_u32(&header[16..20])),
                    has_extension_signature,
                })
            }
        }
    }

    /// Patch entries whose body lies inside the container.
    pub fn valid_patches(&self) -> impl Iterator<Item = &PatchEntry> {
        self.patches.iter().filter(move |e| {
            e.offset != 0 && e.range().is_some_and(|(_, end)| end <= self.size)
        })
    }

    /// Format as text for display
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("Container: {}\n", self.format));
        out.push_str(&format!("{}\n", "=".repeat(50)));
        out.push_str(&format!("Size: {} bytes\n", self.size));
        out.push_str(&format!("Firmware version: {}\n", self.version));
        out.push_str(&format!(
            "Extension signature: {}\n",
            if self.has_extension_signature {
                "present"
            } else {
                "absent"
            }
        ));

        if let Some(n) = self.num_sections {
            out.push_str(&format!("Sections: {}\n", n));
        }

        if !self.patches.is_empty() {
            out.push_str(&format!("\nPatches ({}):\n", self.patches.len()));
            out.push_str("  idx  chip_id  rom   offset      length\n");
            for e in &self.patches {
                let rom = e
                    .rom_version()
                    .map(|v| format!("0x{:02x}", v))
                    .unwrap_or_else(|| "--".to_string());
                let ok = e.range().is_some_and(|(_, end)| end <= self.size) && e.offset != 0;
                out.push_str(&format!(
                    "  {:>3}  0x{:04x}   {:<4}  0x{:08x}  {:>6}{}\n",
                    e.index,
                    e.chip_id,
                    rom,
                    e.offset,
                    e.length,
                    if ok { "" } else { "  (out of range)" }
                ));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_v1, build_v1_raw};

    #[test]
    fn test_single_patch_scenario() {
        // chip id 6 -> ROM version 5, 4 bytes at offset 24
        let mut data = build_v1_raw(0x1234_5678, &[6], &[4], &[24]);
        data.resize(24, 0);
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let patch = extract_patch(&data, 5).unwrap();
        assert_eq!(patch.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(patch.offset, 24);
        assert_eq!(patch.fw_version, 0x1234_5678);
    }

    #[test]
    fn test_extraction_is_exact_slice_for_every_rom_version() {
        let patches: Vec<(u16, Vec<u8>)> = vec![
            (0x01, (0..10).collect()),
            (0x02, vec![0x55; 300]),
            (0x09, vec![0xA5; 1]),
        ];
        let data = build_v1(1, &patches);
        let info = ContainerInfo::inspect(&data).unwrap();

        for rom in 0..=u8::MAX {
            match extract_patch(&data, rom) {
                Ok(patch) => {
                    let entry = info
                        .patches
                        .iter()
                        .find(|e| e.rom_version() == Some(rom))
                        .unwrap();
                    let start = entry.offset as usize;
                    let end = start + entry.length as usize;
                    assert!(end <= data.len());
                    assert_eq!(patch.as_bytes(), &data[start..end]);
                }
                Err(e) => {
                    assert_eq!(e, ParseError::NoPatchForVersion { rom_version: rom });
                    assert!(!patches.iter().any(|(id, _)| *id == rom as u16 + 1));
                }
            }
        }
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let data = build_v1(1, &[(0x03, vec![1, 1]), (0x03, vec![2, 2])]);
        assert_eq!(extract_patch(&data, 2).unwrap().as_bytes(), &[1, 1]);
    }

    #[test]
    fn test_short_inputs() {
        for len in 0..=8 {
            let data = &EPATCH_SIGNATURE[..len.min(8)];
            let err = extract_patch(data, 0).unwrap_err();
            assert!(matches!(
                err,
                ParseError::Truncated { .. } | ParseError::UnknownFormat
            ));
        }
    }

    #[test]
    fn test_header_without_table() {
        // Signature plus a partial header.
        let mut data = EPATCH_SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            extract_patch(&data, 0),
            Err(ParseError::Truncated { needed: 14, .. })
        ));

        // Header declares more patches than the buffer holds.
        let mut data = build_v1_raw(0, &[1], &[1], &[30]);
        data[12] = 5;
        assert!(matches!(
            extract_patch(&data, 0),
            Err(ParseError::Truncated { needed: 54, .. })
        ));
    }

    #[test]
    fn test_patch_past_end_is_truncated() {
        let mut data = build_v1_raw(0, &[1], &[100], &[22]);
        data.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            extract_patch(&data, 0),
            Err(ParseError::Truncated { needed: 122, .. })
        ));
    }

    #[test]
    fn test_zero_offset_means_no_patch() {
        let mut data = build_v1_raw(0, &[1], &[4], &[0]);
        data.extend_from_slice(&[0u8; 4]);
        assert_eq!(
            extract_patch(&data, 0),
            Err(ParseError::NoPatchForVersion { rom_version: 0 })
        );
    }

    #[test]
    fn test_patch_inside_table_is_malformed() {
        let mut data = build_v1_raw(0, &[1], &[4], &[16]);
        data.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            extract_patch(&data, 0),
            Err(ParseError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_v2_is_distinct_from_unknown() {
        let mut v2 = EPATCH_SIGNATURE_V2.to_vec();
        v2.extend_from_slice(&[0u8; 8]);
        v2.extend_from_slice(&3u32.to_le_bytes());
        assert_eq!(
            extract_patch(&v2, 0),
            Err(ParseError::NotImplemented {
                format: ContainerFormat::V2
            })
        );

        let unknown = b"NotAPatchFile".to_vec();
        assert_eq!(extract_patch(&unknown, 0), Err(ParseError::UnknownFormat));

        let info = ContainerInfo::inspect(&v2).unwrap();
        assert_eq!(info.format, ContainerFormat::V2);
        assert_eq!(info.num_sections, Some(3));
    }

    #[test]
    fn test_inspect_reports_table() {
        let mut data = build_v1(0xCAFE, &[(0x02, vec![7; 8]), (0x04, vec![8; 4])]);
        data.extend_from_slice(&EXTENSION_SIGNATURE);
        let info = ContainerInfo::inspect(&data).unwrap();
        assert_eq!(info.version, ContainerVersion::V1(0xCAFE));
        assert_eq!(info.patches.len(), 2);
        assert_eq!(info.patches[1].rom_version(), Some(3));
        assert_eq!(info.valid_patches().count(), 2);
        assert!(info.has_extension_signature);

        let text = info.to_text();
        assert!(text.contains("epatch V1"));
        assert!(text.contains("0x0000cafe"));
    }
}
