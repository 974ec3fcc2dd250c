//! Builders for synthetic containers and device responses used in tests.

use crate::epatch::EPATCH_SIGNATURE;
use crate::protocol::constants::*;

/// V1 header and patch table only; bodies are appended by the caller.
pub fn build_v1_raw(fw_version: u32, chip_ids: &[u16], lengths: &[u16], offsets: &[u32]) -> Vec<u8> {
    let mut data = EPATCH_SIGNATURE.to_vec();
    data.extend_from_slice(&fw_version.to_le_bytes());
    data.extend_from_slice(&(chip_ids.len() as u16).to_le_bytes());
    for id in chip_ids {
        data.extend_from_slice(&id.to_le_bytes());
    }
    for len in lengths {
        data.extend_from_slice(&len.to_le_bytes());
    }
    for off in offsets {
        data.extend_from_slice(&off.to_le_bytes());
    }
    data
}

/// Complete V1 container with bodies packed right after the table.
pub fn build_v1(fw_version: u32, patches: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let table_end = 14 + 8 * patches.len();
    let mut offset = table_end as u32;
    let mut offsets = Vec::new();
    for (_, body) in patches {
        offsets.push(offset);
        offset += body.len() as u32;
    }
    let ids: Vec<u16> = patches.iter().map(|(id, _)| *id).collect();
    let lens: Vec<u16> = patches.iter().map(|(_, b)| b.len() as u16).collect();
    let mut data = build_v1_raw(fw_version, &ids, &lens, &offsets);
    for (_, body) in patches {
        data.extend_from_slice(body);
    }
    data
}

/// Raw Command Complete event bytes.
pub fn command_complete(opcode: u16, return_params: &[u8]) -> Vec<u8> {
    let mut raw = vec![HCI_EV_CMD_COMPLETE, (3 + return_params.len()) as u8, 0x01];
    raw.extend_from_slice(&opcode.to_le_bytes());
    raw.extend_from_slice(return_params);
    raw
}

/// Bootup notification as emitted by operational firmware.
pub fn bootup_event() -> Vec<u8> {
    vec![HCI_EV_VENDOR, 0x06, BOOTUP_NUM_CMDS, 0x00, 0x00, 0x00, 0x00, 0x00]
}
