//! Identity queries: local version, ROM version, chip version info.

use tracing::{info, instrument};

use crate::chip::validate_chip_info;
use crate::error::SetupError;
use crate::events::{LogLevel, SetupObserver};
use crate::protocol::{ChipVersionInfo, HciCommand, LocalVersion, decode_rom_version};
use crate::transport::HciTransport;

use super::HandlerContext;

/// Read LMP subversion, ROM version and chip info, then check the whitelist.
///
/// Always runs before anything is downloaded.
#[instrument(skip(ctx))]
pub fn query_version<T: HciTransport, O: SetupObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(LocalVersion, u8, ChipVersionInfo), SetupError> {
    let timeout = ctx.timeouts.command;

    let event = ctx
        .engine
        .send_sync(&HciCommand::read_local_version(), timeout)?;
    let local = LocalVersion::decode(&event)?;

    let event = ctx
        .engine
        .send_sync(&HciCommand::read_rom_version(), timeout)?;
    let rom_version = decode_rom_version(&event)?;

    info!(
        rom_version = %format!("0x{:02x}", rom_version),
        lmp_subversion = %format!("0x{:04x}", local.lmp_subversion),
        "Chip identified"
    );
    ctx.log(
        LogLevel::Info,
        format!(
            "ROM version 0x{:02x}, LMP subversion 0x{:04x}",
            rom_version, local.lmp_subversion
        ),
    );

    ctx.state.local_version = Some(local);
    ctx.state.rom_version = Some(rom_version);

    let event = ctx.engine.send_sync(&HciCommand::read_version(), timeout)?;
    let chip = ChipVersionInfo::decode(&event)?;
    let variant = validate_chip_info(&chip)?;
    ctx.log(LogLevel::Info, format!("{} {}", variant, chip));
    ctx.state.chip_info = Some(chip);

    Ok((local, rom_version, chip))
}
