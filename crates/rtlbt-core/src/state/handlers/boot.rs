//! Reboot into the downloaded patch, and the recovery reset.

use tracing::{info, instrument, warn};

use crate::error::SetupError;
use crate::events::{LogLevel, SetupObserver};
use crate::protocol::constants::HCI_EV_VENDOR;
use crate::protocol::{BootNotification, HciCommand, ResetParams};
use crate::transport::HciTransport;

use super::HandlerContext;

/// Reset into the patch and wait for the bootup notification.
#[instrument(skip(ctx), fields(boot_address = %format!("0x{:08x}", ctx.boot_address)))]
pub fn boot_patch<T: HciTransport, O: SetupObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<(), SetupError> {
    let cmd = HciCommand::reset(&ResetParams::boot(ctx.boot_address));
    let event = ctx
        .engine
        .send_sync_until(&cmd, HCI_EV_VENDOR, ctx.timeouts.boot)?;

    let note = BootNotification::decode(&event)
        .map_err(|e| SetupError::BootFailed(format!("malformed notification: {}", e)))?;
    if !note.is_bootup() {
        return Err(SetupError::BootFailed(format!(
            "unexpected notification (num_cmds={})",
            note.num_cmds
        )));
    }

    info!("Device reboot done");
    ctx.log(LogLevel::Info, "Device reboot done");
    Ok(())
}

/// Force the controller back into its ROM bootloader. Best-effort: the
/// result is logged and otherwise ignored.
pub fn reset_to_bootloader<T: HciTransport, O: SetupObserver>(ctx: &HandlerContext<'_, T, O>) {
    let cmd = HciCommand::reset(&ResetParams::to_bootloader());
    match ctx.engine.send_only(&cmd, ctx.timeouts.command) {
        Ok(()) => {
            warn!("Reset to bootloader issued");
            ctx.log(LogLevel::Warn, "Reset to bootloader issued");
        }
        Err(e) => {
            warn!(error = %e, "Reset to bootloader failed");
            ctx.log(LogLevel::Warn, format!("Reset to bootloader failed: {}", e));
        }
    }
}
