//! Device configuration (DDC) loading.

use tracing::{debug, info, instrument};

use crate::ddc::parse_records;
use crate::error::SetupError;
use crate::events::{LogLevel, SetupObserver};
use crate::protocol::HciCommand;
use crate::protocol::constants::HCI_OP_RTL_WRITE_DDC;
use crate::transport::HciTransport;

use super::HandlerContext;

/// Send every record of a DDC blob as its own write command.
///
/// Every record is validated and encoded before the first write, so a
/// truncated or oversized blob never reaches the controller.
#[instrument(skip(ctx, blob), fields(len = blob.len()))]
pub fn load_device_config<T: HciTransport, O: SetupObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
    blob: &[u8],
) -> Result<(), SetupError> {
    let records = parse_records(blob)?;
    let commands = records
        .iter()
        .map(|record| HciCommand::write_ddc(record.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    for (record, cmd) in records.iter().zip(&commands) {
        let event = ctx.engine.send_sync(cmd, ctx.timeouts.command)?;
        event
            .command_complete(HCI_OP_RTL_WRITE_DDC)?
            .check_status()?;
        debug!(
            id = %format!("0x{:04x}", record.id()),
            offset = record.offset,
            "DDC record written"
        );
        ctx.state.config_records += 1;
    }

    info!(records = records.len(), "Load DDC config done");
    ctx.log(
        LogLevel::Info,
        format!("Loaded {} DDC records", records.len()),
    );
    Ok(())
}
