//! Patch download over the bulk channel.

use tracing::{debug, info, instrument};

use crate::error::SetupError;
use crate::events::{SetupEvent, SetupObserver};
use crate::payload::Fragments;
use crate::protocol::{CodecError, DownloadResponse, HciCommand};
use crate::protocol::constants::HCI_OP_RTL_DOWNLOAD_FW;
use crate::state::SetupState;
use crate::transport::HciTransport;

use super::HandlerContext;

/// Stream `patch` as indexed fragments, checking each acknowledgement.
#[instrument(skip(ctx, patch), fields(len = patch.len()))]
pub fn download_patch<T: HciTransport, O: SetupObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
    patch: &[u8],
) -> Result<(), SetupError> {
    let fragments = Fragments::new(patch);
    let total = fragments.total() as u64;
    info!(fragments = total, "Downloading patch");

    for fragment in fragments {
        let cmd = HciCommand::download_fragment(fragment.index(), fragment.data)?;
        let raw = ctx.engine.bulk_sync(&cmd, ctx.timeouts.command)?;
        let resp = DownloadResponse::decode(&raw)?;
        if resp.status != 0 {
            return Err(CodecError::CommandStatus {
                opcode: HCI_OP_RTL_DOWNLOAD_FW,
                status: resp.status,
            }
            .into());
        }

        debug!(
            index = %format!("0x{:02x}", fragment.index()),
            len = fragment.data.len(),
            "Fragment acknowledged"
        );
        ctx.state.fragments_sent += 1;
        ctx.emit(SetupEvent::Progress {
            state: SetupState::Downloading,
            operation: "Patch".to_string(),
            current: fragment.seq as u64 + 1,
            total,
        });
    }

    Ok(())
}
