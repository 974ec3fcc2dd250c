//! Stage handlers, one submodule per group of sequencer states:
//! - `version`: identity queries and whitelist check
//! - `download`: fragment streaming over the bulk channel
//! - `boot`: reboot into the patch and bootloader recovery
//! - `config`: device configuration (DDC) records

mod boot;
mod config;
mod download;
mod version;

use std::time::Duration;

use crate::engine::ProtocolEngine;
use crate::events::{LogLevel, SetupEvent, SetupObserver};
use crate::state::machine::{SetupContext, SetupState};
use crate::transport::HciTransport;

pub use boot::{boot_patch, reset_to_bootloader};
pub use config::load_device_config;
pub use download::download_patch;
pub use version::query_version;

/// Timing and addressing knobs used by the handlers.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub command: Duration,
    pub boot: Duration,
}

/// Handler context containing all resources.
pub struct HandlerContext<'a, T: HciTransport, O: SetupObserver> {
    pub engine: ProtocolEngine<'a, T>,
    pub observer: &'a O,
    pub state: &'a mut SetupContext,
    pub timeouts: Timeouts,
    pub boot_address: u32,
}

impl<'a, T: HciTransport, O: SetupObserver> HandlerContext<'a, T, O> {
    pub(crate) fn emit(&self, event: SetupEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(SetupEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Move to `to`, logging and publishing the transition.
    pub fn goto(&mut self, to: SetupState) {
        let from = self.state.state;
        self.state.goto_state(to);
        self.emit(SetupEvent::PhaseChanged { from, to });
    }
}
