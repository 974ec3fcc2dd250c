//! Setup state machine.

use std::fmt;

use crate::protocol::{ChipVersionInfo, LocalVersion};

/// Where a setup attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupState {
    #[default]
    Uninitialized,
    /// ROM version and LMP subversion known.
    VersionQueried,
    /// Container fetched from the store.
    ImageSelected,
    /// Patch extracted for this ROM version.
    ImageParsed,
    Downloading,
    /// Patch downloaded, waiting for the controller to reboot into it.
    BootPending,
    Configured,
    /// Boot failed; controller forced back to its bootloader.
    RecoveryReset,
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupState::Uninitialized => write!(f, "UNINITIALIZED"),
            SetupState::VersionQueried => write!(f, "VERSION_QUERIED"),
            SetupState::ImageSelected => write!(f, "IMAGE_SELECTED"),
            SetupState::ImageParsed => write!(f, "IMAGE_PARSED"),
            SetupState::Downloading => write!(f, "DOWNLOADING"),
            SetupState::BootPending => write!(f, "BOOT_PENDING"),
            SetupState::Configured => write!(f, "CONFIGURED"),
            SetupState::RecoveryReset => write!(f, "RECOVERY_RESET"),
        }
    }
}

/// Per-attempt runtime state. Lives on the caller's stack for one run.
#[derive(Debug, Default)]
pub struct SetupContext {
    pub state: SetupState,
    pub local_version: Option<LocalVersion>,
    pub rom_version: Option<u8>,
    pub chip_info: Option<ChipVersionInfo>,
    pub firmware_name: Option<String>,
    /// Fragments acknowledged by the controller.
    pub fragments_sent: usize,
    pub config_records: usize,
}

impl SetupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: SetupState) {
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
    }
}
