//! Setup session - high-level orchestrator for one firmware load.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::chip::{ChipEntry, ChipProfile, ChipTable};
use crate::engine::ProtocolEngine;
use crate::epatch::{ParseError, extract_patch};
use crate::error::SetupError;
use crate::events::{Channel, PacketDirection, SetupEvent, SetupObserver, TracingObserver};
use crate::protocol::ChipVersionInfo;
use crate::protocol::constants::{DEFAULT_BOOT_TIMEOUT_MS, DEFAULT_COMMAND_TIMEOUT_MS};
use crate::state::handlers::{
    Timeouts, boot_patch, download_patch, load_device_config, query_version, reset_to_bootloader,
};
use crate::state::{HandlerContext, SetupContext, SetupState};
use crate::store::{DirectoryStore, FirmwareStore};
use crate::transport::{HciTransport, TransportError};

/// Configuration for a setup session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Directory holding firmware containers and config blobs.
    pub firmware_dir: PathBuf,
    pub command_timeout_ms: u64,
    /// Wait for the bootup notification after the reset.
    pub boot_timeout_ms: u64,
    /// Boot parameter of the vendor reset.
    pub boot_address: u32,
    /// Apply the DDC blob when the chip table names one.
    pub load_device_config: bool,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    /// Extra chip rows, consulted before the built-in table.
    pub chips: Vec<ChipEntry>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            firmware_dir: PathBuf::from("/lib/firmware/rtl_bt"),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            boot_timeout_ms: DEFAULT_BOOT_TIMEOUT_MS,
            boot_address: 0,
            load_device_config: true,
            vendor_id: None,
            product_id: None,
            chips: Vec::new(),
        }
    }
}

impl SetupConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SetupConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            command: Duration::from_millis(self.command_timeout_ms),
            boot: Duration::from_millis(self.boot_timeout_ms),
        }
    }

    /// USB ids to open, if the config pins a device. Both or neither must be set.
    pub fn device_ids(&self) -> Result<Option<(u16, u16)>> {
        match (self.vendor_id, self.product_id) {
            (Some(vid), Some(pid)) => Ok(Some((vid, pid))),
            (None, None) => Ok(None),
            (vid, pid) => anyhow::bail!(
                "vendor_id and product_id must be set together (vendor_id={:?}, product_id={:?})",
                vid,
                pid
            ),
        }
    }

    pub fn chip_table(&self) -> ChipTable {
        ChipTable::with_overrides(&self.chips)
    }

    pub fn firmware_store(&self) -> DirectoryStore {
        DirectoryStore::new(&self.firmware_dir)
    }
}

/// What a successful setup did.
#[derive(Debug, Clone)]
pub struct SetupSummary {
    pub rom_version: u8,
    pub lmp_subversion: u16,
    pub firmware: String,
    pub firmware_version: u32,
    pub patch_len: usize,
    pub fragments: usize,
    pub chip_info: ChipVersionInfo,
    pub config_records: usize,
}

/// Setup session - owns the transport for one attempt.
pub struct SetupSession<T: HciTransport, S: FirmwareStore, P: ChipProfile, O: SetupObserver> {
    transport: T,
    store: S,
    profile: P,
    config: SetupConfig,
    observer: Arc<O>,
}

impl<T: HciTransport, S: FirmwareStore, P: ChipProfile> SetupSession<T, S, P, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, store: S, profile: P, config: SetupConfig) -> Self {
        Self::with_observer(transport, store, profile, config, Arc::new(TracingObserver))
    }
}

impl<T: HciTransport, S: FirmwareStore, P: ChipProfile, O: SetupObserver> SetupSession<T, S, P, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: T,
        store: S,
        profile: P,
        config: SetupConfig,
        observer: Arc<O>,
    ) -> Self {
        Self {
            transport,
            store,
            profile,
            config,
            observer,
        }
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run one complete setup attempt.
    ///
    /// Either the controller ends up running the patch (and its config),
    /// or an error is returned. A boot failure leaves the controller reset
    /// to its bootloader.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<SetupSummary, SetupError> {
        self.observer.on_event(&SetupEvent::DeviceConnected {
            vid: self.transport.vendor_id(),
            pid: self.transport.product_id(),
        });

        let mut state = SetupContext::new();
        let result = self.run_sequence(&mut state);

        match &result {
            Ok(summary) => {
                info!(
                    firmware = %summary.firmware,
                    fragments = summary.fragments,
                    "Setup succeeded"
                );
                self.observer.on_event(&SetupEvent::Complete);
            }
            Err(e) => {
                self.observer.on_event(&SetupEvent::Failed {
                    reason: e.reason(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn run_sequence(&self, state: &mut SetupContext) -> Result<SetupSummary, SetupError> {
        let transport = ObservableTransport {
            inner: &self.transport,
            observer: self.observer.as_ref(),
        };
        let mut ctx = HandlerContext {
            engine: ProtocolEngine::new(&transport),
            observer: self.observer.as_ref(),
            state,
            timeouts: self.config.timeouts(),
            boot_address: self.config.boot_address,
        };

        ctx.goto(SetupState::VersionQueried);
        let (local, rom_version, chip_info) = query_version(&mut ctx)?;

        let firmware = self.profile.firmware_name(&local).ok_or_else(|| {
            SetupError::UnsupportedDevice(format!(
                "lmp_subversion 0x{:04x}",
                local.lmp_subversion
            ))
        })?;
        ctx.state.firmware_name = Some(firmware.clone());

        ctx.goto(SetupState::ImageSelected);
        let container = self.store.lookup(&firmware)?;
        info!(name = %firmware, size = container.len(), "Firmware loaded");

        ctx.goto(SetupState::ImageParsed);
        let patch = extract_patch(&container, rom_version)?;
        drop(container);
        if patch.is_empty() {
            return Err(ParseError::MalformedContainer(format!(
                "empty patch for ROM version 0x{:02x}",
                rom_version
            ))
            .into());
        }

        ctx.goto(SetupState::Downloading);
        download_patch(&mut ctx, patch.as_bytes())?;
        let patch_len = patch.len();
        let firmware_version = patch.fw_version;
        drop(patch);

        ctx.goto(SetupState::BootPending);
        if let Err(e) = boot_patch(&mut ctx) {
            error!(error = %e, "Boot failed, resetting to bootloader");
            ctx.goto(SetupState::RecoveryReset);
            reset_to_bootloader(&ctx);
            return Err(e);
        }

        ctx.goto(SetupState::Configured);
        if self.config.load_device_config
            && let Some(name) = self.profile.config_name(&local)
        {
            let blob = self.store.lookup(&name)?;
            load_device_config(&mut ctx, &blob)?;
        }
        self.profile
            .post_configure(&ctx.engine, ctx.timeouts.command)?;

        Ok(SetupSummary {
            rom_version,
            lmp_subversion: local.lmp_subversion,
            firmware,
            firmware_version,
            patch_len,
            fragments: ctx.state.fragments_sent,
            chip_info,
            config_records: ctx.state.config_records,
        })
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: HciTransport, O: SetupObserver> {
    inner: &'a T,
    observer: &'a O,
}

impl<T: HciTransport, O: SetupObserver> ObservableTransport<'_, T, O> {
    fn packet(&self, direction: PacketDirection, channel: Channel, data: &[u8]) {
        self.observer.on_event(&SetupEvent::Packet {
            direction,
            channel,
            length: data.len(),
            data: Some(data.iter().take(32).cloned().collect()),
        });
    }
}

impl<T: HciTransport, O: SetupObserver> HciTransport for ObservableTransport<'_, T, O> {
    fn send_command(&self, packet: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let res = self.inner.send_command(packet, timeout);
        if res.is_ok() {
            self.packet(PacketDirection::Tx, Channel::Command, packet);
        }
        res
    }

    fn read_event(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read_event(max_len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.packet(PacketDirection::Rx, Channel::Event, data);
        }
        res
    }

    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let res = self.inner.write_bulk(data, timeout);
        if res.is_ok() {
            self.packet(PacketDirection::Tx, Channel::Bulk, data);
        }
        res
    }

    fn read_bulk(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read_bulk(max_len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.packet(PacketDirection::Rx, Channel::Bulk, data);
        }
        res
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
