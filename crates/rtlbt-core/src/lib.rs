//! rtlbt-core: Realtek Bluetooth USB firmware patch loader.
//!
//! Brings a Realtek controller from its ROM bootloader into operational
//! firmware: identify the chip, pick its patch out of an epatch container,
//! stream the patch in indexed fragments, reboot into it and apply the
//! device configuration.
//!
//! # Architecture
//!
//! - **Protocol**: HCI command encoding and event decoding
//! - **Epatch**: Firmware container parsing and patch extraction
//! - **DDC**: Device configuration record walking
//! - **Store**: Firmware lookup by name (memory, directory, zlib)
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Engine**: Synchronous request/response exchanges
//! - **State**: Sequencer states and stage handlers
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use rtlbt_core::session::{SetupConfig, SetupSession};
//! use rtlbt_core::transport::NusbTransport;
//!
//! let config = SetupConfig::default();
//! let transport = NusbTransport::open().expect("no device");
//! let store = config.firmware_store();
//! let chips = config.chip_table();
//!
//! let mut session = SetupSession::new(transport, store, chips, config);
//! session.run().expect("setup failed");
//! ```

pub mod chip;
pub mod ddc;
pub mod engine;
pub mod epatch;
pub mod error;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testutil;

// Re-exports for convenience
pub use chip::{ChipEntry, ChipProfile, ChipTable, FirmwareVariant};
pub use engine::ProtocolEngine;
pub use epatch::{ContainerFormat, ContainerInfo, FirmwarePatch, ParseError, extract_patch};
pub use error::{FailureReason, SetupError};
pub use events::{LogLevel, NullObserver, SetupEvent, SetupObserver, TracingObserver};
pub use session::{SetupConfig, SetupSession, SetupSummary};
pub use state::SetupState;
pub use store::{DirectoryStore, FirmwareEntry, FirmwareStore, MemoryStore, StoreError};
pub use transport::{HciTransport, MockTransport, NusbTransport, TransportError};
