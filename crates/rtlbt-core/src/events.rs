//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow a setup attempt without
//! coupling to the sequencer internals.

use std::fmt;

use crate::error::FailureReason;
use crate::state::SetupState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by a setup session.
#[derive(Debug, Clone)]
pub enum SetupEvent {
    /// Device opened.
    DeviceConnected { vid: u16, pid: u16 },
    /// Sequencer state changed.
    PhaseChanged { from: SetupState, to: SetupState },
    /// Progress update for the current operation.
    Progress {
        state: SetupState,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Packet sent/received.
    Packet {
        direction: PacketDirection,
        channel: Channel,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Setup completed; the controller runs the patched firmware.
    Complete,
    /// Setup failed.
    Failed {
        reason: FailureReason,
        message: String,
    },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Logical channel a packet travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command,
    Event,
    Bulk,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => write!(f, "CMD"),
            Channel::Event => write!(f, "EVT"),
            Channel::Bulk => write!(f, "BULK"),
        }
    }
}

/// Observer trait for receiving setup events.
pub trait SetupObserver: Send + Sync {
    fn on_event(&self, event: &SetupEvent);
}

impl<O: SetupObserver + ?Sized> SetupObserver for &O {
    fn on_event(&self, event: &SetupEvent) {
        (**self).on_event(event)
    }
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SetupObserver for NullObserver {
    fn on_event(&self, _event: &SetupEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SetupObserver for TracingObserver {
    fn on_event(&self, event: &SetupEvent) {
        match event {
            SetupEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            SetupEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            SetupEvent::Progress {
                state,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(state = %state, operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            SetupEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            SetupEvent::Packet {
                direction,
                channel,
                length,
                ..
            } => {
                tracing::trace!(dir = %direction, channel = %channel, len = length, "Packet");
            }
            SetupEvent::Complete => {
                tracing::info!("Setup complete");
            }
            SetupEvent::Failed { reason, message } => {
                tracing::error!(reason = %reason, "Setup failed: {}", message);
            }
        }
    }
}

/// Observer that keeps every event; handy for tests and front ends that
/// render a history.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<SetupEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SetupEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<SetupState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SetupEvent::PhaseChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl SetupObserver for RecordingObserver {
    fn on_event(&self, event: &SetupEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
