//! Synchronous request/response exchanges over an [`HciTransport`].
//!
//! One command is in flight at a time. Every exchange takes a single
//! timeout that bounds each transport call it makes.

use std::time::Duration;
use tracing::{debug, instrument, trace};

use crate::error::SetupError;
use crate::protocol::constants::{EVENT_BUF_SIZE, HCI_OP_RTL_SECURE_SEND, RTL_FRAG_LEN};
use crate::protocol::{HciCommand, HciEvent};
use crate::transport::HciTransport;

/// Thin driver around a borrowed transport.
pub struct ProtocolEngine<'a, T: HciTransport> {
    transport: &'a T,
}

impl<'a, T: HciTransport> ProtocolEngine<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Send one command and return the next event.
    #[instrument(level = "debug", skip(self, cmd), fields(opcode = %format!("0x{:04x}", cmd.opcode())))]
    pub fn send_sync(&self, cmd: &HciCommand, timeout: Duration) -> Result<HciEvent, SetupError> {
        self.transport.send_command(&cmd.to_bytes(), timeout)?;
        let raw = self.transport.read_event(EVENT_BUF_SIZE, timeout)?;
        Ok(HciEvent::parse(&raw)?)
    }

    /// Send one command, then read events until one starts with `event_code`.
    ///
    /// Unrelated events are skipped. A read error or timeout ends the wait.
    #[instrument(level = "debug", skip(self, cmd), fields(opcode = %format!("0x{:04x}", cmd.opcode()), event = %format!("0x{:02x}", event_code)))]
    pub fn send_sync_until(
        &self,
        cmd: &HciCommand,
        event_code: u8,
        timeout: Duration,
    ) -> Result<HciEvent, SetupError> {
        self.transport.send_command(&cmd.to_bytes(), timeout)?;
        loop {
            let raw = self.transport.read_event(EVENT_BUF_SIZE, timeout)?;
            match raw.first() {
                Some(&code) if code == event_code => return Ok(HciEvent::parse(&raw)?),
                Some(&code) => {
                    debug!(code = %format!("0x{:02x}", code), "Skipping unrelated event");
                }
                None => trace!("Empty event"),
            }
        }
    }

    /// Write a command on the bulk channel and return one bulk response.
    pub fn bulk_sync(&self, cmd: &HciCommand, timeout: Duration) -> Result<Vec<u8>, SetupError> {
        self.transport.write_bulk(&cmd.to_bytes(), timeout)?;
        Ok(self.transport.read_bulk(EVENT_BUF_SIZE, timeout)?)
    }

    /// Send a command without waiting for any response.
    pub fn send_only(&self, cmd: &HciCommand, timeout: Duration) -> Result<(), SetupError> {
        self.transport.send_command(&cmd.to_bytes(), timeout)?;
        Ok(())
    }

    /// Send `data` as [`RTL_FRAG_LEN`]-byte chunks, each prefixed with
    /// `fragment_type`, checking the completion status of every chunk.
    #[instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub fn secure_send(
        &self,
        fragment_type: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), SetupError> {
        for (i, chunk) in data.chunks(RTL_FRAG_LEN).enumerate() {
            let cmd = HciCommand::secure_send(fragment_type, chunk)?;
            let event = self.send_sync(&cmd, timeout)?;
            event
                .command_complete(HCI_OP_RTL_SECURE_SEND)?
                .check_status()?;
            trace!(chunk = i, len = chunk.len(), "Secure send chunk acknowledged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use crate::protocol::constants::*;
    use crate::testutil::{bootup_event, command_complete};
    use crate::transport::{MockTransport, TransportError};

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_send_sync_returns_one_event() {
        let mock = MockTransport::new();
        mock.queue_event(&command_complete(HCI_OP_RTL_READ_ROM_VERSION, &[0x00, 0x01]));
        let engine = ProtocolEngine::new(&mock);

        let event = engine.send_sync(&HciCommand::read_rom_version(), T).unwrap();
        assert_eq!(event.code, HCI_EV_CMD_COMPLETE);
        assert_eq!(mock.get_commands(), vec![vec![0x6D, 0xFC, 0x00]]);
    }

    #[test]
    fn test_send_sync_timeout() {
        let mock = MockTransport::new();
        let engine = ProtocolEngine::new(&mock);
        let err = engine.send_sync(&HciCommand::read_rom_version(), T).unwrap_err();
        assert_eq!(err.reason(), FailureReason::Timeout);
    }

    #[test]
    fn test_send_sync_until_skips_unrelated_events() {
        let mock = MockTransport::new();
        mock.queue_event(&command_complete(HCI_OP_RTL_RESET, &[0x00]));
        mock.queue_event(&[0x13, 0x01, 0x00]);
        mock.queue_event(&bootup_event());
        let engine = ProtocolEngine::new(&mock);

        let cmd = HciCommand::reset(&crate::protocol::ResetParams::boot(0));
        let event = engine.send_sync_until(&cmd, HCI_EV_VENDOR, T).unwrap();
        assert_eq!(event.code, HCI_EV_VENDOR);
        assert_eq!(mock.pending_events(), 0);
    }

    #[test]
    fn test_send_sync_until_propagates_timeout() {
        let mock = MockTransport::new();
        mock.queue_event(&command_complete(HCI_OP_RTL_RESET, &[0x00]));
        let engine = ProtocolEngine::new(&mock);

        let cmd = HciCommand::reset(&crate::protocol::ResetParams::boot(0));
        let err = engine.send_sync_until(&cmd, HCI_EV_VENDOR, T).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_send_sync_until_stops_on_read_error() {
        let mock = MockTransport::new();
        mock.queue_event(&command_complete(HCI_OP_RTL_RESET, &[0x00]));
        mock.queue_event_error(TransportError::Disconnected);
        mock.queue_event(&bootup_event());
        let engine = ProtocolEngine::new(&mock);

        let cmd = HciCommand::reset(&crate::protocol::ResetParams::boot(0));
        let err = engine.send_sync_until(&cmd, HCI_EV_VENDOR, T).unwrap_err();
        assert_eq!(err.reason(), FailureReason::Transport);
        assert_eq!(mock.pending_events(), 1);
    }

    #[test]
    fn test_bulk_sync_uses_bulk_channel() {
        let mock = MockTransport::new();
        mock.queue_bulk(&command_complete(HCI_OP_RTL_DOWNLOAD_FW, &[0x00, 0x80]));
        let engine = ProtocolEngine::new(&mock);

        let cmd = HciCommand::download_fragment(0x80, &[1, 2, 3]).unwrap();
        let resp = engine.bulk_sync(&cmd, T).unwrap();
        assert_eq!(resp[0], HCI_EV_CMD_COMPLETE);
        assert!(mock.get_commands().is_empty());
        assert_eq!(mock.get_bulk_writes(), vec![vec![0x20, 0xFC, 0x04, 0x80, 1, 2, 3]]);
    }

    #[test]
    fn test_secure_send_chunks() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.queue_event(&command_complete(HCI_OP_RTL_SECURE_SEND, &[0x00]));
        }
        let engine = ProtocolEngine::new(&mock);

        let data = vec![0xAB; RTL_FRAG_LEN * 2 + 10];
        engine.secure_send(0x02, &data, T).unwrap();

        let cmds = mock.get_commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0][2] as usize, RTL_FRAG_LEN + 1);
        assert_eq!(cmds[0][3], 0x02);
        assert_eq!(cmds[2][2], 11);
    }

    #[test]
    fn test_secure_send_stops_on_bad_status() {
        let mock = MockTransport::new();
        mock.queue_event(&command_complete(HCI_OP_RTL_SECURE_SEND, &[0x12]));
        let engine = ProtocolEngine::new(&mock);

        let err = engine.secure_send(0x01, &[0u8; 300], T).unwrap_err();
        assert_eq!(err.reason(), FailureReason::Protocol);
        assert_eq!(mock.get_commands().len(), 1);
    }
}
