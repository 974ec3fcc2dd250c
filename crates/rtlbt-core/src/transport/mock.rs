//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{HciTransport, TransportError};
use crate::protocol::constants::REALTEK_VENDOR_ID;

/// Mock transport for unit testing the protocol engine and sequencer.
///
/// Clones share state, so a test can keep a handle after moving one
/// into a session. An empty response queue reads as a timeout.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued events (or read failures) for the notification channel.
    event_queue: Arc<Mutex<VecDeque<Result<Vec<u8>, TransportError>>>>,
    /// Queued bulk responses.
    bulk_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured control commands.
    command_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Captured bulk writes.
    bulk_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Opcodes whose next send should fail.
    failing_opcodes: Arc<Mutex<Vec<u16>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            event_queue: Arc::new(Mutex::new(VecDeque::new())),
            bulk_queue: Arc::new(Mutex::new(VecDeque::new())),
            command_log: Arc::new(Mutex::new(Vec::new())),
            bulk_log: Arc::new(Mutex::new(Vec::new())),
            failing_opcodes: Arc::new(Mutex::new(Vec::new())),
            vid: REALTEK_VENDOR_ID,
            pid: 0xB723,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue an event to be returned on the next notification read.
    pub fn queue_event(&self, event: &[u8]) {
        self.event_queue.lock().unwrap().push_back(Ok(event.to_vec()));
    }

    /// Make the next notification read fail with `error`.
    pub fn queue_event_error(&self, error: TransportError) {
        self.event_queue.lock().unwrap().push_back(Err(error));
    }

    /// Queue a response to be returned on the next bulk read.
    pub fn queue_bulk(&self, response: &[u8]) {
        self.bulk_queue.lock().unwrap().push_back(response.to_vec());
    }

    /// Make the next control send or bulk write of `opcode` fail.
    ///
    /// Each call arms one failure; later sends of the opcode go through.
    pub fn fail_opcode(&self, opcode: u16) {
        self.failing_opcodes.lock().unwrap().push(opcode);
    }

    /// Get all captured control commands.
    pub fn get_commands(&self) -> Vec<Vec<u8>> {
        self.command_log.lock().unwrap().clone()
    }

    /// Opcodes of all captured control commands, in order.
    pub fn command_opcodes(&self) -> Vec<u16> {
        self.get_commands()
            .iter()
            .filter_map(|c| c.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]])))
            .collect()
    }

    /// Get all captured bulk writes.
    pub fn get_bulk_writes(&self) -> Vec<Vec<u8>> {
        self.bulk_log.lock().unwrap().clone()
    }

    /// Events still waiting to be read.
    pub fn pending_events(&self) -> usize {
        self.event_queue.lock().unwrap().len()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Set VID/PID.
    pub fn set_ids(&mut self, vid: u16, pid: u16) {
        self.vid = vid;
        self.pid = pid;
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if *self.connected.lock().unwrap() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    fn check_opcode(&self, packet: &[u8]) -> Result<(), TransportError> {
        let Some(op) = packet.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]])) else {
            return Ok(());
        };
        let mut failing = self.failing_opcodes.lock().unwrap();
        if let Some(pos) = failing.iter().position(|&o| o == op) {
            failing.remove(pos);
            return Err(TransportError::WriteFailed(format!(
                "injected failure for 0x{:04X}",
                op
            )));
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HciTransport for MockTransport {
    fn send_command(&self, packet: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        self.check_connected()?;
        self.check_opcode(packet)?;
        self.command_log.lock().unwrap().push(packet.to_vec());
        Ok(())
    }

    fn read_event(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        let mut event = self
            .event_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::timeout(timeout))??;
        event.truncate(max_len);
        Ok(event)
    }

    fn write_bulk(&self, data: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        self.check_connected()?;
        self.check_opcode(data)?;
        self.bulk_log.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn read_bulk(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        let mut response = self
            .bulk_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::timeout(timeout))?;
        response.truncate(max_len);
        Ok(response)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_event_queue() {
        let mock = MockTransport::new();
        mock.queue_event(&[0x0E, 0x00]);
        mock.queue_event(&[0xFF, 0x00]);

        assert_eq!(mock.read_event(256, T).unwrap(), vec![0x0E, 0x00]);
        assert_eq!(mock.read_event(256, T).unwrap(), vec![0xFF, 0x00]);

        // Queue is empty now
        assert!(mock.read_event(256, T).unwrap_err().is_timeout());
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        let handle = mock.clone();
        mock.send_command(&[0x6D, 0xFC, 0x00], T).unwrap();
        mock.write_bulk(&[0x20, 0xFC, 0x01, 0x80], T).unwrap();

        assert_eq!(handle.command_opcodes(), vec![0xFC6D]);
        assert_eq!(handle.get_bulk_writes().len(), 1);
    }

    #[test]
    fn test_mock_injected_failure() {
        let mock = MockTransport::new();
        mock.fail_opcode(0xFC01);
        assert!(mock.send_command(&[0x01, 0xFC, 0x00], T).is_err());
        assert!(mock.get_commands().is_empty());

        // One-shot: the next send of the same opcode succeeds.
        mock.send_command(&[0x01, 0xFC, 0x00], T).unwrap();
        assert_eq!(mock.command_opcodes(), vec![0xFC01]);
    }

    #[test]
    fn test_mock_queued_read_error() {
        let mock = MockTransport::new();
        mock.queue_event(&[0x0E, 0x00]);
        mock.queue_event_error(TransportError::Disconnected);
        assert_eq!(mock.pending_events(), 2);

        assert!(mock.read_event(256, T).is_ok());
        assert!(matches!(
            mock.read_event(256, T),
            Err(TransportError::Disconnected)
        ));
        assert!(mock.read_event(256, T).unwrap_err().is_timeout());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(
            mock.send_command(b"test", T),
            Err(TransportError::Disconnected)
        ));
    }
}
