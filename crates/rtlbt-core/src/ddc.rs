//! Device configuration (DDC) blob walking.
//!
//! A DDC blob is a concatenation of self-sized records:
//! `length (u8, counts itself) | id (u16 LE) | value`.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::constants::MAX_COMMAND_PAYLOAD;

/// Length byte + identifier.
pub const DDC_RECORD_MIN_LEN: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DdcError {
    #[error("DDC record at offset {offset} declares {declared} bytes but only {remaining} remain")]
    RecordOverrun {
        offset: usize,
        declared: usize,
        remaining: usize,
    },
    #[error("DDC record at offset {offset} is too short ({declared} bytes)")]
    RecordTooShort { offset: usize, declared: usize },
    #[error("DDC record at offset {offset} is {declared} bytes, a write command carries at most {max}")]
    RecordTooLong {
        offset: usize,
        declared: usize,
        max: usize,
    },
}

/// One DDC record, length byte included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdcRecord<'a> {
    pub offset: usize,
    bytes: &'a [u8],
}

impl<'a> DdcRecord<'a> {
    pub fn id(&self) -> u16 {
        LittleEndian::read_u16(&self.bytes[1..3])
    }

    pub fn value(&self) -> &'a [u8] {
        &self.bytes[DDC_RECORD_MIN_LEN..]
    }

    /// The whole record as sent on the wire.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Iterator over the records of a DDC blob.
///
/// Yields an error once and then stops if a record is malformed.
pub struct DdcRecords<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> DdcRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for DdcRecords<'a> {
    type Item = Result<DdcRecord<'a>, DdcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let declared = self.data[self.offset] as usize;

        let err = if declared < DDC_RECORD_MIN_LEN {
            Some(DdcError::RecordTooShort {
                offset: self.offset,
                declared,
            })
        } else if declared > MAX_COMMAND_PAYLOAD {
            Some(DdcError::RecordTooLong {
                offset: self.offset,
                declared,
                max: MAX_COMMAND_PAYLOAD,
            })
        } else if declared > remaining {
            Some(DdcError::RecordOverrun {
                offset: self.offset,
                declared,
                remaining,
            })
        } else {
            None
        };
        if let Some(e) = err {
            self.failed = true;
            return Some(Err(e));
        }

        let record = DdcRecord {
            offset: self.offset,
            bytes: &self.data[self.offset..self.offset + declared],
        };
        self.offset += declared;
        Some(Ok(record))
    }
}

/// Validate a whole blob, returning its records.
pub fn parse_records(data: &[u8]) -> Result<Vec<DdcRecord<'_>>, DdcError> {
    DdcRecords::new(data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_records_stop_at_boundary() {
        let blob = [
            0x04, 0x01, 0x00, 0xAA, // id 1, 1 byte value
            0x03, 0x02, 0x00, // id 2, empty value
            0x06, 0x03, 0x01, 1, 2, 3, // id 0x0103, 3 byte value
        ];
        let records = parse_records(&blob).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id(), 0x0001);
        assert_eq!(records[0].value(), &[0xAA]);
        assert!(records[1].value().is_empty());
        assert_eq!(records[2].id(), 0x0103);
        assert_eq!(records[2].offset, 7);
        let end = records[2].offset + records[2].as_bytes().len();
        assert_eq!(end, blob.len());
    }

    #[test]
    fn test_last_record_overrun_fails() {
        let blob = [0x03, 0x01, 0x00, 0x09, 0x02, 0x00, 0x11];
        let err = parse_records(&blob).unwrap_err();
        assert_eq!(
            err,
            DdcError::RecordOverrun {
                offset: 3,
                declared: 9,
                remaining: 4
            }
        );
    }

    #[test]
    fn test_zero_length_record_does_not_loop() {
        let blob = [0x00, 0x01, 0x02];
        let mut iter = DdcRecords::new(&blob);
        assert!(matches!(
            iter.next(),
            Some(Err(DdcError::RecordTooShort { offset: 0, .. }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_record_larger_than_command_fails() {
        let mut blob = vec![0x03, 0x01, 0x00, 0xFF, 0x02, 0x00];
        blob.resize(3 + 255, 0x5A);
        assert_eq!(
            parse_records(&blob).unwrap_err(),
            DdcError::RecordTooLong {
                offset: 3,
                declared: 255,
                max: MAX_COMMAND_PAYLOAD
            }
        );

        // 253 bytes is the largest record a write command can carry.
        let mut blob = vec![0xFD, 0x01, 0x00];
        blob.resize(253, 0x00);
        assert_eq!(parse_records(&blob).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_blob() {
        assert!(parse_records(&[]).unwrap().is_empty());
    }
}
