//! Patch fragmentation for the download command.
//!
//! A patch is cut at [`RTL_FRAG_LEN`] boundaries. Each fragment carries an
//! index byte: bits 0-6 count fragments modulo 128, bit 7 marks the last one.

use crate::protocol::constants::{FRAG_FINAL_FLAG, FRAG_INDEX_MASK, RTL_FRAG_LEN};

/// One download fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Position in the patch, not wrapped.
    pub seq: usize,
    pub is_final: bool,
    pub data: &'a [u8],
}

impl Fragment<'_> {
    /// Index byte as sent on the wire.
    pub fn index(&self) -> u8 {
        let index = (self.seq as u8) & FRAG_INDEX_MASK;
        if self.is_final {
            index | FRAG_FINAL_FLAG
        } else {
            index
        }
    }
}

/// Iterator over download fragments.
pub struct Fragments<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    seq: usize,
}

impl<'a> Fragments<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_chunk_size(data, RTL_FRAG_LEN)
    }

    pub fn with_chunk_size(data: &'a [u8], chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            offset: 0,
            seq: 0,
        }
    }

    /// Total number of fragments.
    pub fn total(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let len = remaining.min(self.chunk_size);
        let fragment = Fragment {
            seq: self.seq,
            is_final: len == remaining,
            data: &self.data[self.offset..self.offset + len],
        };
        self.offset += len;
        self.seq += 1;

        Some(fragment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.data.len() - self.offset).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Fragments<'_> {}
