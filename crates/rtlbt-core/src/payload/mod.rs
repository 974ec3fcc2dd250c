//! Payload handling - fragmentation of data sent to the device.

pub mod fragment;

pub use fragment::{Fragment, Fragments};
