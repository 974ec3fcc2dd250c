//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::HandlerContext;
pub use machine::{SetupContext, SetupState};
