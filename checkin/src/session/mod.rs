//! Scan session state machine.
//!
//! The session ties the pieces of the scanner together: it acquires the
//! camera, listens to the decode stream, routes decoded text through the
//! parser into confirmation, pauses while a check-in resolves, resumes after
//! a success and restarts the camera when the layout changes.
//!
//! ## Module Structure
//!
//! - [`types`]: State and cancellation ids
//! - [`actions`]: Everything that can happen to a session
//! - [`environment`]: External dependencies
//! - [`reducer`]: Transition logic
//! - [`store`]: Runtime wrapper used by front ends

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod store;
pub mod types;


pub use actions::ScanAction;
pub use environment::ScanEnvironment;
pub use reducer::ScanSessionReducer;
pub use store::ScanSessionStore;
pub use types::{
    AUTO_RESUME, DECODE_STREAM, ORIENTATION_SETTLE, RESTART_DEBOUNCE, ScanSession, ScanState,
    ScanStatus, TicketId,
};
