//! In-memory state management for the CatchUp relationship manager's
//! bulk edits: a single-slot undo store, the countdown toast that
//! drives it, and the rolling transcript buffer for voice notes.
//!
//! The crate is purely in-process. Persistence and API round-trips live
//! in the restore capability the caller supplies (see
//! [`undo::RestoreAction`]); rendering lives in the embedding UI.

pub mod model;
pub mod transcript;
pub mod undo;
