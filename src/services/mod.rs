//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own session state, profile persistence, and calls to
//! external endpoints so route handlers can stay focused on protocol
//! translation and cookie plumbing.

pub mod profile;
pub mod registry;
pub mod session;
pub mod setup;
