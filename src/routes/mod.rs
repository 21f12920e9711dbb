//! Router Module Index
//!
//! Routes are grouped by who is expected to call them. Access itself is decided per
//! handler by the authorization gate.

/// Reads, signup, activation, sign-in and commenting. Open to every actor.
pub mod public;

/// Self-service account management (own profile for regular users, any for admins).
pub mod members;

/// Post management and comment redaction. Admin only.
pub mod admin;
