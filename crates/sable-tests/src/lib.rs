//! Cross-crate test support for Sable.

pub mod helpers;
