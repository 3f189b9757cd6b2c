//! Architecture-specific implementations.
//!
//! This module provides [`rtx_hal::ContextSwitch`] backends for the supported
//! target architectures. Currently supported: ARMv7-A.
//!
//! Frame layouts are plain data and build on every host, so they can be
//! checked by unit tests. The switch routines only exist on the target.

pub mod armv7a;

pub use armv7a::{Armv7a, Psr};
