//! Registrar implementations that ship with the core crate.

mod mock;

pub use mock::MockRegistrar;
