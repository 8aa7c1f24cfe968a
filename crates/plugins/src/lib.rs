//! Commands and group greetings shipped with Alya.
//!
//! [`PluginRegistry`] collects [`alya_bot::CommandDescriptor`]s in the order
//! the dispatcher evaluates them. The bundled set covers `ping`, `pause`,
//! `resume`, `alive` and `menu`; [`Greetings`] answers membership changes.

pub mod bundled;
pub mod error;
pub mod greetings;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    bundled::BundledPlugin,
    error::{Error, Result},
    greetings::Greetings,
    registry::{Plugin, PluginRegistry},
};
