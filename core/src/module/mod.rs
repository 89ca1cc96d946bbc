/**
 * module module
 * Pluggable emulator backends managed as exactly-once-started singletons
 */

mod handle;
mod registry;

pub use handle::{EmulatorModule, ModuleHandle};
pub use registry::ModuleRegistry;
