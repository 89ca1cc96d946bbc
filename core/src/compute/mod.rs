/**
 * compute module
 * Remote compute backends: descriptors plus the thin persistence and
 * transport collaborators the controller talks through
 */

pub mod descriptor;
pub mod store;
pub mod transport;

pub use descriptor::ComputeDescriptor;
pub use store::{ComputeStore, JsonComputeStore};
pub use transport::{ComputeTransport, HttpTransport};
