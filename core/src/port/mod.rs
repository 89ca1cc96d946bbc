/**
 * port module
 * Collision-free TCP/UDP port allocation with per-owner tracking
 */

pub mod allocator;

pub use allocator::{PortAllocation, PortAllocator, PortRange, Protocol};
