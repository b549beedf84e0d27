// # DOM Sensor Implementations
//
// This module provides implementations of the DomSensor trait for running
// the bridge outside a browser.

pub mod memory;
pub mod spec;

pub use memory::MemoryDom;
pub use spec::NodeSpec;
