//! Core traits for the purchase-option bridge
//!
//! This module defines the abstract interfaces the bridge is wired through.
//!
//! - [`DomSensor`]: Passive reads and mutation subscriptions on the host document
//! - [`EventDispatcher`]: Delivery of domain events onto the host event bus

pub mod dispatcher;
pub mod dom_sensor;

pub use dispatcher::{ChannelDispatcher, EventDispatcher};
pub use dom_sensor::{
    DomSensor, MutationRecord, NodeId, ObserveOptions, Registration, Watcher, descendants,
    find_descendant, has_token, is_inclusive_ancestor,
};
