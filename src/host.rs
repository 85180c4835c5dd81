//! Host-node adapter boundary.
//!
//! The engine never assumes a concrete tree-node representation. The host
//! environment supplies a node-identity predicate and a getter/setter pair
//! for one named property on its node type; the deserializer uses the
//! getter to confirm a tree address can be re-located, and the rendering
//! walker uses the setter to stamp engine bookkeeping onto nodes it owns.

use crate::types::Value;

/// Capabilities the host environment provides for its node type.
pub trait NodeHost {
    /// Whether a value stands for a tree node.
    fn is_node_ref(&self, value: &Value) -> bool {
        matches!(value, Value::NodeRef(_))
    }

    /// Read a named property off the node at a tree address.
    fn get_prop(&self, address: &str, name: &str) -> Option<String>;

    /// Write a named property on the node at a tree address.
    fn set_prop(&mut self, address: &str, name: &str, value: &str);
}

/// Host that knows no nodes. Useful for tests and for deserializing state
/// without a rendered tree attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl NodeHost for NullHost {
    fn get_prop(&self, _address: &str, _name: &str) -> Option<String> {
        None
    }

    fn set_prop(&mut self, _address: &str, _name: &str, _value: &str) {}
}
