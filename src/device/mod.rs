//! Output endpoint descriptors and selection

mod filter;
mod selector;

pub use filter::VirtualCableFilter;
pub use selector::{
    enumerate_endpoints, find_virtual_cable, resolve_capture_endpoint, resolve_forward_id,
    DeviceSelection, MAX_ENDPOINTS,
};

/// Read-only snapshot of an output endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Opaque native endpoint id
    pub id: String,
    /// Human-readable name
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
