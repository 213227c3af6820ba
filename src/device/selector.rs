//! Capture and forward endpoint selection

use super::{DeviceDescriptor, VirtualCableFilter};
use crate::backend::{AudioBackend, LoopbackEndpoint};
use crate::error::Result;
use tracing::{debug, info, warn};

/// Maximum number of endpoints reported by [`enumerate_endpoints`]
pub const MAX_ENDPOINTS: usize = 16;

/// Caller's endpoint choices, kept across init/stop cycles
///
/// `None` means "pick automatically": the system default output for capture,
/// the first other output for forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub capture_id: Option<String>,
    pub forward_id: Option<String>,
}

impl DeviceSelection {
    /// Select the first endpoint whose name contains `needle` as capture device
    ///
    /// The match is case-sensitive. On no match, or if enumeration fails, the
    /// capture selection is cleared and `false` is returned.
    pub fn select_capture_by_name(&mut self, backend: &dyn AudioBackend, needle: &str) -> bool {
        self.capture_id = None;

        let devices = match backend.enumerate_render_endpoints() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate endpoints: {}", e);
                return false;
            }
        };

        match devices.into_iter().find(|d| d.name.contains(needle)) {
            Some(device) => {
                info!("Selected capture device: {}", device);
                self.capture_id = Some(device.id);
                true
            }
            None => {
                info!("No endpoint name contains '{}'", needle);
                false
            }
        }
    }

    /// Store or clear the forward endpoint id
    pub fn set_forward_id(&mut self, device_id: Option<&str>) {
        self.forward_id = device_id.map(str::to_string);
    }
}

/// Active output endpoints, truncated to [`MAX_ENDPOINTS`]
pub fn enumerate_endpoints(backend: &dyn AudioBackend) -> Result<Vec<DeviceDescriptor>> {
    let mut devices = backend.enumerate_render_endpoints()?;
    if devices.len() > MAX_ENDPOINTS {
        debug!(
            "Truncating endpoint list from {} to {}",
            devices.len(),
            MAX_ENDPOINTS
        );
        devices.truncate(MAX_ENDPOINTS);
    }
    Ok(devices)
}

/// First endpoint whose name marks it as a virtual audio cable
pub fn find_virtual_cable(backend: &dyn AudioBackend) -> Option<DeviceDescriptor> {
    let devices = backend
        .enumerate_render_endpoints()
        .map_err(|e| warn!("Failed to enumerate endpoints: {}", e))
        .ok()?;

    devices
        .into_iter()
        .find(|d| VirtualCableFilter::is_virtual_cable(&d.name))
}

/// Open the endpoint to capture from
///
/// Uses the selected id when it can be opened, otherwise falls back to the
/// system default output.
pub fn resolve_capture_endpoint(
    backend: &dyn AudioBackend,
    selection: &DeviceSelection,
) -> Result<Box<dyn LoopbackEndpoint>> {
    if let Some(ref id) = selection.capture_id {
        match backend.open_loopback(id) {
            Ok(endpoint) => return Ok(endpoint),
            Err(e) => warn!(
                "Selected capture device {} unavailable ({}), falling back to default",
                id, e
            ),
        }
    }

    let default = backend.default_render_endpoint()?;
    debug!("Using default output for capture: {}", default);
    backend.open_loopback(&default.id)
}

/// Id of the endpoint to forward to, if any
///
/// An explicit selection equal to the capture device is ignored: forwarding
/// into the endpoint being captured would feed back into itself.
pub fn resolve_forward_id(
    backend: &dyn AudioBackend,
    selection: &DeviceSelection,
    capture_id: &str,
) -> Option<String> {
    if let Some(ref id) = selection.forward_id {
        if id == capture_id {
            warn!("Forward device is the capture device, forwarding disabled");
            return None;
        }
        return Some(id.clone());
    }

    match backend.enumerate_render_endpoints() {
        Ok(devices) => devices
            .into_iter()
            .find(|d| d.id != capture_id)
            .map(|d| d.id),
        Err(e) => {
            warn!("Failed to enumerate forward candidates: {}", e);
            None
        }
    }
}
