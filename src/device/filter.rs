//! Virtual cable device detection

/// Name markers of known virtual audio cable drivers (case-sensitive)
const VIRTUAL_CABLE_MARKERS: &[&str] = &["CABLE", "VB-Audio"];

/// Filter for identifying virtual audio cable endpoints
pub struct VirtualCableFilter;

impl VirtualCableFilter {
    /// Check if a device name indicates a virtual cable
    pub fn is_virtual_cable(name: &str) -> bool {
        VIRTUAL_CABLE_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_cable_detection() {
        assert!(VirtualCableFilter::is_virtual_cable(
            "CABLE Input (VB-Audio Virtual Cable)"
        ));
        assert!(VirtualCableFilter::is_virtual_cable("VB-Audio Point"));
        assert!(VirtualCableFilter::is_virtual_cable("Hi-Fi CABLE Input"));
        assert!(!VirtualCableFilter::is_virtual_cable("Realtek Audio"));
        assert!(!VirtualCableFilter::is_virtual_cable("Speakers"));
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert!(!VirtualCableFilter::is_virtual_cable("Cable Modem Audio"));
        assert!(!VirtualCableFilter::is_virtual_cable("vb-audio point"));
    }
}
