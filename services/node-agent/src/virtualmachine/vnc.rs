//! VNC display allocation.
//!
//! Process-local set of display indices in use on this host. Rebuilt
//! empty on agent restart; running VMs reclaim nothing, but the allocator
//! only needs to keep two concurrently launched VMs apart.

use std::collections::HashSet;

/// Websocket port for display N is `6900 + N`.
pub const WEBSOCKET_PORT_BASE: u32 = 6900;

const MAX_DISPLAYS: u32 = 1000;

#[derive(Debug, Default)]
pub struct VncDisplays {
    used: HashSet<u32>,
}

impl VncDisplays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the first unused display in 0..1000.
    pub fn allocate(&mut self) -> Option<u32> {
        let display = (0..MAX_DISPLAYS).find(|display| !self.used.contains(display))?;
        self.used.insert(display);
        Some(display)
    }

    pub fn release(&mut self, display: u32) {
        self.used.remove(&display);
    }

    pub fn websocket_port(display: u32) -> u32 {
        WEBSOCKET_PORT_BASE + display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_distinct() {
        let mut displays = VncDisplays::new();
        let first = displays.allocate().unwrap();
        let second = displays.allocate().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_released_display_is_reused() {
        let mut displays = VncDisplays::new();
        let first = displays.allocate().unwrap();
        let _second = displays.allocate().unwrap();

        displays.release(first);
        let third = displays.allocate().unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn test_scan_starts_at_zero() {
        let mut displays = VncDisplays::new();
        assert_eq!(displays.allocate(), Some(0));
        assert_eq!(displays.allocate(), Some(1));
    }

    #[test]
    fn test_exhaustion() {
        let mut displays = VncDisplays::new();
        for _ in 0..MAX_DISPLAYS {
            assert!(displays.allocate().is_some());
        }
        assert_eq!(displays.allocate(), None);
    }

    #[test]
    fn test_websocket_port() {
        assert_eq!(VncDisplays::websocket_port(0), 6900);
        assert_eq!(VncDisplays::websocket_port(42), 6942);
    }
}
