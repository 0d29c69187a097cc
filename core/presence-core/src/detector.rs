//! Peripheral presence from two independent signals.
//!
//! USB enumeration can outlive a disabled display, and a display entry can
//! stay listed while offline. Either signal alone gives false positives, so
//! the peripheral counts as present only when both agree.

use crate::config::DetectionConfig;
use crate::inventory::InventoryQuery;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PresenceSignal {
    pub on_bus: bool,
    pub listed_as_display: bool,
}

impl PresenceSignal {
    pub fn present(&self) -> bool {
        self.on_bus && self.listed_as_display
    }
}

/// Substrings the inventory text is scanned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMarkers {
    pub product: String,
    pub brand: String,
    pub online: String,
}

impl From<&DetectionConfig> for PresenceMarkers {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            product: config.product_marker.clone(),
            brand: config.brand_marker.clone(),
            online: config.online_marker.clone(),
        }
    }
}

#[derive(Debug)]
pub struct PresenceDetector<Q: InventoryQuery> {
    query: Q,
    markers: PresenceMarkers,
}

impl<Q: InventoryQuery> PresenceDetector<Q> {
    pub fn new(query: Q, markers: PresenceMarkers) -> Self {
        Self { query, markers }
    }

    /// Queries both inventories. Never cached.
    pub fn signal(&self) -> PresenceSignal {
        let signal = PresenceSignal {
            on_bus: self.bus_check(),
            listed_as_display: self.display_check(),
        };
        debug!(
            usb = signal.on_bus,
            display = signal.listed_as_display,
            "Presence evaluated"
        );
        signal
    }

    pub fn detect(&self) -> bool {
        self.signal().present()
    }

    fn bus_check(&self) -> bool {
        match self.query.usb_devices() {
            Ok(text) => text.contains(&self.markers.product),
            Err(err) => {
                warn!(error = %err, "USB inventory query failed; treating as absent");
                false
            }
        }
    }

    fn display_check(&self) -> bool {
        match self.query.displays() {
            Ok(text) => text.contains(&self.markers.brand) && text.contains(&self.markers.online),
            Err(err) => {
                warn!(error = %err, "Display inventory query failed; treating as absent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PresenceError, Result};
    use std::cell::Cell;

    struct FixedInventory {
        usb: Option<&'static str>,
        displays: Option<&'static str>,
        calls: Cell<u32>,
    }

    impl FixedInventory {
        fn new(usb: Option<&'static str>, displays: Option<&'static str>) -> Self {
            Self {
                usb,
                displays,
                calls: Cell::new(0),
            }
        }
    }

    fn failed() -> PresenceError {
        PresenceError::CommandFailed {
            command: "fixture".to_string(),
            details: "exit status 1".to_string(),
        }
    }

    impl InventoryQuery for FixedInventory {
        fn usb_devices(&self) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            self.usb.map(str::to_string).ok_or_else(failed)
        }

        fn displays(&self) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            self.displays.map(str::to_string).ok_or_else(failed)
        }
    }

    const USB_PRESENT: &str = "+-o VITURE Pro XR Glasses@01100000";
    const USB_ABSENT: &str = "+-o USB3.1 Hub@01100000";
    const DISPLAY_ONLINE: &str = "VITURE:\n  Resolution: 3840 x 1080\n  Online: Yes";
    const DISPLAY_OFFLINE: &str = "VITURE:\n  Online: No";

    fn detector(
        usb: Option<&'static str>,
        displays: Option<&'static str>,
    ) -> PresenceDetector<FixedInventory> {
        PresenceDetector::new(
            FixedInventory::new(usb, displays),
            PresenceMarkers::from(&DetectionConfig::default()),
        )
    }

    #[test]
    fn present_requires_both_signals() {
        let cases = [
            (USB_ABSENT, DISPLAY_OFFLINE, false, false),
            (USB_PRESENT, DISPLAY_OFFLINE, true, false),
            (USB_ABSENT, DISPLAY_ONLINE, false, true),
            (USB_PRESENT, DISPLAY_ONLINE, true, true),
        ];

        for (usb, displays, on_bus, listed) in cases {
            let signal = detector(Some(usb), Some(displays)).signal();
            assert_eq!(signal.on_bus, on_bus);
            assert_eq!(signal.listed_as_display, listed);
            assert_eq!(signal.present(), on_bus && listed);
        }
    }

    #[test]
    fn online_marker_without_brand_is_not_listed() {
        let signal = detector(Some(USB_PRESENT), Some("Color LCD:\n  Online: Yes")).signal();
        assert!(!signal.listed_as_display);
    }

    #[test]
    fn query_failure_counts_as_absent() {
        assert!(!detector(None, Some(DISPLAY_ONLINE)).detect());
        assert!(!detector(Some(USB_PRESENT), None).detect());
    }

    #[test]
    fn every_detect_queries_both_inventories() {
        let detector = detector(Some(USB_ABSENT), Some(DISPLAY_ONLINE));
        detector.detect();
        detector.detect();
        assert_eq!(detector.query.calls.get(), 4);
    }
}
