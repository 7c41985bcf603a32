use serde::{Deserialize, Serialize};
use std::fmt;

/// A vendor or product identifier to match, or the ANY sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchId {
    /// Matches every identifier
    #[default]
    Any,
    /// Matches exactly this 16-bit identifier
    Id(u16),
}

impl MatchId {
    pub fn matches(&self, value: u16) -> bool {
        match self {
            MatchId::Any => true,
            MatchId::Id(id) => *id == value,
        }
    }

    /// The concrete identifier, or `None` for ANY
    pub fn id(&self) -> Option<u16> {
        match self {
            MatchId::Any => None,
            MatchId::Id(id) => Some(*id),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, MatchId::Any)
    }
}

impl From<u16> for MatchId {
    fn from(id: u16) -> Self {
        MatchId::Id(id)
    }
}

impl From<Option<u16>> for MatchId {
    fn from(id: Option<u16>) -> Self {
        id.map_or(MatchId::Any, MatchId::Id)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchId::Any => write!(f, "*"),
            MatchId::Id(id) => write!(f, "{:04x}", id),
        }
    }
}

/// Event mask handed to the native layer; one bit per event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const ARRIVED: EventMask = EventMask(0x01);
    pub const LEFT: EventMask = EventMask(0x02);
    pub const BOTH: EventMask = EventMask(0x03);

    pub fn from_flags(arrived: bool, left: bool) -> Self {
        let mut mask = EventMask::NONE;
        if arrived {
            mask = mask | EventMask::ARRIVED;
        }
        if left {
            mask = mask | EventMask::LEFT;
        }
        mask
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: EventMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// The most recently requested registration: event kinds plus identity filter.
///
/// Any combination is accepted, including a mask with neither bit set. Such a
/// registration is legal and simply never notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HotplugFilter {
    pub events: EventMask,
    pub vendor_id: MatchId,
    pub product_id: MatchId,
}

impl HotplugFilter {
    pub fn new(arrived: bool, left: bool, vendor_id: MatchId, product_id: MatchId) -> Self {
        Self {
            events: EventMask::from_flags(arrived, left),
            vendor_id,
            product_id,
        }
    }

    /// Both event kinds, any device
    pub fn all() -> Self {
        Self::new(true, true, MatchId::Any, MatchId::Any)
    }

    pub fn wants_arrived(&self) -> bool {
        self.events.contains(EventMask::ARRIVED)
    }

    pub fn wants_left(&self) -> bool {
        self.events.contains(EventMask::LEFT)
    }

    /// Identity match only; event kind gating is separate.
    pub fn matches_device(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.matches(vendor_id) && self.product_id.matches(product_id)
    }
}

impl fmt::Display for HotplugFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} arrived={} left={}",
            self.vendor_id,
            self.product_id,
            self.wants_arrived(),
            self.wants_left()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_any() {
        assert!(MatchId::Any.matches(0x0000));
        assert!(MatchId::Any.matches(0xffff));
        assert!(MatchId::Id(0x1234).matches(0x1234));
        assert!(!MatchId::Id(0x1234).matches(0x1235));
    }

    #[test]
    fn test_match_id_conversions() {
        assert_eq!(MatchId::from(0x18d1), MatchId::Id(0x18d1));
        assert_eq!(MatchId::from(None), MatchId::Any);
        assert_eq!(MatchId::from(Some(0x067b)).id(), Some(0x067b));
        assert_eq!(MatchId::default(), MatchId::Any);
    }

    #[test]
    fn test_event_mask_from_flags() {
        assert_eq!(EventMask::from_flags(true, true), EventMask::BOTH);
        assert_eq!(EventMask::from_flags(true, false), EventMask::ARRIVED);
        assert_eq!(EventMask::from_flags(false, true), EventMask::LEFT);
        assert!(EventMask::from_flags(false, false).is_empty());
        assert_eq!(EventMask::BOTH.bits(), 0x03);
    }

    #[test]
    fn test_empty_mask_contains_nothing() {
        let mask = EventMask::NONE;
        assert!(!mask.contains(EventMask::ARRIVED));
        assert!(!mask.contains(EventMask::LEFT));
        assert!(!EventMask::BOTH.contains(EventMask::NONE));
    }

    #[test]
    fn test_filter_matching() {
        let filter = HotplugFilter::new(true, false, MatchId::Id(0x1234), MatchId::Any);
        assert!(filter.wants_arrived());
        assert!(!filter.wants_left());
        assert!(filter.matches_device(0x1234, 0x0001));
        assert!(filter.matches_device(0x1234, 0xbeef));
        assert!(!filter.matches_device(0x4321, 0x0001));
    }

    #[test]
    fn test_filter_display() {
        let filter = HotplugFilter::new(true, true, MatchId::Id(0x18d1), MatchId::Any);
        assert_eq!(filter.to_string(), "18d1:* arrived=true left=true");
    }
}
