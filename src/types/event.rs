//! Tag read event types

use serde::{Deserialize, Serialize};

/// One reader observation of a passive tag.
///
/// Emitted by the reader collaborator and appended to the event buffer.
/// Never mutated once buffered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    /// Tag EPC, stable per physical tag
    pub tag_id: String,
    /// Reader clock, microseconds since an arbitrary epoch
    pub timestamp_micros: i64,
    /// Carrier frequency the read was taken on (MHz)
    pub channel_mhz: f64,
    /// Wrapped phase angle (degrees, [0, 360))
    pub phase_degrees: f64,
    /// Peak signal strength (dBm)
    pub rssi_dbm: f64,
}

impl TagEvent {
    pub fn new(
        tag_id: impl Into<String>,
        timestamp_micros: i64,
        channel_mhz: f64,
        phase_degrees: f64,
        rssi_dbm: f64,
    ) -> Self {
        Self {
            tag_id: tag_id.into(),
            timestamp_micros,
            channel_mhz,
            phase_degrees,
            rssi_dbm,
        }
    }

    /// Exact-match key for the channel this event was read on.
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::from_mhz(self.channel_mhz)
    }
}

/// Hashable, ordered key for a reader channel.
///
/// Frequency-hopping readers emit a small fixed set of carrier frequencies,
/// so channels are matched on the exact bit pattern of the reported value.
/// `-0.0` is normalised to `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(u64);

impl ChannelKey {
    pub fn from_mhz(mhz: f64) -> Self {
        let normalised = if mhz == 0.0 { 0.0 } else { mhz };
        Self(normalised.to_bits())
    }

    pub fn mhz(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} MHz", self.mhz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_key_exact_match() {
        let a = TagEvent::new("A", 0, 902.75, 10.0, -50.0);
        let b = TagEvent::new("B", 5, 902.75, 20.0, -52.0);
        let c = TagEvent::new("B", 9, 903.25, 20.0, -52.0);

        assert_eq!(a.channel_key(), b.channel_key());
        assert_ne!(a.channel_key(), c.channel_key());
        assert_eq!(a.channel_key().mhz(), 902.75);
    }

    #[test]
    fn test_channel_key_negative_zero() {
        assert_eq!(ChannelKey::from_mhz(-0.0), ChannelKey::from_mhz(0.0));
    }
}
