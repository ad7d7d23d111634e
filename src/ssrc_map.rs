//! Concurrent SSRC → user id correlation, populated from `Speaking`
//! announcements and consulted by the receiver loop.

use dashmap::DashMap;

/// Maps RTP SSRC to the user id that announced it.
///
/// Monotonically grown: entries are only ever inserted or overwritten, never
/// removed, so a lookup made before disposal never loses a previously
/// inserted entry.
#[derive(Default)]
pub struct SsrcMap {
    inner: DashMap<u32, u64>,
}

impl SsrcMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the user id behind `ssrc`.
    pub fn insert(&self, ssrc: u32, user_id: u64) {
        self.inner.insert(ssrc, user_id);
    }

    /// Look up the user id behind `ssrc`, if known.
    pub fn get(&self, ssrc: u32) -> Option<u64> {
        self.inner.get(&ssrc).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let map = SsrcMap::new();
        map.insert(42, 100);
        assert_eq!(map.get(42), Some(100));
        assert_eq!(map.get(99), None);
    }

    #[test]
    fn reannouncing_an_ssrc_overwrites_the_entry() {
        let map = SsrcMap::new();
        map.insert(42, 100);
        map.insert(42, 200);
        assert_eq!(map.get(42), Some(200));
    }
}
