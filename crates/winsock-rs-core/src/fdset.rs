//! Wire-format socket sets.
//!
//! Applications hand socket sets across the API as a count followed by a
//! fixed array of 64 handle slots. Legacy narrow callers use 16-bit counts
//! and handles; current wide callers use 32-bit. The two are distinguished
//! by an explicit format flag, never guessed.

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Capacity of a wire socket set.
pub const WS_FD_SETSIZE: usize = 64;

/// Field width of a wire socket set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFormat {
    /// 16-bit count and handles.
    Narrow,
    /// 32-bit count and handles.
    Wide,
}

impl SetFormat {
    /// Encoded size in bytes: count field plus the full handle array.
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        match self {
            SetFormat::Narrow => 2 + WS_FD_SETSIZE * 2,
            SetFormat::Wide => 4 + WS_FD_SETSIZE * 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire set
// ---------------------------------------------------------------------------

/// A decoded wire socket set. Position order is significant: the select
/// translator records per-position resolution results and compacts in
/// place, exactly as the wire contract requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFdSet {
    format: SetFormat,
    handles: Vec<u32>,
}

impl WireFdSet {
    #[must_use]
    pub const fn new(format: SetFormat) -> Self {
        Self {
            format,
            handles: Vec::new(),
        }
    }

    /// Builds a set from handles; fails when the count exceeds the wire
    /// capacity.
    #[must_use]
    pub fn with_handles(format: SetFormat, handles: &[u32]) -> Option<Self> {
        if handles.len() > WS_FD_SETSIZE {
            return None;
        }
        Some(Self {
            format,
            handles: handles.to_vec(),
        })
    }

    #[must_use]
    pub const fn format(&self) -> SetFormat {
        self.format
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn handles(&self) -> &[u32] {
        &self.handles
    }

    /// Membership test: scans the populated entries for the handle.
    #[must_use]
    pub fn contains(&self, handle: u32) -> bool {
        self.handles.iter().any(|&h| h == handle)
    }

    /// Appends a handle if capacity remains. Returns whether it was added.
    pub fn push(&mut self, handle: u32) -> bool {
        if self.handles.len() >= WS_FD_SETSIZE {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Empties the set (count drops to zero; the wire array contents are
    /// dead storage once the count says so).
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// In-place compaction: keeps only the positions `keep` approves,
    /// preserving order.
    pub fn retain_positions(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mut pos = 0;
        self.handles.retain(|_| {
            let keep_it = keep(pos);
            pos += 1;
            keep_it
        });
    }

    /// Encodes to the wire layout: count, then all 64 slots (unused slots
    /// zeroed). Narrow handles are truncated to 16 bits on the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.format.encoded_len()];
        match self.format {
            SetFormat::Narrow => {
                out[..2].copy_from_slice(&(self.handles.len() as u16).to_le_bytes());
                for (i, &h) in self.handles.iter().enumerate() {
                    out[2 + i * 2..4 + i * 2].copy_from_slice(&(h as u16).to_le_bytes());
                }
            }
            SetFormat::Wide => {
                out[..4].copy_from_slice(&(self.handles.len() as u32).to_le_bytes());
                for (i, &h) in self.handles.iter().enumerate() {
                    out[4 + i * 4..8 + i * 4].copy_from_slice(&h.to_le_bytes());
                }
            }
        }
        out
    }

    /// Decodes from the wire layout. Rejects truncated buffers and counts
    /// beyond the wire capacity.
    #[must_use]
    pub fn decode(bytes: &[u8], format: SetFormat) -> Option<Self> {
        if bytes.len() < format.encoded_len() {
            return None;
        }
        let (count, mut handles) = match format {
            SetFormat::Narrow => {
                let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
                let handles = (0..WS_FD_SETSIZE)
                    .map(|i| u16::from_le_bytes([bytes[2 + i * 2], bytes[3 + i * 2]]) as u32)
                    .collect::<Vec<_>>();
                (count, handles)
            }
            SetFormat::Wide => {
                let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
                let handles = (0..WS_FD_SETSIZE)
                    .map(|i| {
                        u32::from_le_bytes([
                            bytes[4 + i * 4],
                            bytes[5 + i * 4],
                            bytes[6 + i * 4],
                            bytes[7 + i * 4],
                        ])
                    })
                    .collect::<Vec<_>>();
                (count, handles)
            }
        };
        if count > WS_FD_SETSIZE {
            return None;
        }
        handles.truncate(count);
        Some(Self { format, handles })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_sizes() {
        assert_eq!(SetFormat::Narrow.encoded_len(), 130);
        assert_eq!(SetFormat::Wide.encoded_len(), 260);
    }

    #[test]
    fn wide_round_trip() {
        let set = WireFdSet::with_handles(SetFormat::Wide, &[7, 90000, 3]).unwrap();
        let decoded = WireFdSet::decode(&set.encode(), SetFormat::Wide).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn narrow_round_trip_truncates_to_u16() {
        let set = WireFdSet::with_handles(SetFormat::Narrow, &[7, 0x1234, 0xFFFF]).unwrap();
        let decoded = WireFdSet::decode(&set.encode(), SetFormat::Narrow).unwrap();
        assert_eq!(decoded.handles(), &[7, 0x1234, 0xFFFF]);
    }

    #[test]
    fn decode_rejects_truncated_buffers() {
        assert!(WireFdSet::decode(&[0u8; 129], SetFormat::Narrow).is_none());
        assert!(WireFdSet::decode(&[0u8; 259], SetFormat::Wide).is_none());
    }

    #[test]
    fn decode_rejects_oversized_count() {
        let mut bytes = vec![0u8; SetFormat::Wide.encoded_len()];
        bytes[..4].copy_from_slice(&(WS_FD_SETSIZE as u32 + 1).to_le_bytes());
        assert!(WireFdSet::decode(&bytes, SetFormat::Wide).is_none());
    }

    #[test]
    fn capacity_is_enforced() {
        let too_many: Vec<u32> = (0..WS_FD_SETSIZE as u32 + 1).collect();
        assert!(WireFdSet::with_handles(SetFormat::Wide, &too_many).is_none());

        let mut set = WireFdSet::with_handles(
            SetFormat::Wide,
            &(0..WS_FD_SETSIZE as u32).collect::<Vec<_>>(),
        )
        .unwrap();
        assert!(!set.push(99));
        assert_eq!(set.count(), WS_FD_SETSIZE);
    }

    #[test]
    fn membership_test() {
        let set = WireFdSet::with_handles(SetFormat::Wide, &[5, 9, 9, 12]).unwrap();
        assert!(set.contains(5));
        assert!(set.contains(9));
        assert!(!set.contains(10));
        assert!(!WireFdSet::new(SetFormat::Wide).contains(5));
    }

    #[test]
    fn compaction_preserves_order() {
        let mut set = WireFdSet::with_handles(SetFormat::Wide, &[10, 11, 12, 13, 14]).unwrap();
        set.retain_positions(|pos| pos % 2 == 0);
        assert_eq!(set.handles(), &[10, 12, 14]);
    }

    #[test]
    fn clear_zeroes_count() {
        let mut set = WireFdSet::with_handles(SetFormat::Narrow, &[1, 2]).unwrap();
        set.clear();
        assert_eq!(set.count(), 0);
        let encoded = set.encode();
        assert_eq!(u16::from_le_bytes([encoded[0], encoded[1]]), 0);
    }
}
