//! Wrapping transfer ids for frame packets.
//!
//! The firmware keeps a small ring of pending frame slots keyed by transfer
//! id. Ids `0..=3` are reserved for control packets, so frames cycle through
//! `4..=59` and wrap back to 4.

/// Lowest id handed to a frame packet.
pub const FIRST_FRAME_TRANSFER_ID: u8 = 4;
/// Highest id handed to a frame packet; the next one wraps to [`FIRST_FRAME_TRANSFER_ID`].
pub const LAST_FRAME_TRANSFER_ID: u8 = 59;
/// Number of distinct frame ids (56).
pub const FRAME_TRANSFER_ID_SPAN: u8 = LAST_FRAME_TRANSFER_ID - FIRST_FRAME_TRANSFER_ID + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferId(u8);

impl TransferId {
    /// Accepts only ids in the frame range.
    pub fn new(raw: u8) -> Option<Self> {
        (FIRST_FRAME_TRANSFER_ID..=LAST_FRAME_TRANSFER_ID)
            .contains(&raw)
            .then_some(Self(raw))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues frame transfer ids in order. Not synchronized: one streaming
/// session owns the allocator for its device.
#[derive(Debug, Default)]
pub struct TransferIdAllocator {
    last: Option<u8>,
}

impl TransferIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> TransferId {
        let id = match self.last {
            Some(LAST_FRAME_TRANSFER_ID) | None => FIRST_FRAME_TRANSFER_ID,
            Some(prev) => prev + 1,
        };
        self.last = Some(id);
        TransferId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_four_and_wraps_after_fifty_nine() {
        let mut alloc = TransferIdAllocator::new();
        let ids: Vec<u8> = (0..(FRAME_TRANSFER_ID_SPAN as usize + 3))
            .map(|_| alloc.next().get())
            .collect();

        assert_eq!(ids[0], 4);
        assert_eq!(ids[55], 59);
        assert_eq!(&ids[56..], &[4, 5, 6]);
    }

    #[test]
    fn every_id_stays_in_range_and_steps_by_one() {
        let mut alloc = TransferIdAllocator::new();
        let mut prev = alloc.next().get();
        for _ in 0..1_000 {
            let id = alloc.next().get();
            assert!((FIRST_FRAME_TRANSFER_ID..=LAST_FRAME_TRANSFER_ID).contains(&id));
            let expected = (prev - FIRST_FRAME_TRANSFER_ID + 1) % FRAME_TRANSFER_ID_SPAN + FIRST_FRAME_TRANSFER_ID;
            assert_eq!(id, expected);
            prev = id;
        }
    }

    #[test]
    fn reserved_control_ids_are_rejected() {
        for raw in 0..FIRST_FRAME_TRANSFER_ID {
            assert!(TransferId::new(raw).is_none());
        }
        assert!(TransferId::new(60).is_none());
        assert_eq!(TransferId::new(59).map(TransferId::get), Some(59));
    }
}
