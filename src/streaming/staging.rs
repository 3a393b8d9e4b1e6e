use crate::{
    device::{HeightTexel, TransferId},
    streaming::TileRegion,
};
use slab::Slab;

pub(crate) struct InFlightTransfer {
    pub(crate) transfer: TransferId,
    pub(crate) region: TileRegion,
}

/// A fixed set of staging buffers, each owned by at most one in flight transfer.
///
/// The slab key of an in flight transfer is the index of the staging buffer it occupies,
/// so a buffer is handed out again only after its transfer has been retired.
pub(crate) struct StagingRing {
    buffers: Vec<Vec<HeightTexel>>,
    in_flight: Slab<InFlightTransfer>,
}

impl StagingRing {
    pub(crate) fn new(slots: u32) -> Self {
        Self {
            buffers: (0..slots).map(|_| Vec::new()).collect(),
            in_flight: Slab::with_capacity(slots as usize),
        }
    }

    #[inline]
    pub(crate) fn has_free_slot(&self) -> bool {
        self.in_flight.len() < self.buffers.len()
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn in_flight(&self) -> impl Iterator<Item = &InFlightTransfer> {
        self.in_flight.iter().map(|(_, transfer)| transfer)
    }

    /// The buffer the next transfer will be staged in, cleared and ready to be filled.
    pub(crate) fn next_buffer(&mut self) -> Option<&mut Vec<HeightTexel>> {
        if !self.has_free_slot() {
            return None;
        }

        let buffer = &mut self.buffers[self.in_flight.vacant_key()];
        buffer.clear();
        Some(buffer)
    }

    /// Marks the buffer returned by [`Self::next_buffer`] as owned by the transfer.
    pub(crate) fn submit(&mut self, transfer: TransferId, region: TileRegion) {
        self.in_flight.insert(InFlightTransfer { transfer, region });
    }

    /// Keeps the transfers for which `keep` returns true and frees the slots of the others.
    pub(crate) fn retire(&mut self, mut keep: impl FnMut(&InFlightTransfer) -> bool) {
        self.in_flight.retain(|_, transfer| keep(transfer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::{IVec2, UVec2};

    fn region(level: u32) -> TileRegion {
        TileRegion {
            level,
            origin: UVec2::ZERO,
            extent: UVec2::ONE,
            source: IVec2::ZERO,
        }
    }

    #[test]
    fn slots_are_reused_after_retirement() {
        let mut ring = StagingRing::new(2);

        ring.next_buffer().unwrap().push([1.0, 1.0]);
        ring.submit(TransferId(0), region(0));
        ring.next_buffer().unwrap().push([2.0, 2.0]);
        ring.submit(TransferId(1), region(1));

        assert!(!ring.has_free_slot());
        assert!(ring.next_buffer().is_none());

        ring.retire(|transfer| transfer.transfer != TransferId(0));

        assert_eq!(ring.in_flight_count(), 1);
        assert!(ring.next_buffer().unwrap().is_empty());
        assert_eq!(ring.in_flight().next().unwrap().region.level, 1);
    }
}
