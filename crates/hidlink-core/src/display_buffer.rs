//! Host-side estimate of which frame a device is currently showing.
//!
//! The displays cannot report the frame they are compositing. They only
//! start rendering once a short queue of submitted frames has built up, so
//! the host models that queue as a fixed-lag FIFO: a frame is announced as
//! "displaying" once [`DEFAULT_BUFFER_DEPTH`] newer frames have been sent
//! behind it. Good enough for keeping the UI in step; not a protocol
//! guarantee.
//!
//! ```text
//! push 0   [0]          -
//! push 1   [0 1]        0   (priming: device just started, 0 stays queued)
//! push 2   [1 2]        -   (0 leaves the queue, already announced)
//! push 3   [2 3]        1
//! drain                 2 3
//! ```

use std::collections::VecDeque;

use crate::types::FrameEnvelope;

/// Lookahead depth of the device render queue. Calibrated empirically on
/// the current panel firmware; other hardware may need a different value.
pub const DEFAULT_BUFFER_DEPTH: usize = 2;

#[derive(Debug)]
pub struct DeviceDisplayBuffer {
    depth: usize,
    queue: VecDeque<FrameEnvelope>,
    primed: bool,
    /// The head was already announced by the priming event.
    head_announced: bool,
}

impl DeviceDisplayBuffer {
    /// `depth` is clamped to at least 1.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            queue: VecDeque::with_capacity(depth + 1),
            primed: false,
            head_announced: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Record a frame that was just written to the device. Returns the frame
    /// the device is now estimated to be showing, if that changed.
    pub fn push(&mut self, envelope: FrameEnvelope) -> Option<FrameEnvelope> {
        self.queue.push_back(envelope);

        if self.queue.len() > self.depth {
            let head = self.queue.pop_front()?;
            if std::mem::take(&mut self.head_announced) {
                return None;
            }
            return Some(head);
        }

        if !self.primed && self.queue.len() == self.depth {
            self.primed = true;
            self.head_announced = true;
            return self.queue.front().cloned();
        }

        None
    }

    /// Empty the buffer once the source is exhausted, yielding every frame
    /// that has not been announced yet, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = FrameEnvelope> + '_ {
        let skip = usize::from(std::mem::take(&mut self.head_announced));
        self.queue.drain(..).skip(skip)
    }
}

impl Default for DeviceDisplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_id::TransferIdAllocator;
    use crate::types::{FrameOrigin, FrameType};
    use bytes::Bytes;

    fn frames(n: u64) -> Vec<FrameEnvelope> {
        let mut ids = TransferIdAllocator::new();
        (0..n)
            .map(|i| FrameEnvelope {
                payload: Bytes::from(vec![i as u8; 4]),
                transfer_id: ids.next(),
                frame_type: FrameType::Jpeg,
                sequence_index: i,
                cycle: 0,
                source_timestamp: None,
                origin: FrameOrigin::Memory { label: format!("frame-{i}") },
            })
            .collect()
    }

    fn run(depth: usize, n: u64) -> (Vec<Option<u64>>, Vec<u64>) {
        let mut buf = DeviceDisplayBuffer::new(depth);
        let mut live = Vec::new();
        for f in frames(n) {
            live.push(buf.push(f).map(|e| e.sequence_index));
            assert!(buf.len() <= depth + 1);
        }
        let drained = buf.drain().map(|e| e.sequence_index).collect();
        (live, drained)
    }

    #[test]
    fn five_frames_depth_two() {
        let (live, drained) = run(2, 5);
        assert_eq!(live, vec![None, Some(0), None, Some(1), Some(2)]);
        assert_eq!(drained, vec![3, 4]);
    }

    #[test]
    fn priming_fires_exactly_once() {
        let mut buf = DeviceDisplayBuffer::new(3);
        let mut priming = 0;
        for (i, f) in frames(10).into_iter().enumerate() {
            let out = buf.push(f);
            if i < 3 && out.is_some() {
                priming += 1;
            }
        }
        assert_eq!(priming, 1);
        assert!(buf.is_primed());
    }

    #[test]
    fn every_frame_announced_once_in_order() {
        for depth in 1..=4 {
            for n in 0..20 {
                let (live, drained) = run(depth, n);
                let emitted_live = live.iter().flatten().count();
                assert_eq!(drained.len(), n as usize - emitted_live, "depth={depth} n={n}");

                let all: Vec<u64> = live.into_iter().flatten().chain(drained).collect();
                assert_eq!(all, (0..n).collect::<Vec<_>>(), "depth={depth} n={n}");
            }
        }
    }

    #[test]
    fn short_source_never_primes() {
        let (live, drained) = run(4, 2);
        assert_eq!(live, vec![None, None]);
        assert_eq!(drained, vec![0, 1]);
    }

    #[test]
    fn zero_depth_is_clamped() {
        let buf = DeviceDisplayBuffer::new(0);
        assert_eq!(buf.depth(), 1);
    }
}
