//! Frame bridge
//!
//! Adapts the player's on-demand frame production to the transport's pull
//! loop, which fires roughly every 20 ms per connected session. The bridge
//! buffers at most one not-yet-delivered frame: a frame pulled during
//! `can_provide` is held until the matching `provide_frame`, which clears
//! the buffer again. The hot path takes one uncontended mutex and never
//! blocks.

use crate::voice::ports::{AudioFrame, FrameSource, TrackPlayer};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// Pull-based adapter between a [`TrackPlayer`] and the voice transport.
pub struct FrameBridge {
    player: Arc<dyn TrackPlayer>,
    last_frame: Mutex<Option<AudioFrame>>,
}

impl FrameBridge {
    /// Creates a bridge draining the given player.
    pub fn new(player: Arc<dyn TrackPlayer>) -> Arc<Self> {
        Arc::new(Self {
            player,
            last_frame: Mutex::new(None),
        })
    }

    fn pull_if_absent(&self, buffered: &mut Option<AudioFrame>) {
        if buffered.is_none() {
            *buffered = self.player.poll_frame();
        }
    }
}

impl FrameSource for FrameBridge {
    fn can_provide(&self) -> bool {
        let mut buffered = self.last_frame.lock();
        self.pull_if_absent(&mut buffered);
        buffered.is_some()
    }

    fn provide_frame(&self) -> Option<Bytes> {
        let mut buffered = self.last_frame.lock();
        self.pull_if_absent(&mut buffered);
        buffered.take().map(|frame| frame.data)
    }

    fn is_opus(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::ports::MockTrackPlayer;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    fn player_with_frames(frames: Vec<&'static [u8]>) -> Arc<MockTrackPlayer> {
        let queue = StdMutex::new(frames.into_iter().collect::<VecDeque<_>>());
        let mut player = MockTrackPlayer::new();
        player.expect_poll_frame().returning(move || {
            queue.lock().unwrap().pop_front().map(|data| AudioFrame {
                data: Bytes::from_static(data),
            })
        });
        Arc::new(player)
    }

    #[test]
    fn test_provide_frame_never_delivers_twice() {
        let bridge = FrameBridge::new(player_with_frames(vec![b"frame-1"]));

        assert_eq!(bridge.provide_frame(), Some(Bytes::from_static(b"frame-1")));
        // no new frame pushed by the player: second pull yields nothing
        assert_eq!(bridge.provide_frame(), None);
    }

    #[test]
    fn test_can_provide_buffers_exactly_one_frame() {
        let bridge = FrameBridge::new(player_with_frames(vec![b"frame-1", b"frame-2"]));

        // both calls observe the same buffered frame without consuming it
        assert!(bridge.can_provide());
        assert!(bridge.can_provide());
        assert_eq!(bridge.provide_frame(), Some(Bytes::from_static(b"frame-1")));
        assert_eq!(bridge.provide_frame(), Some(Bytes::from_static(b"frame-2")));
        assert!(!bridge.can_provide());
    }

    #[test]
    fn test_empty_player_reports_nothing() {
        let bridge = FrameBridge::new(player_with_frames(vec![]));

        assert!(!bridge.can_provide());
        assert_eq!(bridge.provide_frame(), None);
    }

    #[test]
    fn test_fixed_opus_contract() {
        let bridge = FrameBridge::new(player_with_frames(vec![]));
        assert!(bridge.is_opus());
    }
}
