//! Channel FIFO
//!
//! Lock-free transport of fixed-size mono frames from the audio thread to
//! the render thread. Built on two rtrb SPSC ring buffers:
//!
//! - `filled` carries frames writer -> reader,
//! - `free` returns emptied frame storage reader -> writer.
//!
//! Every frame buffer is allocated up front, so neither side allocates
//! while running. The writer reblocks host buffers of any size into frames
//! of `frame_size` samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use super::audio_buffer::AudioBuffer;

/// Number of frame slots in each FIFO.
pub const FIFO_CAPACITY: usize = 30;

/// Creates a connected frame writer/reader pair with `capacity` slots of
/// `frame_size` samples each.
pub fn frame_fifo(capacity: usize, frame_size: usize) -> (FrameWriter, FrameReader) {
    let capacity = capacity.max(1);
    let (filled_tx, filled_rx) = RingBuffer::new(capacity);
    let (mut free_tx, free_rx) = RingBuffer::new(capacity);

    for _ in 0..capacity {
        // Fresh ring of exactly `capacity` slots: cannot be full here.
        let _ = free_tx.push(vec![0.0f32; frame_size]);
    }

    let dropped = Arc::new(AtomicU64::new(0));
    let writer = FrameWriter {
        filled: filled_tx,
        free: free_rx,
        frame_size,
        dropped: Arc::clone(&dropped),
    };
    let reader = FrameReader {
        filled: filled_rx,
        free: free_tx,
        frame_size,
        dropped,
    };
    (writer, reader)
}

/// Producer side of a frame FIFO.
///
/// REAL-TIME SAFE: every method is wait-free and allocation-free.
pub struct FrameWriter {
    filled: Producer<Vec<f32>>,
    free: Consumer<Vec<f32>>,
    frame_size: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameWriter {
    /// Samples per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Copies `frame` into a free slot and publishes it.
    ///
    /// Returns false (and counts a drop) when every slot is waiting to be
    /// read. A frame shorter than `frame_size` is zero-padded.
    pub fn push_slice(&mut self, frame: &[f32]) -> bool {
        let Ok(mut slot) = self.free.pop() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let len = frame.len().min(slot.len());
        slot[..len].copy_from_slice(&frame[..len]);
        slot[len..].fill(0.0);
        self.publish(slot)
    }

    /// Publishes `staging` by swapping it with a free slot, leaving the
    /// caller with recycled storage of the same size.
    pub fn push_swap(&mut self, staging: &mut Vec<f32>) -> bool {
        let Ok(mut slot) = self.free.pop() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        std::mem::swap(&mut slot, staging);
        self.publish(slot)
    }

    fn publish(&mut self, slot: Vec<f32>) -> bool {
        // The filled ring has as many slots as there are buffers, so a
        // buffer taken from `free` always fits.
        match self.filled.push(slot) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Frames published but not yet pulled.
    pub fn frames_in_flight(&self) -> usize {
        self.filled.buffer().capacity() - self.filled.slots()
    }
}

/// Consumer side of a frame FIFO.
pub struct FrameReader {
    filled: Consumer<Vec<f32>>,
    free: Producer<Vec<f32>>,
    frame_size: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameReader {
    /// Samples per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Copies the oldest frame into `frame` and recycles its slot.
    ///
    /// Returns false when no frame is waiting. `frame` is resized to
    /// `frame_size` if needed.
    pub fn pull(&mut self, frame: &mut Vec<f32>) -> bool {
        let Ok(slot) = self.filled.pop() else {
            return false;
        };
        if frame.len() != slot.len() {
            frame.resize(slot.len(), 0.0);
        }
        frame.copy_from_slice(&slot);
        let _ = self.free.push(slot);
        true
    }

    /// Discards every waiting frame except the newest, which is copied into
    /// `frame`. Returns false when nothing was waiting.
    pub fn pull_latest(&mut self, frame: &mut Vec<f32>) -> bool {
        let mut pulled = false;
        while self.pull(frame) {
            pulled = true;
        }
        pulled
    }

    /// Number of frames waiting.
    pub fn num_available(&self) -> usize {
        self.filled.slots()
    }

    /// Returns and clears the number of frames the writer had to drop.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Audio-thread side of a channel FIFO: accumulates one channel of host
/// buffers into frames.
pub struct ChannelFifoWriter {
    channel: usize,
    staging: Vec<f32>,
    fill: usize,
    writer: FrameWriter,
}

impl ChannelFifoWriter {
    /// Channel this writer extracts from host buffers.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Appends this writer's channel of `buffer`, publishing a frame every
    /// time the staging area fills.
    ///
    /// When the FIFO is full the completed frame is dropped and staging
    /// starts over. REAL-TIME SAFE.
    pub fn update(&mut self, buffer: &AudioBuffer) {
        if self.channel >= buffer.num_channels() {
            return;
        }
        self.push_samples(buffer.channel(self.channel));
    }

    /// Appends raw mono samples.
    pub fn push_samples(&mut self, mut samples: &[f32]) {
        let frame_size = self.staging.len();
        if frame_size == 0 {
            return;
        }
        while !samples.is_empty() {
            let take = (frame_size - self.fill).min(samples.len());
            self.staging[self.fill..self.fill + take].copy_from_slice(&samples[..take]);
            self.fill += take;
            samples = &samples[take..];

            if self.fill == frame_size {
                self.writer.push_swap(&mut self.staging);
                self.fill = 0;
            }
        }
    }

    /// Frames published but not yet pulled.
    pub fn frames_in_flight(&self) -> usize {
        self.writer.frames_in_flight()
    }
}

/// Render-thread side of a channel FIFO.
pub struct ChannelFifoReader {
    channel: usize,
    reader: FrameReader,
}

impl ChannelFifoReader {
    /// Channel this reader receives.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Samples per frame.
    pub fn frame_size(&self) -> usize {
        self.reader.frame_size()
    }

    /// Copies the oldest frame into `frame`; false on under-run.
    pub fn pull(&mut self, frame: &mut Vec<f32>) -> bool {
        self.reader.pull(frame)
    }

    /// Number of complete frames waiting.
    pub fn num_available(&self) -> usize {
        self.reader.num_available()
    }

    /// Returns and clears the writer's dropped-frame count.
    pub fn take_dropped(&self) -> u64 {
        self.reader.take_dropped()
    }
}

/// Creates the writer/reader pair for one channel, with all
/// [`FIFO_CAPACITY`] frames of `frame_size` samples preallocated.
pub fn channel_fifo(channel: usize, frame_size: usize) -> (ChannelFifoWriter, ChannelFifoReader) {
    let (writer, reader) = frame_fifo(FIFO_CAPACITY, frame_size);
    (
        ChannelFifoWriter {
            channel,
            staging: vec![0.0; frame_size],
            fill: 0,
            writer,
        },
        ChannelFifoReader { channel, reader },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_reblocks_into_frames() {
        let (mut writer, mut reader) = channel_fifo(0, 4);
        writer.push_samples(&ramp(0, 3));
        assert_eq!(reader.num_available(), 0, "partial frame must stay staged");

        writer.push_samples(&ramp(3, 6));
        assert_eq!(reader.num_available(), 2);

        let mut frame = Vec::new();
        assert!(reader.pull(&mut frame));
        assert_eq!(frame, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(reader.pull(&mut frame));
        assert_eq!(frame, vec![4.0, 5.0, 6.0, 7.0]);
        assert!(!reader.pull(&mut frame), "under-run should return false");
    }

    #[test]
    fn test_update_extracts_channel() {
        let buffer = AudioBuffer::from_channels(&[&[1.0, 1.0], &[2.0, 2.0]]);
        let (mut writer, mut reader) = channel_fifo(1, 2);
        writer.update(&buffer);

        let mut frame = vec![0.0; 2];
        assert!(reader.pull(&mut frame));
        assert_eq!(frame, vec![2.0, 2.0]);
        assert_eq!(reader.channel(), 1);
    }

    #[test]
    fn test_missing_channel_is_ignored() {
        let buffer = AudioBuffer::from_channels(&[&[1.0, 1.0]]);
        let (mut writer, reader) = channel_fifo(1, 2);
        writer.update(&buffer);
        assert_eq!(reader.num_available(), 0);
    }

    #[test]
    fn test_overflow_refuses_newest_and_counts() {
        let (mut writer, mut reader) = channel_fifo(0, 1);
        for i in 0..(FIFO_CAPACITY + 5) {
            writer.push_samples(&[i as f32]);
        }
        assert_eq!(reader.num_available(), FIFO_CAPACITY);
        assert_eq!(writer.frames_in_flight(), FIFO_CAPACITY);
        assert_eq!(reader.take_dropped(), 5);
        assert_eq!(reader.take_dropped(), 0, "count should reset after take");

        // What was accepted comes out in order.
        let mut frame = Vec::new();
        for i in 0..FIFO_CAPACITY {
            assert!(reader.pull(&mut frame));
            assert_eq!(frame[0], i as f32);
        }
    }

    #[test]
    fn test_pulled_sequence_is_ordered_under_interleaving() {
        let (mut writer, mut reader) = channel_fifo(0, 2);
        let mut pulled = Vec::new();
        let mut frame = Vec::new();
        let mut next = 0usize;
        for round in 0..200 {
            let len = 1 + round % 7;
            writer.push_samples(&ramp(next, len));
            next += len;
            if round % 3 == 0 {
                while reader.pull(&mut frame) {
                    pulled.extend_from_slice(&frame);
                }
            }
        }
        while reader.pull(&mut frame) {
            pulled.extend_from_slice(&frame);
        }
        assert_eq!(reader.take_dropped(), 0);
        assert!(pulled.windows(2).all(|w| w[1] == w[0] + 1.0));
        assert_eq!(pulled.len(), (next / 2) * 2);
    }

    #[test]
    fn test_slots_are_recycled() {
        let (mut writer, mut reader) = frame_fifo(2, 3);
        let mut frame = Vec::new();
        for i in 0..10 {
            assert!(writer.push_slice(&[i as f32]), "push {} should find a free slot", i);
            assert!(reader.pull(&mut frame));
            assert_eq!(frame, vec![i as f32, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_pull_latest_keeps_newest() {
        let (mut writer, mut reader) = frame_fifo(4, 1);
        for i in 0..3 {
            writer.push_slice(&[i as f32]);
        }
        let mut frame = Vec::new();
        assert!(reader.pull_latest(&mut frame));
        assert_eq!(frame, vec![2.0]);
        assert!(!reader.pull_latest(&mut frame));
    }

    #[test]
    fn test_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ChannelFifoWriter>();
        assert_send::<ChannelFifoReader>();
    }
}
