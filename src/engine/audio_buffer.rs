//! Planar audio buffers.
//!
//! The processor works on one contiguous slice per channel. The cpal driver
//! wants interleaved samples and converts at the edge with
//! [`AudioBuffer::copy_to_interleaved`].

/// A fixed-capacity, multi-channel block of samples.
///
/// Storage is allocated once; [`set_num_samples`](Self::set_num_samples)
/// only changes the visible length, so hosts with variable block sizes never
/// cause allocation on the audio thread.
#[derive(Clone, Debug, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer of `num_channels` x `capacity` samples.
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; num_channels],
            num_samples: capacity,
        }
    }

    /// Creates a buffer holding copies of the given channel slices.
    ///
    /// The length is that of the shortest slice.
    pub fn from_channels(channels: &[&[f32]]) -> Self {
        let num_samples = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        Self {
            channels: channels.iter().map(|c| c[..num_samples].to_vec()).collect(),
            num_samples,
        }
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Visible length of every channel.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Allocated length of every channel.
    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sets the visible length, clamped to the capacity.
    ///
    /// REAL-TIME SAFE: never allocates.
    pub fn set_num_samples(&mut self, num_samples: usize) {
        self.num_samples = num_samples.min(self.capacity());
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index][..self.num_samples]
    }

    /// Mutable samples of one channel.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let len = self.num_samples;
        &mut self.channels[index][..len]
    }

    /// Mutable access to two distinct channels at once.
    pub fn channel_pair_mut(&mut self, first: usize, second: usize) -> (&mut [f32], &mut [f32]) {
        assert_ne!(first, second, "channel pair must be distinct");
        let len = self.num_samples;
        if first < second {
            let (head, tail) = self.channels.split_at_mut(second);
            (&mut head[first][..len], &mut tail[0][..len])
        } else {
            let (head, tail) = self.channels.split_at_mut(first);
            (&mut tail[0][..len], &mut head[second][..len])
        }
    }

    /// Zeroes one channel.
    pub fn clear_channel(&mut self, index: usize) {
        self.channel_mut(index).fill(0.0);
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Interleaves this buffer into `interleaved`. Output channels without a
    /// matching buffer channel receive the last available channel, so a
    /// stereo buffer feeding a mono device plays its left channel.
    pub fn copy_to_interleaved(&self, interleaved: &mut [f32], num_channels: usize) {
        if num_channels == 0 || self.channels.is_empty() {
            interleaved.fill(0.0);
            return;
        }
        for (frame_index, frame) in interleaved.chunks_exact_mut(num_channels).enumerate() {
            if frame_index >= self.num_samples {
                frame.fill(0.0);
                continue;
            }
            for (out_channel, sample) in frame.iter_mut().enumerate() {
                let source = out_channel.min(self.channels.len() - 1);
                *sample = self.channels[source][frame_index];
            }
        }
    }

    /// Root mean square of one channel.
    pub fn rms(&self, index: usize) -> f32 {
        let samples = self.channel(index);
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        (sum / samples.len() as f64).sqrt() as f32
    }

    /// Absolute peak of one channel.
    pub fn peak(&self, index: usize) -> f32 {
        self.channel(index).iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = AudioBuffer::new(2, 256);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_samples(), 256);
        assert!(buffer.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_num_samples_is_clamped() {
        let mut buffer = AudioBuffer::new(2, 128);
        buffer.set_num_samples(64);
        assert_eq!(buffer.channel(0).len(), 64);
        buffer.set_num_samples(1000);
        assert_eq!(buffer.num_samples(), 128);
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn test_channel_pair_mut() {
        let mut buffer = AudioBuffer::new(2, 4);
        {
            let (left, right) = buffer.channel_pair_mut(0, 1);
            left.fill(1.0);
            right.fill(-1.0);
        }
        assert_eq!(buffer.channel(0), &[1.0; 4]);
        assert_eq!(buffer.channel(1), &[-1.0; 4]);

        let (right, left) = buffer.channel_pair_mut(1, 0);
        assert_eq!(right[0], -1.0);
        assert_eq!(left[0], 1.0);
    }

    #[test]
    fn test_interleave_stereo() {
        let buffer = AudioBuffer::from_channels(&[&[0.1, 0.2, 0.3], &[-0.1, -0.2, -0.3]]);
        let mut out = [0.0; 8];
        buffer.copy_to_interleaved(&mut out, 2);
        assert_eq!(out, [0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_interleave_to_wider_device() {
        let buffer = AudioBuffer::from_channels(&[&[0.5, 0.25]]);
        let mut out = [9.0; 6];
        buffer.copy_to_interleaved(&mut out, 3);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_rms_and_peak() {
        let buffer = AudioBuffer::from_channels(&[&[1.0, -1.0, 1.0, -1.0], &[0.0, 0.5, 0.0, -0.25]]);
        assert!((buffer.rms(0) - 1.0).abs() < 1e-6);
        assert_eq!(buffer.peak(1), 0.5);
    }
}
