//! Analyzer path geometry.
//!
//! Maps a spectrum frame onto a caller-supplied rectangle: frequency on a
//! log axis from 20 Hz (left edge) to 20 kHz (right edge), level linearly
//! from the floor (bottom) to 0 dB (top). Points outside the rectangle are
//! not clipped; that is left to whoever draws the path.

/// Default bin stride of the path builder.
pub const DEFAULT_PATH_STRIDE: usize = 2;

/// Axis-aligned rectangle in display coordinates (y grows downwards).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// One polyline vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathVertex {
    /// Starts a subpath.
    MoveTo { x: f32, y: f32 },
    /// Extends the current subpath with a straight segment.
    LineTo { x: f32, y: f32 },
}

impl PathVertex {
    /// Position of the vertex.
    pub fn point(&self) -> (f32, f32) {
        match *self {
            PathVertex::MoveTo { x, y } | PathVertex::LineTo { x, y } => (x, y),
        }
    }
}

/// Polyline for one channel's spectrum.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalyzerPath {
    vertices: Vec<PathVertex>,
}

impl AnalyzerPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertices in drawing order.
    pub fn vertices(&self) -> &[PathVertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Removes every vertex, keeping the allocation.
    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    fn push(&mut self, x: f32, y: f32) {
        let vertex = if self.vertices.is_empty() {
            PathVertex::MoveTo { x, y }
        } else {
            PathVertex::LineTo { x, y }
        };
        self.vertices.push(vertex);
    }
}

/// Normalized log-frequency position: 20 Hz -> 0, 20 kHz -> 1.
#[inline]
pub fn frequency_to_proportion(freq: f32) -> f32 {
    (freq / 20.0).log10() / 1000.0f32.log10()
}

/// Linear map of `value` from `[src_low, src_high]` to `[dst_low, dst_high]`.
#[inline]
pub fn map_range(value: f32, src_low: f32, src_high: f32, dst_low: f32, dst_high: f32) -> f32 {
    dst_low + (value - src_low) / (src_high - src_low) * (dst_high - dst_low)
}

/// Builds analyzer paths from spectrum frames.
#[derive(Clone, Debug)]
pub struct PathBuilder {
    stride: usize,
    floor_db: f32,
}

impl PathBuilder {
    /// Creates a builder visiting every `stride`-th bin.
    pub fn new(stride: usize, floor_db: f32) -> Self {
        Self {
            stride: stride.max(1),
            floor_db,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Number of vertices a complete frame yields.
    pub fn vertex_count(&self, fft_size: usize) -> usize {
        (fft_size / 2).div_ceil(self.stride)
    }

    /// Rebuilds `path` from `frame` (one dB value per bin).
    ///
    /// Visits bins `0, stride, 2*stride, ...` below `fft_size / 2`. The DC
    /// bin is placed half a bin above 0 Hz so x never decreases. Bins whose
    /// level maps to a non-finite y are skipped.
    pub fn build(
        &self,
        path: &mut AnalyzerPath,
        frame: &[f32],
        rect: Rect,
        fft_size: usize,
        sample_rate: f64,
    ) {
        path.clear();
        if fft_size == 0 || sample_rate <= 0.0 {
            return;
        }

        let bin_width = (sample_rate / fft_size as f64) as f32;
        let num_bins = (fft_size / 2).min(frame.len());
        let bottom = rect.bottom();
        let top = rect.y;

        for bin in (0..num_bins).step_by(self.stride) {
            let y = map_range(frame[bin], self.floor_db, 0.0, bottom, top);
            if !y.is_finite() {
                continue;
            }
            let freq = if bin == 0 {
                bin_width * 0.5
            } else {
                bin as f32 * bin_width
            };
            let x = rect.x + (frequency_to_proportion(freq) * rect.width).floor();
            path.push(x, y);
        }
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_STRIDE, super::fft_data::DEFAULT_FLOOR_DB)
    }
}
