//! Borrowed view of a host stereo block

/// Mutable stereo block handed to `process`, planar (one slice per channel)
pub struct StereoBuffer<'a> {
    left: &'a mut [f32],
    right: &'a mut [f32],
}

impl<'a> StereoBuffer<'a> {
    /// Wrap two channel planes. If their lengths differ the block is the
    /// shorter of the two.
    pub fn new(left: &'a mut [f32], right: &'a mut [f32]) -> Self {
        let n = left.len().min(right.len());
        Self {
            left: &mut left[..n],
            right: &mut right[..n],
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        self.left
    }

    pub fn right(&self) -> &[f32] {
        self.right
    }

    pub fn planes_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut *self.left, &mut *self.right)
    }

    /// Silence both channels
    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }
}
