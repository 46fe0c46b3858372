//! Start and end frame bounds of the playable clip.

/// Inclusive frame range `[start, end]` inside `[0, frame_count - 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRange {
    start: usize,
    end: usize,
    frame_count: usize,
}

impl ClipRange {
    /// Whole-video clip
    pub fn new(frame_count: usize) -> Self {
        Self {
            start: 0,
            end: frame_count.saturating_sub(1),
            frame_count,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Frames in the clip
    pub fn len(&self) -> usize {
        if self.frame_count == 0 {
            return 0;
        }
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clamped into `[0, end]`; returns the start actually set
    pub fn set_start(&mut self, frame: usize) -> usize {
        self.start = frame.min(self.end);
        self.start
    }

    /// Clamped into `[start, frame_count - 1]`; returns the end actually set
    pub fn set_end(&mut self, frame: usize) -> usize {
        self.end = frame.min(self.frame_count.saturating_sub(1)).max(self.start);
        self.end
    }

    /// Nearest frame inside the clip
    pub fn clamp(&self, frame: usize) -> usize {
        frame.clamp(self.start, self.end)
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_video() {
        let clip = ClipRange::new(10);
        assert_eq!((clip.start(), clip.end(), clip.len()), (0, 9, 10));
        assert!(ClipRange::new(0).is_empty());
    }

    #[test]
    fn test_start_never_passes_end() {
        let mut clip = ClipRange::new(10);
        clip.set_end(5);
        assert_eq!(clip.set_start(8), 5);
        assert_eq!(clip.len(), 1);
    }

    #[test]
    fn test_end_bounded_by_start_and_count() {
        let mut clip = ClipRange::new(10);
        clip.set_start(4);
        assert_eq!(clip.set_end(2), 4);
        assert_eq!(clip.set_end(50), 9);
    }

    #[test]
    fn test_clamp() {
        let mut clip = ClipRange::new(10);
        clip.set_start(2);
        clip.set_end(6);
        assert_eq!(clip.clamp(0), 2);
        assert_eq!(clip.clamp(4), 4);
        assert_eq!(clip.clamp(9), 6);
        assert!(!clip.contains(7));
    }
}
