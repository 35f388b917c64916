use std::num::NonZeroUsize;
use std::ops::Range;

pub const DEFAULT_BATCH_SIZE: usize = 40;

/// Half-open range `[bottom, top)` over the book list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub bottom: usize,
    pub top: usize,
}

impl BatchWindow {
    pub fn range(&self) -> Range<usize> {
        self.bottom..self.top
    }

    pub fn len(&self) -> usize {
        self.top - self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.top == self.bottom
    }
}

/// Consecutive windows of `size` items over `len` items; the last one is clamped.
#[derive(Debug, Clone)]
pub struct BatchWindows {
    len: usize,
    size: usize,
    bottom: usize,
}

impl BatchWindows {
    pub fn new(len: usize, size: NonZeroUsize) -> Self {
        Self {
            len,
            size: size.get(),
            bottom: 0,
        }
    }

    pub fn count_for(len: usize, size: NonZeroUsize) -> usize {
        len.div_ceil(size.get())
    }
}

impl Iterator for BatchWindows {
    type Item = BatchWindow;

    fn next(&mut self) -> Option<BatchWindow> {
        if self.bottom >= self.len {
            return None;
        }
        let top = self.bottom.saturating_add(self.size).min(self.len);
        let window = BatchWindow {
            bottom: self.bottom,
            top,
        };
        self.bottom = top;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.bottom.min(self.len)).div_ceil(self.size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchWindows {}
