use std::ops::Range;

/// Fixed-size round robin over a group whose length may change between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetedCursor {
    start: usize,
    batch_size: usize,
}

impl BudgetedCursor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            start: 0,
            batch_size: batch_size.max(1),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn reset(&mut self) {
        self.start = 0;
    }

    /// Returns the next window and advances. A cursor left past the end of a
    /// shrunken group rewinds and yields nothing for this call.
    pub fn next_batch(&mut self, group_len: usize) -> Range<usize> {
        if self.start >= group_len {
            self.start = 0;
            return 0..0;
        }
        let end = self.start.saturating_add(self.batch_size);
        if end < group_len {
            let batch = self.start..end;
            self.start = end;
            batch
        } else {
            let batch = self.start..group_len;
            self.start = 0;
            batch
        }
    }
}

/// Lets one budgeted pass through every `skip_ticks + 1` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipGate {
    skip_ticks: u32,
    counter: u32,
}

impl SkipGate {
    pub fn new(skip_ticks: u32) -> Self {
        Self {
            skip_ticks,
            counter: 0,
        }
    }

    pub fn ready(&mut self) -> bool {
        if self.counter >= self.skip_ticks {
            self.counter = 0;
            true
        } else {
            self.counter = self.counter.saturating_add(1);
            false
        }
    }
}
