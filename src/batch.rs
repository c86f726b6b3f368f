use crate::trip::TripRow;

/// Fixed-capacity row accumulator owned by the load loop. Rows buffer in
/// memory until the capacity is reached, then the caller drains the buffer
/// into one bulk staging insert.
#[derive(Debug)]
pub struct RowBatch {
    rows: Vec<TripRow>,
    capacity: usize,
}

impl RowBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, row: TripRow) {
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Drains the buffered rows, leaving the accumulator empty for reuse.
    pub fn take(&mut self) -> Vec<TripRow> {
        std::mem::take(&mut self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mirrors the load loop: flush on full, then a trailing partial flush.
    fn flush_sizes(total: usize, capacity: usize) -> Vec<usize> {
        let mut batch = RowBatch::new(capacity);
        let mut flushes = Vec::new();
        for _ in 0..total {
            batch.push(vec![None; 9]);
            if batch.is_full() {
                flushes.push(batch.take().len());
            }
        }
        if !batch.is_empty() {
            flushes.push(batch.take().len());
        }
        flushes
    }

    #[test]
    fn flushes_ceil_of_rows_over_capacity() {
        assert_eq!(flush_sizes(4500, 2000), vec![2000, 2000, 500]);
    }

    #[test]
    fn evenly_divisible_input_has_no_trailing_flush() {
        assert_eq!(flush_sizes(4000, 2000), vec![2000, 2000]);
    }

    #[test]
    fn short_input_flushes_once() {
        assert_eq!(flush_sizes(3, 2000), vec![3]);
    }

    #[test]
    fn empty_input_never_flushes() {
        assert!(flush_sizes(0, 2000).is_empty());
    }
}
