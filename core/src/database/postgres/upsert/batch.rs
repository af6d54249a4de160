use std::num::NonZeroUsize;

/// A contiguous, non-empty slice of the input, numbered from 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batch<'a, T> {
    pub index: usize,
    pub rows: &'a [T],
}

impl<T> Batch<'_, T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Splits `rows` into consecutive batches of at most `batch_size`, preserving order.
/// Only the last batch can be shorter. Empty input yields no batches.
pub fn split_batches<T>(
    rows: &[T],
    batch_size: NonZeroUsize,
) -> impl Iterator<Item = Batch<'_, T>> + '_ {
    rows.chunks(batch_size.get()).enumerate().map(|(index, rows)| Batch { index, rows })
}
