use crate::config::types::OverflowStrategy;
use crate::row::Row;
use thiserror::Error;

/// Rows waiting for the next batch commit, in arrival order.
///
/// Rows only leave the buffer through [`RowBuffer::acknowledge`] (after the
/// store confirmed a commit), [`RowBuffer::drain_if_full`], or eviction under
/// [`OverflowStrategy::DropOldest`].
#[derive(Debug)]
pub struct RowBuffer {
    max_rows: usize,
    strategy: OverflowStrategy,
    rows: Vec<Row>,
    acknowledged_total: u64,
    evicted_total: u64,
}

impl RowBuffer {
    pub fn new(max_rows: usize, strategy: OverflowStrategy) -> Self {
        Self {
            max_rows,
            strategy,
            rows: Vec::new(),
            acknowledged_total: 0,
            evicted_total: 0,
        }
    }

    pub fn append(&mut self, row: Row) -> Result<(), BufferError> {
        self.extend(vec![row]).map(|_| ())
    }

    /// Append all of `rows` or, under [`OverflowStrategy::Reject`], none of them.
    ///
    /// An empty buffer takes any number of rows, so a single chunk larger
    /// than the cap is never refused outright. Returns the number of older
    /// rows evicted to make room.
    pub fn extend(&mut self, rows: Vec<Row>) -> Result<usize, BufferError> {
        let incoming = rows.len();
        if self.rows.is_empty() || self.rows.len() + incoming <= self.max_rows {
            self.rows.extend(rows);
            return Ok(0);
        }

        match self.strategy {
            OverflowStrategy::Reject => Err(BufferError::Full {
                buffered: self.rows.len(),
                incoming,
                max_rows: self.max_rows,
            }),
            OverflowStrategy::DropOldest => {
                self.rows.extend(rows);
                let excess = self.rows.len() - self.max_rows;
                self.rows.drain(..excess);
                self.evicted_total += excess as u64;
                tracing::warn!(
                    evicted = excess,
                    max_rows = self.max_rows,
                    "Dropping oldest buffered rows due to buffer full"
                );
                Ok(excess)
            }
        }
    }

    /// Take every row if at least `threshold` are buffered; otherwise take
    /// nothing and leave the buffer as it is.
    pub fn drain_if_full(&mut self, threshold: usize) -> Vec<Row> {
        if self.rows.len() < threshold {
            return Vec::new();
        }
        std::mem::take(&mut self.rows)
    }

    /// Borrow the whole buffer as the next batch if it reached `threshold`.
    /// Nothing is removed until [`RowBuffer::acknowledge`] is called.
    pub fn batch_if_full(&self, threshold: usize) -> Option<&[Row]> {
        if self.rows.is_empty() || self.rows.len() < threshold {
            return None;
        }
        Some(&self.rows)
    }

    pub fn pending(&self) -> &[Row] {
        &self.rows
    }

    /// Release the first `count` rows once their commit is confirmed.
    pub fn acknowledge(&mut self, count: usize) -> usize {
        let count = count.min(self.rows.len());
        self.rows.drain(..count);
        self.acknowledged_total += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            buffered_rows: self.rows.len(),
            max_rows: self.max_rows,
            acknowledged_total: self.acknowledged_total,
            evicted_total: self.evicted_total,
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub buffered_rows: usize,
    pub max_rows: usize,
    pub acknowledged_total: u64,
    pub evicted_total: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer is full ({buffered} buffered + {incoming} incoming > {max_rows})")]
    Full {
        buffered: usize,
        incoming: usize,
        max_rows: usize,
    },
}
