// Fixed-size batching over any row iterator

use crate::error::{ConvertError, Result};

/// Groups an iterator into `Vec`s of `n` items; the last batch holds the rest.
///
/// Lazy and single-pass: each call to `next` pulls at most `n` items from the
/// underlying iterator. An item error ends the sequence after being yielded.
pub struct Batched<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Batched<I> {
    pub fn new(inner: I, size: usize) -> Result<Self> {
        if size < 1 {
            return Err(ConvertError::invalid_argument("batch size must be at least 1"));
        }
        Ok(Self {
            inner,
            size,
            done: false,
        })
    }
}

impl<I, T> Iterator for Batched<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size.min(64 * 1024));
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// `Batched` over an infallible iterator.
pub fn batched<I, T>(items: I, size: usize) -> Result<Batched<std::iter::Map<I, fn(T) -> Result<T>>>>
where
    I: Iterator<Item = T>,
{
    Batched::new(items.map(Ok as fn(T) -> Result<T>), size)
}
