use crate::{PipedreamError, Result};

/// Chunk size used by endpoints that cap updates per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Splits `sequence` into chunks of at most `size` items and lazily yields
/// `callback(chunk)` for each one.
///
/// # Example
///
/// ```
/// use pipedreamer::batch;
///
/// let ids: Vec<u32> = (1..=250).collect();
/// let sizes: Vec<usize> = batch(&ids, 100, |chunk| chunk.len())
///     .expect("non-zero size")
///     .collect();
/// assert_eq!(sizes, vec![100, 100, 50]);
/// ```
pub fn batch<'a, T, R, F>(
    sequence: &'a [T],
    size: usize,
    callback: F,
) -> Result<impl Iterator<Item = R> + 'a>
where
    F: FnMut(&'a [T]) -> R + 'a,
{
    if size == 0 {
        return Err(PipedreamError::Config(
            "batch size must be greater than zero".to_owned(),
        ));
    }
    Ok(sequence.chunks(size).map(callback))
}
