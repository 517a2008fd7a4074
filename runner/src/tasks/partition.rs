use super::Index;
use std::ops::Range;

/// Range of positions owned by `rank` when `len` items are split over `n_cores` workers.
///
/// Chunks are contiguous and differ in size by at most one, the `len % n_cores` trailing ranks
/// get the extra item. Ranks outside of `0..n_cores` own nothing.
pub fn split_range(len: usize, n_cores: usize, rank: usize) -> Range<usize> {
    let n_cores = n_cores.max(1);

    if rank >= n_cores {
        return len..len;
    }

    let chunk = len / n_cores;
    let rest = len % n_cores;
    let first_long = n_cores - rest;

    if rank < first_long {
        chunk * rank..chunk * (rank + 1)
    } else {
        let start = chunk * first_long + (chunk + 1) * (rank - first_long);

        start..start + chunk + 1
    }
}

/// Indices handled by `rank` out of `n_cores` workers
pub fn partition(indices: &[Index], n_cores: usize, rank: usize) -> &[Index] {
    &indices[split_range(indices.len(), n_cores, rank)]
}

/// All partitions in rank order
pub fn partitions(indices: &[Index], n_cores: usize) -> impl Iterator<Item = &[Index]> {
    let n_cores = n_cores.max(1);

    (0..n_cores).map(move |rank| partition(indices, n_cores, rank))
}
