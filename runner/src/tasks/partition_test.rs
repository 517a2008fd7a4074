use super::partition::{partition, partitions, split_range};
use proptest::prelude::*;

#[test]
fn trailing_ranks_get_the_remainder() {
    let indices = (0..5).collect::<Vec<_>>();

    assert_eq!(partition(&indices, 2, 0), &[0, 1]);
    assert_eq!(partition(&indices, 2, 1), &[2, 3, 4]);

    let indices = (10..20).collect::<Vec<_>>();
    let sizes = partitions(&indices, 4).map(<[_]>::len).collect::<Vec<_>>();

    assert_eq!(sizes, vec![2, 2, 3, 3]);
}

#[test]
fn more_cores_than_indices() {
    let indices = vec![7, 8];

    assert_eq!(partition(&indices, 4, 0), &[] as &[i64]);
    assert_eq!(partition(&indices, 4, 1), &[] as &[i64]);
    assert_eq!(partition(&indices, 4, 2), &[7]);
    assert_eq!(partition(&indices, 4, 3), &[8]);
}

#[test]
fn out_of_range_rank_is_empty() {
    assert_eq!(split_range(10, 3, 3), 10..10);
    assert!(partition(&[1, 2, 3], 1, 5).is_empty());
}

proptest! {
    #[test]
    fn partitions_reconstruct_the_input(
        indices in proptest::collection::vec(any::<i64>(), 0..200),
        n_cores in 1usize..32,
    ) {
        let joined = partitions(&indices, n_cores).flatten().copied().collect::<Vec<_>>();

        prop_assert_eq!(joined, indices);
    }

    #[test]
    fn partition_sizes_are_balanced(len in 0usize..500, n_cores in 1usize..64) {
        let sizes = (0..n_cores)
            .map(|rank| split_range(len, n_cores, rank).len())
            .collect::<Vec<_>>();
        let floor = len / n_cores;

        for (rank, size) in sizes.iter().enumerate() {
            let long = rank >= n_cores - len % n_cores;

            prop_assert_eq!(*size, if long { floor + 1 } else { floor });
        }
    }
}
