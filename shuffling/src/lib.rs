use core::{
    fmt::Debug,
    num::NonZeroU64,
    ops::{Index as _, Rem as _},
};

use anyhow::Result;
use bit_field::BitArray as _;
use itertools::izip;
use tap::TryConv as _;
use types::{phase0::primitives::H256, preset::Preset};

const BITS_PER_HASH: usize = H256::len_bytes() * 8;

// Originally based on:
// <https://github.com/protolambda/eth2-shuffle/tree/fd840f1036c1f8f6d7625ffe6ff4d9c60f942876>
// See the following for an explanation of the algorithm:
// - <https://github.com/protolambda/eth2-docs/tree/de65f38857f1e27ffb6f25107d61e795cf1a5ad7#shuffling>
// - <https://github.com/protolambda/eth2-impl-design/tree/782b1d2da088e4ebbbea227cfa0a8752399239fb#shuffling>
pub fn shuffle_slice<P: Preset, T>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(length) = slice.len().try_into().map(NonZeroU64::new)? else {
        return Ok(());
    };

    for round in (0..P::SHUFFLE_ROUND_COUNT).rev() {
        let pivot = compute_pivot(seed, round, length)
            .try_conv::<usize>()
            .expect("remainder of division by number that fits in usize also fits in usize");

        let midpoint = pivot + 1;
        let (low, high) = slice.split_at_mut(midpoint);

        // Naively parallelizing these with Rayon causes deadlocks due to the lock held in
        // `OnceCell::get_or_init` higher on the stack and the way Rayon runs tasks. See:
        // - <https://github.com/rayon-rs/rayon/issues/592>
        // - <https://github.com/rayon-rs/rayon/pull/765>
        // It could be worked around by spawning a scoped thread and submitting tasks to a
        // separate thread pool. A proper solution would require changes to Rayon and `once_cell`.
        swap_around_mirror(seed, round, low, 0);
        swap_around_mirror(seed, round, high, midpoint);
    }

    Ok(())
}

fn swap_around_mirror<T>(seed: H256, round: u8, slice: &mut [T], offset: usize) {
    // `[T]::chunks_exact_mut` and `[T]::rchunks_exact_mut` are needed for full performance.
    // `[T]::as_chunks_mut` and `[T]::as_rchunks_mut` could simplify this when stabilized.

    let mirror = slice.len() / 2;
    let offset_mirror = offset + mirror;
    let offset_length = offset + slice.len();
    let trailing = mirror.min(offset_length % BITS_PER_HASH);
    let leading = (mirror - trailing) % BITS_PER_HASH;

    let (low, mut high) = slice.split_at_mut(mirror);

    if low.len() < high.len() {
        high = &mut high[1..];
    }

    assert_eq!(low.len(), mirror);
    assert_eq!(high.len(), mirror);

    if trailing > 0 {
        let source = compute_source(seed, round, offset_length / BITS_PER_HASH);
        let bit_indices = (0..offset_length % BITS_PER_HASH).rev();
        let low_elements = low[..trailing].iter_mut();
        let high_elements = high[mirror - trailing..].iter_mut().rev();

        swap_using_source(source, bit_indices, low_elements, high_elements);
    }

    for (offset_chunk_index, low_chunk, high_chunk) in izip!(
        (0..offset_length / BITS_PER_HASH).rev(),
        low[trailing..].chunks_exact_mut(BITS_PER_HASH),
        high[..mirror - trailing].rchunks_exact_mut(BITS_PER_HASH),
    ) {
        let source = compute_source(seed, round, offset_chunk_index);
        let bit_indices = 0..BITS_PER_HASH;
        let low_elements = low_chunk.iter_mut().rev();
        let high_elements = high_chunk;

        swap_using_source(source, bit_indices, low_elements, high_elements);
    }

    if leading > 0 {
        let source = compute_source(seed, round, offset_mirror / BITS_PER_HASH);
        let bit_indices = (0..BITS_PER_HASH).rev();
        let low_elements = low[mirror - leading..].iter_mut();
        let high_elements = high[..leading].iter_mut().rev();

        swap_using_source(source, bit_indices, low_elements, high_elements);
    }
}

fn swap_using_source<'slice, T: 'slice>(
    source: H256,
    bit_indices: impl IntoIterator<Item = usize>,
    low: impl IntoIterator<Item = &'slice mut T>,
    high: impl IntoIterator<Item = &'slice mut T>,
) {
    for (bit_index, index, flip) in izip!(bit_indices, low, high) {
        let bit = source.as_bytes().get_bit(bit_index);

        if bit {
            core::mem::swap(index, flip);
        }
    }
}

#[must_use]
pub fn shuffle_single<P: Preset>(mut index: u64, index_count: NonZeroU64, seed: H256) -> u64 {
    assert!(index < index_count.get());

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);
        let source = compute_source(seed, round, position / BITS_PER_HASH as u64);
        let bit_index = position.to_le_bytes()[0].into();
        let bit = source.as_bytes().get_bit(bit_index);

        if bit {
            index = flip;
        }
    }

    index
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    hashing::hash_256_8(seed, round)
        .index(..size_of::<u64>())
        .try_into()
        .map(u64::from_le_bytes)
        .expect("slice has the same size as u64")
        .rem(index_count)
}

fn compute_source(
    seed: H256,
    round: u8,
    position_window: impl TryInto<u64, Error = impl Debug>,
) -> H256 {
    // Truncate to match the behavior of `compute_shuffled_index` in `consensus-specs`.
    #[allow(clippy::cast_possible_truncation)]
    let position_window = position_window
        .try_into()
        .expect("position_window should fit in u64") as u32;

    hashing::hash_256_8_32(seed, round, position_window)
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use itertools::Itertools as _;
    use types::preset::{Mainnet, Minimal, Preset};

    use super::*;

    const SEEDS: [H256; 2] = [
        H256(hex!(
            "4fe91d85b1d6a9b5e4fd6e8d74efe61e85ecc0d1d06957cbce80c8bb6086a2ab"
        )),
        H256(hex!(
            "2ca0d9f286b352119466220d4e24e1e4a7b573ad2c10b7fcab0ef5e1f6dd1177"
        )),
    ];

    // `shuffle_slice` applies the rounds in reverse, so agreement with
    // `shuffle_single` exercises both directions of the algorithm.
    #[test]
    fn slice_shuffle_agrees_with_single_index_shuffle() {
        for seed in SEEDS {
            // 0 and 1 elements are edge cases. 33 extends past a single source hash with
            // both an odd length and a pivot that splits the mirror regions unevenly.
            for count in [0, 1, 2, 3, 8, 33, 320, 1000] {
                let mut slice = (0..count).collect_vec();

                shuffle_slice::<Minimal, _>(&mut slice, seed)
                    .expect("length of slice fits in u64");

                let Some(count) = NonZeroU64::new(count) else {
                    assert!(slice.is_empty());
                    continue;
                };

                for index in 0..count.get() {
                    let shuffled = shuffle_single::<Minimal>(index, count, seed);
                    assert_eq!(
                        slice[usize::try_from(index).expect("index fits in usize")],
                        shuffled,
                        "shuffles disagree at index {index} with seed {seed:?}",
                    );
                }
            }
        }
    }

    #[test]
    fn round_count_changes_the_permutation() {
        let seed = SEEDS[0];
        let count = NonZeroU64::new(320).expect("count is nonzero");

        let minimal = (0..count.get())
            .map(|index| shuffle_single::<Minimal>(index, count, seed))
            .collect_vec();

        let mainnet = (0..count.get())
            .map(|index| shuffle_single::<Mainnet>(index, count, seed))
            .collect_vec();

        assert_eq!(Minimal::SHUFFLE_ROUND_COUNT, 10);
        assert_eq!(Mainnet::SHUFFLE_ROUND_COUNT, 90);
        assert_ne!(minimal, mainnet);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut slice = (0_u64..1000).collect_vec();

        shuffle_slice::<Mainnet, _>(&mut slice, SEEDS[1]).expect("length of slice fits in u64");

        let mut sorted = slice;
        sorted.sort_unstable();

        assert!(sorted.into_iter().eq(0..1000));
    }
}
