// These are re-exported primarily to make `ssz_derive` work without additional dependencies.
pub use ethereum_types::H256;
pub use hashing;
pub use ssz_derive::Ssz;
pub use typenum::U1;

pub use crate::{
    bit_list::BitList,
    bit_vector::BitVector,
    bundle_size::BundleSize,
    consts::{Endianness, Offset, BYTES_PER_LENGTH_OFFSET},
    contiguous_list::ContiguousList,
    contiguous_vector::ContiguousVector,
    error::{IndexError, PushError, ReadError, WriteError},
    hc::Hc,
    merkle_tree::{mix_in_length, MerkleTree, ProofWithLength},
    persistent_list::PersistentList,
    persistent_vector::PersistentVector,
    porcelain::{SszHash, SszRead, SszReadDefault, SszSize, SszWrite},
    shared::{read_offset_unchecked, subslice, write_offset},
    size::Size,
    type_level::{
        BitVectorBits, BytesToDepth, ContiguousVectorElements, FitsInU64, MerkleBits,
        MerkleElements, MinimumBundleSize, PersistentVectorElements, ProofSize, UnhashedBundleSize,
    },
    zero_default::ZeroDefault,
};

mod arrays;
mod basic;
mod bit_list;
mod bit_vector;
mod bundle_size;
mod consts;
mod contiguous_list;
mod contiguous_vector;
mod error;
mod hc;
mod iter;
mod merkle_tree;
mod negative;
mod persistent_list;
mod persistent_vector;
mod pointers;
mod porcelain;
mod shared;
mod size;
mod type_level;
mod zero_default;
