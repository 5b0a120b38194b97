use core::{num::NonZeroU64, ops::Div as _};

use anyhow::Result;
use arithmetic::U64Ext as _;
use bls::PublicKeyBytes;
use ssz::SszHash;
use tap::{Pipe as _, TryConv as _};
use typenum::Unsigned as _;
use types::{
    cache::PackedIndices,
    config::Config,
    phase0::{
        consts::BLS_WITHDRAWAL_PREFIX,
        containers::{ForkData, SigningData},
        primitives::{Domain, DomainType, Epoch, Slot, ValidatorIndex, Version, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

// `consensus-specs` uses this in at least 2 places:
// - <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/fork-choice.md#compute_slots_since_epoch_start>
// - <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/validator.md#broadcast-attestation>
#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot - compute_start_slot_at_epoch::<P>(compute_epoch_at_slot::<P>(slot))
}

#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

// > Return the 32-byte fork data root for the ``current_version`` and ``genesis_validators_root``.
// > This is used primarily in signature domains to avoid collisions across forks/chains.
fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .hash_tree_root()
}

pub(crate) fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..].copy_from_slice(&fork_data_root[..28]);
    domain
}

pub fn compute_signing_root(object: &(impl SszHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.hash_tree_root(),
        domain,
    }
    .hash_tree_root()
}

pub(crate) fn compute_shuffled_index<P: Preset>(
    index: ValidatorIndex,
    index_count: NonZeroU64,
    seed: H256,
) -> ValidatorIndex {
    shuffling::shuffle_single::<P>(index, index_count, seed)
}

pub(crate) fn compute_proposer_index<P: Preset>(
    state: &impl BeaconState<P>,
    indices: &PackedIndices,
    seed: H256,
) -> Result<ValidatorIndex> {
    let total = indices
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let max_random_byte = u64::from(u8::MAX);

    (0..u64::MAX / H256::len_bytes() as u64)
        .flat_map(|quotient| {
            hashing::hash_256_64(seed, quotient)
                .to_fixed_bytes()
                .into_iter()
                .map(u64::from)
        })
        .zip(0..)
        .find_map(|(random_byte, attempt)| {
            let shuffled_index_of_index = compute_shuffled_index::<P>(attempt % total, total, seed)
                .try_conv::<usize>()
                .expect(
                    "shuffled_index_of_index fits in usize because it is less than indices.len()",
                );

            let candidate_index = indices
                .get(shuffled_index_of_index)
                .expect("compute_shuffled_index returns a value less than indices.len()");

            let effective_balance = state
                .validators()
                .get(candidate_index)
                .expect("candidate_index was produced by enumerating active validators")
                .effective_balance;

            (effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte)
                .then_some(candidate_index)
        })
        .ok_or(Error::FailedToSelectProposer)
        .map_err(Into::into)
}

#[must_use]
pub const fn previous_slot(slot: Slot) -> Slot {
    slot.saturating_sub(1)
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    active_validator_count
        .div_typenum::<P::SlotsPerEpoch>()
        .div(P::TARGET_COMMITTEE_SIZE)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

// <https://github.com/ethereum/consensus-specs/blob/dc17b1e2b6a4ec3a2104c277a33abae75a43b0fa/specs/phase0/validator.md#bls_withdrawal_prefix>
#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    let mut withdrawal_credentials = hashing::hash_384(public_key);
    withdrawal_credentials[..BLS_WITHDRAWAL_PREFIX.len()].copy_from_slice(BLS_WITHDRAWAL_PREFIX);
    withdrawal_credentials
}

#[must_use]
pub fn vec_of_default<P: Preset, T: Clone + Default>(state: &impl BeaconState<P>) -> Vec<T> {
    vec![T::default(); state.validators().len_usize()]
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use nonzero_ext::nonzero;
    use types::{
        nonstandard::RelativeEpoch,
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            consts::{DOMAIN_BEACON_ATTESTER, FAR_FUTURE_EPOCH},
            containers::Validator,
        },
        preset::Minimal,
    };

    use crate::accessors;

    use super::*;

    #[test]
    fn test_epoch_at_slot() {
        assert_eq!(compute_epoch_at_slot::<Minimal>(9), 1);
        assert_eq!(compute_epoch_at_slot::<Minimal>(8), 1);
        assert_eq!(compute_epoch_at_slot::<Minimal>(7), 0);
    }

    #[test]
    fn test_start_slot_at_epoch() {
        assert_eq!(compute_start_slot_at_epoch::<Minimal>(1), 8);
    }

    #[test]
    fn test_activation_exit_epoch() {
        assert_eq!(compute_activation_exit_epoch::<Minimal>(1), 6);
    }

    #[test]
    fn test_compute_domain() {
        assert_eq!(
            compute_domain(
                &Config::minimal(),
                DOMAIN_BEACON_ATTESTER,
                Some(hex!("00000001").into()),
                None,
            ),
            hex!("0100000018ae4ccbda9538839d79bb18ca09e23e24ae8c1550f56cbb3d84b053").into()
        );
    }

    #[test]
    fn test_compute_shuffled_index_in_range() {
        let index_count = nonzero!(25_u64);

        let shuffled_index = compute_shuffled_index::<Minimal>(2, index_count, H256::random());

        assert!(shuffled_index < index_count.get());
    }

    #[test]
    fn test_compute_proposer_index_in_range() -> Result<()> {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let state = Phase0BeaconState::<Minimal> {
            validators: [validator.clone(), validator].try_into()?,
            ..Phase0BeaconState::default()
        };

        let proposer_index = compute_proposer_index(
            &state,
            accessors::active_validator_indices_ordered(&state, RelativeEpoch::Current),
            H256::random(),
        )?;

        assert!(proposer_index < 2);

        Ok(())
    }
}
