use anyhow::{ensure, Error as AnyhowError, Result};
use bit_field::BitField as _;
use itertools::Itertools as _;
use types::{
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{AttestationData, IndexedAttestation, Validator},
        primitives::{Epoch, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{
    accessors,
    error::{Error, SignatureKind},
    signing::SignForSingleFork as _,
    verifier::Verifier,
};

// > Check if ``validator`` is active.
#[inline]
#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

// > Check if ``validator`` is eligible to be placed into the activation queue.
#[must_use]
pub const fn is_eligible_for_activation_queue<P: Preset>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
        && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
}

// > Check if ``validator`` is eligible for activation.
#[must_use]
pub fn is_eligible_for_activation<P: Preset>(
    state: &impl BeaconState<P>,
    validator: &Validator,
) -> bool {
    // > Placement in queue is finalized
    validator.activation_eligibility_epoch <= state.finalized_checkpoint().epoch
        // > Has not yet been activated
        && validator.activation_epoch == FAR_FUTURE_EPOCH
}

#[inline]
#[must_use]
pub const fn is_eligible_for_penalties(validator: &Validator, previous_epoch: Epoch) -> bool {
    is_active_validator(validator, previous_epoch)
        || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
}

// > Check if ``validator`` is slashable.
#[inline]
#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && epoch < validator.withdrawable_epoch
        && validator.activation_epoch <= epoch
}

// > Check if ``data_1`` and ``data_2`` are slashable according to Casper FFG rules.
#[inline]
#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

// This doesn't verify the signature when called directly with `MultiVerifier`.
// When calling directly, use `SingleVerifier` or call `finalize` manually.
pub fn validate_constructed_indexed_attestation<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    validate_indexed_attestation(config, state, indexed_attestation, verifier, false)
}

pub fn validate_received_indexed_attestation<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    validate_indexed_attestation(config, state, indexed_attestation, verifier, true)
}

fn validate_indexed_attestation<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    mut verifier: impl Verifier,
    validate_indices_sorted_and_unique: bool,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    ensure!(!indices.is_empty(), Error::AttestationHasNoAttestingIndices);

    if validate_indices_sorted_and_unique {
        // > Verify indices are sorted and unique
        ensure!(
            indices.iter().tuple_windows().all(|(a, b)| a < b),
            Error::AttestingIndicesNotSortedAndUnique,
        );
    }

    // > Verify aggregate signature
    itertools::process_results(
        indices.iter().copied().map(|validator_index| {
            accessors::public_key(state, validator_index)?
                .decompress()
                .map_err(AnyhowError::new)
        }),
        |public_keys| {
            verifier.verify_aggregate(
                indexed_attestation.data.signing_root(config, state),
                indexed_attestation.signature,
                public_keys,
                SignatureKind::Attestation,
            )
        },
    )?
}

/// [`is_valid_merkle_branch`](https://github.com/ethereum/consensus-specs/blob/v1.4.0-beta.5/specs/phase0/beacon-chain.md#is_valid_merkle_branch)
#[must_use]
pub fn is_valid_merkle_branch(
    leaf: H256,
    branch: impl IntoIterator<Item = H256>,
    index: u64,
    root: H256,
) -> bool {
    let mut hash = leaf;

    for (height, node) in branch.into_iter().enumerate() {
        if index.get_bit(height) {
            hash = hashing::hash_256_256(node, hash);
        } else {
            hash = hashing::hash_256_256(hash, node);
        }
    }

    hash == root
}

/// <https://github.com/ethereum/consensus-specs/blob/f7da1a38347155589f5e0403ad3290ffb77f4da6/specs/phase0/beacon-chain.md#helpers>
#[must_use]
pub fn is_in_inactivity_leak<P: Preset>(state: &impl BeaconState<P>) -> bool {
    accessors::get_finality_delay(state) > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SecretKeyBytes};
    use std_ext::CopyExt as _;
    use tap::{Conv as _, TryConv as _};
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState, consts::FAR_FUTURE_EPOCH,
            containers::Checkpoint,
        },
        preset::Mainnet,
    };

    use crate::verifier::SingleVerifier;

    use super::*;

    #[test]
    fn test_not_activated() {
        let validator = inactive_validator();
        let epoch = 10;

        assert!(!is_active_validator(&validator, epoch));
    }

    #[test]
    fn test_activated() {
        let validator = Validator {
            activation_epoch: 4,
            ..inactive_validator()
        };
        let epoch = 10;

        assert!(is_active_validator(&validator, epoch));
    }

    #[test]
    fn test_exited() {
        let validator = Validator {
            exit_epoch: 10,
            ..inactive_validator()
        };
        let epoch = 10;

        assert!(!is_active_validator(&validator, epoch));
    }

    #[test]
    fn test_already_slashed() {
        let validator = Validator {
            slashed: true,
            ..exiting_validator()
        };
        let epoch = 10;

        assert!(!is_slashable_validator(&validator, epoch));
    }

    #[test]
    fn test_not_slashable_not_active() {
        let validator = inactive_validator();
        let epoch = 10;

        assert!(!is_slashable_validator(&validator, epoch));
    }

    #[test]
    fn test_not_slashable_withdrawable() {
        let validator = exiting_validator();
        let epoch = 11;

        assert!(!is_slashable_validator(&validator, epoch));
    }

    #[test]
    fn test_slashable() {
        let validator = exiting_validator();
        let epoch = 10;

        assert!(is_slashable_validator(&validator, epoch));
    }

    #[test]
    fn test_double_vote_attestation_data() {
        let data_1 = AttestationData {
            target: Checkpoint {
                root: H256::repeat_byte(1),
                ..Checkpoint::default()
            },
            ..AttestationData::default()
        };
        let data_2 = AttestationData::default();

        assert!(is_slashable_attestation_data(data_1, data_2));
    }

    #[test]
    fn test_equal_attestation_data() {
        let data_1 = AttestationData::default();
        let data_2 = AttestationData::default();

        assert!(!is_slashable_attestation_data(data_1, data_2));
    }

    #[test]
    fn test_surround_vote_attestation_data() {
        let data_1 = AttestationData {
            source: Checkpoint {
                epoch: 0,
                ..Checkpoint::default()
            },
            target: Checkpoint {
                epoch: 4,
                ..Checkpoint::default()
            },
            ..AttestationData::default()
        };
        let data_2 = AttestationData {
            source: Checkpoint {
                epoch: 1,
                ..Checkpoint::default()
            },
            target: Checkpoint {
                epoch: 3,
                ..Checkpoint::default()
            },
            ..AttestationData::default()
        };

        assert!(is_slashable_attestation_data(data_1, data_2));
    }

    #[test]
    fn test_not_slashable_attestation_data() {
        let data_1 = AttestationData {
            source: Checkpoint {
                epoch: 0,
                ..Checkpoint::default()
            },
            target: Checkpoint {
                epoch: 4,
                ..Checkpoint::default()
            },
            ..AttestationData::default()
        };
        let data_2 = AttestationData {
            source: Checkpoint {
                epoch: 4,
                root: H256::repeat_byte(1),
            },
            target: Checkpoint {
                epoch: 5,
                root: H256::repeat_byte(1),
            },
            ..AttestationData::default()
        };

        assert!(!is_slashable_attestation_data(data_1, data_2));
    }

    #[test]
    fn test_valid_merkle_branch() {
        let leaf_00 = H256::repeat_byte(0xaa);
        let leaf_01 = H256::repeat_byte(0xbb);
        let leaf_10 = H256::repeat_byte(0xcc);
        let leaf_11 = H256::repeat_byte(0xdd);

        let internal_0x = hashing::hash_256_256(leaf_00, leaf_01);
        let internal_1x = hashing::hash_256_256(leaf_10, leaf_11);

        let root = hashing::hash_256_256(internal_0x, internal_1x);

        assert!(is_valid_merkle_branch(
            leaf_00,
            [leaf_01, internal_1x],
            0,
            root,
        ));

        assert!(is_valid_merkle_branch(
            leaf_01,
            [leaf_00, internal_1x],
            1,
            root,
        ));

        assert!(is_valid_merkle_branch(
            leaf_10,
            [leaf_11, internal_0x],
            2,
            root,
        ));

        assert!(is_valid_merkle_branch(
            leaf_11,
            [leaf_10, internal_0x],
            3,
            root,
        ));
    }

    #[test]
    fn test_invalid_merkle_branch() {
        let leaf_00 = H256::repeat_byte(0xaa);
        let leaf_01 = H256::repeat_byte(0xbb);
        let leaf_10 = H256::repeat_byte(0xcc);
        let leaf_11 = H256::repeat_byte(0xdd);

        let internal_0x = hashing::hash_256_256(leaf_00, leaf_01);
        let internal_1x = hashing::hash_256_256(leaf_10, leaf_11);

        let root = hashing::hash_256_256(internal_0x, internal_1x);

        assert!(!is_valid_merkle_branch(
            leaf_00,
            // This should be `[leaf_01, internal_1x]`.
            [leaf_01, internal_0x],
            0,
            root,
        ));

        assert!(!is_valid_merkle_branch(
            leaf_11,
            [leaf_10, internal_0x],
            3,
            // This should be `root`.
            H256::repeat_byte(0xff),
        ));

        assert!(!is_valid_merkle_branch(
            leaf_11,
            [leaf_10, internal_0x],
            // This should be `3`.
            0,
            root,
        ));
    }

    #[test]
    fn validate_received_indexed_attestation_index_set_not_sorted() {
        let state = Phase0BeaconState::<Mainnet>::default();

        let attestation = IndexedAttestation {
            attesting_indices: [2, 1, 3].try_into().expect("length is under maximum"),
            ..IndexedAttestation::default()
        };

        validate_received_indexed_attestation(
            &Config::mainnet(),
            &state,
            &attestation,
            SingleVerifier,
        )
        .expect_err("validation should fail");
    }

    #[test]
    fn validate_received_indexed_attestation_nonexistent_validators() {
        let state = Phase0BeaconState::<Mainnet>::default();

        let attestation = IndexedAttestation {
            attesting_indices: [0].try_into().expect("length is under maximum"),
            ..IndexedAttestation::default()
        };

        validate_received_indexed_attestation(
            &Config::mainnet(),
            &state,
            &attestation,
            SingleVerifier,
        )
        .expect_err("validation should fail");
    }

    #[test]
    fn validate_received_indexed_attestation_invalid_signature() {
        let state = Phase0BeaconState::<Mainnet> {
            validators: [
                inactive_validator(),
                inactive_validator(),
                inactive_validator(),
            ]
            .try_into()
            .expect("length is under maximum"),
            ..Phase0BeaconState::default()
        };

        let attestation = IndexedAttestation {
            attesting_indices: [0, 1, 2].try_into().expect("length is under maximum"),
            ..IndexedAttestation::default()
        };

        validate_received_indexed_attestation(
            &Config::mainnet(),
            &state,
            &attestation,
            SingleVerifier,
        )
        .expect_err("validation should fail");
    }

    #[test]
    fn validate_received_indexed_attestation_valid_signature() -> Result<()> {
        let config = Config::mainnet();

        let secret_key_1 = b"????????????????????????????????"
            .copy()
            .conv::<SecretKeyBytes>()
            .try_conv::<SecretKey>()?;

        let secret_key_2 = b"!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!"
            .copy()
            .conv::<SecretKeyBytes>()
            .try_conv::<SecretKey>()?;

        let state = Phase0BeaconState::<Mainnet> {
            validators: [
                Validator {
                    pubkey: secret_key_1.to_public_key().into(),
                    ..inactive_validator()
                },
                Validator {
                    pubkey: secret_key_2.to_public_key().into(),
                    ..inactive_validator()
                },
            ]
            .try_into()?,
            ..Phase0BeaconState::default()
        };

        let data = AttestationData {
            beacon_block_root: H256::repeat_byte(0xff),
            ..AttestationData::default()
        };

        let signature_1 = data.sign(&config, &state, &secret_key_1);
        let signature_2 = data.sign(&config, &state, &secret_key_2);

        let aggregate_signature = signature_1.aggregate(signature_2);

        let attestation = IndexedAttestation {
            attesting_indices: [0, 1].try_into()?,
            data,
            signature: aggregate_signature.into(),
        };

        validate_received_indexed_attestation(&config, &state, &attestation, SingleVerifier)
    }

    fn inactive_validator() -> Validator {
        Validator {
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        }
    }

    fn exiting_validator() -> Validator {
        Validator {
            exit_epoch: 10,
            withdrawable_epoch: 11,
            ..Validator::default()
        }
    }
}
