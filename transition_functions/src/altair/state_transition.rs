use core::ops::Not as _;

use anyhow::{Error as AnyhowError, Result};
use helper_functions::{
    accessors,
    error::SignatureKind,
    misc, predicates,
    signing::{RandaoEpoch, SignForSingleFork as _},
    slot_report::SlotReport,
    verifier::{NullVerifier, Triple, Verifier, VerifierOption},
};
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use ssz::Hc;
use types::{
    altair::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    config::Config,
    preset::Preset,
};

use super::{block_processing, slot_processing};
use crate::unphased::{ProcessSlots, StateRootPolicy};

pub fn state_transition<P: Preset, V: Verifier + Send>(
    config: &Config,
    state: &mut Hc<BeaconState<P>>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    verifier: V,
    slot_report: impl SlotReport + Send,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        slot_processing::process_slots(config, state, block.slot)?;
    }

    // See the comment in `phase0::state_transition` for why
    // signature verification runs in parallel with block processing.
    let verify_signatures = V::IS_NULL.not().then(|| {
        let state = state.clone();

        // > Verify signature
        move || verify_signatures(config, &state, signed_block, verifier)
    });

    let process_block = || {
        // > Process block
        block_processing::custom_process_block(
            config,
            state,
            &signed_block.message,
            NullVerifier,
            slot_report,
        )?;

        // > Verify state root
        state_root_policy.verify(state, block)?;

        Ok(())
    };

    if let Some(verify_signatures) = verify_signatures {
        let (signature_result, block_result) = rayon::join(verify_signatures, process_block);
        signature_result.and(block_result)
    } else {
        process_block()
    }
}

pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    verifier.reserve(count_required_signatures(block));

    if !verifier.has_option(VerifierOption::SkipBlockBaseSignatures) {
        // Block signature

        verifier.verify_singular(
            block.message.signing_root(config, state),
            block.signature,
            accessors::public_key(state, block.message.proposer_index)?,
            SignatureKind::Block,
        )?;

        // RANDAO reveal

        verifier.verify_singular(
            RandaoEpoch::from(misc::compute_epoch_at_slot::<P>(block.message.slot))
                .signing_root(config, state),
            block.message.body.randao_reveal,
            accessors::public_key(state, block.message.proposer_index)?,
            SignatureKind::Randao,
        )?;

        // Proposer slashings

        for proposer_slashing in &block.message.body.proposer_slashings {
            for signed_header in [
                proposer_slashing.signed_header_1,
                proposer_slashing.signed_header_2,
            ] {
                verifier.verify_singular(
                    signed_header.message.signing_root(config, state),
                    signed_header.signature,
                    accessors::public_key(state, signed_header.message.proposer_index)?,
                    SignatureKind::Block,
                )?;
            }
        }

        // Attester slashings

        for attester_slashing in &block.message.body.attester_slashings {
            for attestation in [
                &attester_slashing.attestation_1,
                &attester_slashing.attestation_2,
            ] {
                itertools::process_results(
                    attestation
                        .attesting_indices
                        .iter()
                        .copied()
                        .map(|validator_index| {
                            accessors::public_key(state, validator_index)?
                                .decompress()
                                .map_err(AnyhowError::new)
                        }),
                    |public_keys| {
                        verifier.verify_aggregate(
                            attestation.data.signing_root(config, state),
                            attestation.signature,
                            public_keys,
                            SignatureKind::Attestation,
                        )
                    },
                )??
            }
        }

        // Attestations

        let attestations = &block.message.body.attestations;

        accessors::initialize_shuffled_indices(state, attestations)?;

        let triples = attestations
            .par_iter()
            .map(|attestation| {
                let indexed_attestation = accessors::get_indexed_attestation(state, attestation)?;

                let mut triple = Triple::default();

                predicates::validate_constructed_indexed_attestation(
                    config,
                    state,
                    &indexed_attestation,
                    &mut triple,
                )?;

                Ok(triple)
            })
            .collect::<Result<Vec<_>>>()?;

        verifier.extend(triples, SignatureKind::Attestation)?;

        // Voluntary exits

        for voluntary_exit in &block.message.body.voluntary_exits {
            verifier.verify_singular(
                voluntary_exit.message.signing_root(config, state),
                voluntary_exit.signature,
                accessors::public_key(state, voluntary_exit.message.validator_index)?,
                SignatureKind::VoluntaryExit,
            )?;
        }
    }

    if !verifier.has_option(VerifierOption::SkipBlockSyncAggregateSignature) {
        // Sync aggregate

        block_processing::verify_sync_aggregate_signature(
            config,
            state,
            block.message.body.sync_aggregate,
            &mut verifier,
        )?;
    }

    verifier.finish()
}

fn count_required_signatures(block: &SignedBeaconBlock<impl Preset>) -> usize {
    1 + block_processing::count_required_signatures(&block.message)
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SecretKeyBytes, SignatureBytes};
    use helper_functions::verifier::{MultiVerifier, SingleVerifier};
    use ssz::PersistentList;
    use tap::{Conv as _, TryConv as _};
    use try_from_iterator::TryFromIterator as _;
    use types::{
        altair::containers::{BeaconBlock, SyncAggregate},
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::Validator,
            primitives::ValidatorIndex,
        },
        preset::Minimal,
    };

    use super::*;

    fn secret_key(validator_index: ValidatorIndex) -> Result<SecretKey> {
        let bytes = [b'0' + u8::try_from(validator_index)?; 32];
        Ok(bytes.conv::<SecretKeyBytes>().try_conv::<SecretKey>()?)
    }

    fn state_with_real_keys() -> Result<BeaconState<Minimal>> {
        let validators = (0..8)
            .map(|index| {
                Ok(Validator {
                    pubkey: secret_key(index)?.to_public_key().into(),
                    effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
                    activation_epoch: 0,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    ..Validator::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BeaconState {
            slot: 1,
            validators: PersistentList::try_from_iter(validators)?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            ..BeaconState::default()
        })
    }

    fn signed_block(
        config: &Config,
        state: &BeaconState<Minimal>,
    ) -> Result<SignedBeaconBlock<Minimal>> {
        let proposer_index = accessors::get_beacon_proposer_index(state)?;
        let proposer_secret_key = secret_key(proposer_index)?;

        let mut block = BeaconBlock {
            slot: state.slot,
            proposer_index,
            ..BeaconBlock::default()
        };

        // An all-zero signature for an empty sync aggregate is invalid.
        // Only the point at infinity may represent the absence of participants.
        block.body.sync_aggregate = SyncAggregate {
            sync_committee_signature: SignatureBytes::empty(),
            ..SyncAggregate::default()
        };

        block.body.randao_reveal =
            RandaoEpoch::from(misc::compute_epoch_at_slot::<Minimal>(block.slot))
                .sign(config, state, &proposer_secret_key)
                .into();

        let signature = block.sign(config, state, &proposer_secret_key).into();

        Ok(SignedBeaconBlock {
            message: block,
            signature,
        })
    }

    #[test]
    fn verify_signatures_accepts_a_correctly_signed_block() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_real_keys()?;
        let block = signed_block(&config, &state)?;

        // Block signature, RANDAO reveal, and capacity for the sync aggregate.
        assert_eq!(count_required_signatures(&block), 3);

        // Batched verification of the extracted signature sets.
        verify_signatures(&config, &state, &block, MultiVerifier::default())?;

        // Eager verification must accept the same signing roots.
        verify_signatures(&config, &state, &block, SingleVerifier)
    }

    #[test]
    fn verify_signatures_rejects_a_mismatched_randao_reveal() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_real_keys()?;
        let mut block = signed_block(&config, &state)?;

        block.message.body.randao_reveal = block.signature;

        verify_signatures(&config, &state, &block, MultiVerifier::default())
            .expect_err("a RANDAO reveal over the wrong message should be rejected");

        Ok(())
    }
}
