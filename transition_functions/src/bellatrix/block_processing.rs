use anyhow::{ensure, Result};
use helper_functions::{
    accessors::{self, initialize_shuffled_indices, RootCache},
    bellatrix::slash_validator,
    error::SignatureKind,
    signing::SignForSingleFork as _,
    slot_report::SlotReport,
    verifier::{SingleVerifier, Triple, Verifier},
};
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use typenum::Unsigned as _;
use types::{
    bellatrix::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockBody, SignedBeaconBlock},
    },
    config::Config,
    nonstandard::SlashingKind,
    phase0::containers::{AttesterSlashing, ProposerSlashing},
    preset::Preset,
};

use crate::{
    altair,
    unphased::{self, Error},
};

/// <https://github.com/ethereum/consensus-specs/blob/0b76c8367ed19014d104e3fbd4718e73f459a748/specs/bellatrix/beacon-chain.md#block-processing>
pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
    slot_report: impl SlotReport,
) -> Result<()> {
    verifier.reserve(altair::count_required_signatures(block));
    custom_process_block(config, state, block, &mut verifier, slot_report)?;
    verifier.finish()
}

pub fn process_block_for_gossip<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
) -> Result<()> {
    debug_assert_eq!(state.slot, block.message.slot);

    unphased::process_block_header_for_gossip(state, &block.message)?;

    SingleVerifier.verify_singular(
        block.message.signing_root(config, state),
        block.signature,
        accessors::public_key(state, block.message.proposer_index)?,
        SignatureKind::Block,
    )?;

    Ok(())
}

pub fn custom_process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
    mut slot_report: impl SlotReport,
) -> Result<()> {
    debug_assert_eq!(state.slot, block.slot);

    unphased::process_block_header(state, block)?;
    unphased::process_randao(config, state, &block.body, &mut verifier)?;
    unphased::process_eth1_data(state, &block.body)?;

    process_operations(config, state, &block.body, &mut verifier, &mut slot_report)?;

    altair::process_sync_aggregate(
        config,
        state,
        block.body.sync_aggregate,
        verifier,
        slot_report,
    )
}

fn process_operations<P: Preset, V: Verifier>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: V,
    mut slot_report: impl SlotReport,
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let computed =
        P::MaxDeposits::U64.min(state.eth1_data.deposit_count - state.eth1_deposit_index);
    let in_block = body.deposits.len().try_into()?;

    ensure!(
        computed == in_block,
        Error::<P>::DepositCountMismatch { computed, in_block },
    );

    for proposer_slashing in body.proposer_slashings.iter().copied() {
        process_proposer_slashing(
            config,
            state,
            proposer_slashing,
            &mut verifier,
            &mut slot_report,
        )?;
    }

    for attester_slashing in &body.attester_slashings {
        process_attester_slashing(
            config,
            state,
            attester_slashing,
            &mut verifier,
            &mut slot_report,
        )?;
    }

    // See the comment in `altair::process_operations` for why
    // attestation validations run sequentially with a null verifier.
    if V::IS_NULL {
        for attestation in &body.attestations {
            unphased::validate_attestation_with_verifier(
                config,
                state,
                attestation,
                &mut verifier,
            )?;
        }
    } else {
        initialize_shuffled_indices(state, &body.attestations)?;

        let triples = body
            .attestations
            .par_iter()
            .map(|attestation| {
                let mut triple = Triple::default();

                unphased::validate_attestation_with_verifier(
                    config,
                    state,
                    attestation,
                    &mut triple,
                )?;

                Ok(triple)
            })
            .collect::<Result<Vec<_>>>()?;

        verifier.extend(triples, SignatureKind::Attestation)?;
    }

    let mut root_cache = RootCache::default();

    for attestation in &body.attestations {
        altair::apply_attestation(state, attestation, &mut root_cache, &mut slot_report)?;
    }

    // The conditional is not needed for correctness.
    // It only serves to avoid overhead when processing blocks with no deposits.
    if !body.deposits.is_empty() {
        let combined_deposits =
            unphased::validate_deposits(config, state, body.deposits.iter().copied())?;

        altair::apply_deposits(state, body.deposits.len(), combined_deposits, slot_report)?;
    }

    for voluntary_exit in body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)?;
    }

    Ok(())
}

pub fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    verifier: impl Verifier,
    slot_report: impl SlotReport,
) -> Result<()> {
    unphased::validate_proposer_slashing_with_verifier(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator(
        config,
        state,
        index,
        None,
        SlashingKind::Proposer,
        slot_report,
    )
}

pub fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    verifier: impl Verifier,
    mut slot_report: impl SlotReport,
) -> Result<()> {
    let slashable_indices = unphased::validate_attester_slashing_with_verifier(
        config,
        state,
        attester_slashing,
        verifier,
    )?;

    for validator_index in slashable_indices {
        slash_validator(
            config,
            state,
            validator_index,
            None,
            SlashingKind::Attester,
            &mut slot_report,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use helper_functions::verifier::NullVerifier;
    use ssz::PersistentList;
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{BeaconBlockHeader, SignedBeaconBlockHeader, Validator},
            primitives::H256,
        },
        preset::Minimal,
    };

    use super::*;

    // Uses 8 validators so that each slot of an epoch has a single committee of one validator.
    fn state_with_8_active_validators() -> Result<BeaconState<Minimal>> {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Ok(BeaconState {
            slot: 1,
            validators: PersistentList::try_from_iter(itertools::repeat_n(validator, 8))?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_participation: PersistentList::try_from_iter([0; 8])?,
            current_epoch_participation: PersistentList::try_from_iter([0; 8])?,
            inactivity_scores: PersistentList::try_from_iter([0; 8])?,
            ..BeaconState::default()
        })
    }

    #[test]
    fn process_proposer_slashing_applies_bellatrix_penalty() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_8_active_validators()?;

        let header_1 = BeaconBlockHeader {
            slot: 1,
            proposer_index: 3,
            parent_root: H256::repeat_byte(1),
            ..BeaconBlockHeader::default()
        };

        let header_2 = BeaconBlockHeader {
            parent_root: H256::repeat_byte(2),
            ..header_1
        };

        let proposer_slashing = ProposerSlashing {
            signed_header_1: SignedBeaconBlockHeader {
                message: header_1,
                signature: Default::default(),
            },
            signed_header_2: SignedBeaconBlockHeader {
                message: header_2,
                signature: Default::default(),
            },
        };

        process_proposer_slashing(
            &config,
            &mut state,
            proposer_slashing,
            NullVerifier,
            NullSlotReport,
        )?;

        let validator = state.validators.get(3)?;

        assert!(validator.slashed);

        let slashing_penalty =
            Minimal::MAX_EFFECTIVE_BALANCE / Minimal::MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX;

        assert!(*state.balances.get(3)? <= Minimal::MAX_EFFECTIVE_BALANCE - slashing_penalty);

        Ok(())
    }
}
