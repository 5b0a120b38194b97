use anyhow::{bail, ensure, Result};
use derive_more::From;
use enum_iterator::Sequence as _;
use helper_functions::{
    accessors,
    error::SignatureKind,
    fork, misc,
    signing::SignForSingleFork as _,
    slot_report::{NullSlotReport, RealSlotReport, SlotReport},
    verifier::{MultiVerifier, NullVerifier, SingleVerifier, Verifier, VerifierOption},
};
use static_assertions::const_assert_eq;
use thiserror::Error;
use types::{
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::{Phase, Toption},
    phase0::{
        containers::DepositData,
        primitives::{Slot, ValidatorIndex},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    altair::{self, EpochReport as AltairEpochReport, Statistics as AltairStatistics},
    bellatrix,
    phase0::{
        self, EpochReport as Phase0EpochReport, StatisticsForReport, StatisticsForTransition,
    },
    unphased::{self, Error, ProcessSlots, StateRootPolicy},
};

#[derive(From)]
pub enum EpochReport {
    Phase0(Phase0EpochReport),
    PostAltair(AltairEpochReport),
}

#[derive(From)]
pub enum Statistics {
    Phase0(StatisticsForReport),
    Altair(AltairStatistics),
}

pub fn untrusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Verify,
        MultiVerifier::default(),
        NullSlotReport,
    )
}

pub fn trusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Trust,
        NullVerifier,
        NullSlotReport,
    )
}

pub fn state_transition_for_report<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<RealSlotReport> {
    let mut slot_report = RealSlotReport::default();

    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::IfNeeded,
        StateRootPolicy::Trust,
        NullVerifier,
        &mut slot_report,
    )?;

    Ok(slot_report)
}

pub fn custom_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    verifier: impl Verifier + Send,
    slot_report: impl SlotReport + Send,
) -> Result<()> {
    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block.message()) {
        self::process_slots(config, state, block.message().slot())?;
    }

    let process_slots = ProcessSlots::Never;

    match (state, block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => phase0::state_transition(
            config,
            state,
            block,
            process_slots,
            state_root_policy,
            verifier,
            slot_report,
        ),
        (BeaconState::Altair(state), SignedBeaconBlock::Altair(block)) => altair::state_transition(
            config,
            state,
            block,
            process_slots,
            state_root_policy,
            verifier,
            slot_report,
        ),
        (BeaconState::Bellatrix(state), SignedBeaconBlock::Bellatrix(block)) => {
            bellatrix::state_transition(
                config,
                state,
                block,
                process_slots,
                state_root_policy,
                verifier,
                slot_report,
            )
        }
        _ => {
            // This match arm will silently match any new phases.
            // Cause a compilation error if a new phase is added.
            const_assert_eq!(Phase::CARDINALITY, 3);

            unreachable!("successful slot processing ensures that phases match")
        }
    }
}

pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    match (state, block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => {
            phase0::verify_signatures(config, state, block, verifier)
        }
        (BeaconState::Altair(state), SignedBeaconBlock::Altair(block)) => {
            altair::verify_signatures(config, state, block, verifier)
        }
        (BeaconState::Bellatrix(state), SignedBeaconBlock::Bellatrix(block)) => {
            bellatrix::verify_signatures(config, state, block, verifier)
        }
        _ => {
            // This match arm will silently match any new phases.
            // Cause a compilation error if a new phase is added.
            const_assert_eq!(Phase::CARDINALITY, 3);

            bail!(PhaseError {
                state_phase: state.phase(),
                block_phase: block.phase(),
            });
        }
    }
}

pub fn process_block_for_gossip<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
) -> Result<()> {
    match (state, block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => {
            phase0::process_block_for_gossip(config, state, block)
        }
        (BeaconState::Altair(state), SignedBeaconBlock::Altair(block)) => {
            altair::process_block_for_gossip(config, state, block)
        }
        (BeaconState::Bellatrix(state), SignedBeaconBlock::Bellatrix(block)) => {
            bellatrix::process_block_for_gossip(config, state, block)
        }
        _ => {
            // This match arm will silently match any new phases.
            // Cause a compilation error if a new phase is added.
            const_assert_eq!(Phase::CARDINALITY, 3);

            bail!(PhaseError {
                state_phase: state.phase(),
                block_phase: block.phase(),
            });
        }
    }
}

/// Verifies the base signature of `block` against `head_state`.
///
/// Unlike [`process_block_for_gossip`], this does not require the state to be advanced to the
/// block's slot. The proposer index cannot be validated this way, so the signature is checked
/// against the proposer the block claims.
pub fn verify_base_signature_with_head_state<P: Preset>(
    config: &Config,
    head_state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
) -> Result<()> {
    let message = block.message();

    SingleVerifier.verify_singular(
        message.signing_root(config, head_state),
        block.signature(),
        accessors::public_key(head_state, message.proposer_index())?,
        SignatureKind::Block,
    )
}

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    // `process_block_header` already prevents multiple blocks from being applied in the same slot
    // (see <https://github.com/ethereum/consensus-specs/releases/tag/v0.11.3>).
    // However, without this `process_slots` and `process_slots_internal` become idempotent.
    // As a result, transitions with preprocessed states succeed even with `ProcessSlots::Always`.
    ensure!(
        state.slot() < slot,
        Error::<P>::SlotNotLater {
            current: state.slot(),
            target: slot,
        },
    );

    // If multiple phases have the same fork slots,
    // the state may need to be upgraded multiple times in the same slot.
    let final_phase = config.phase_at_slot::<P>(slot);

    while state.slot() < slot || state.phase() < final_phase {
        let mut made_progress = false;

        // The cloning below could be avoided using `replace_with`,
        // but the added complexity is probably not worth it.
        match state {
            BeaconState::Phase0(phase0_state) => {
                let altair_fork_slot = config.fork_slot::<P>(Phase::Altair);

                let last_slot_in_phase = Toption::Some(slot)
                    .min(altair_fork_slot)
                    .expect("result of min should always be Some because slot is always Some");

                if phase0_state.slot < last_slot_in_phase {
                    phase0::process_slots(config, phase0_state, last_slot_in_phase)?;

                    made_progress = true;
                }

                if Toption::Some(last_slot_in_phase) == altair_fork_slot {
                    *state = fork::upgrade_to_altair(config, phase0_state.as_ref().clone())?.into();

                    made_progress = true;
                }
            }
            BeaconState::Altair(altair_state) => {
                let bellatrix_fork_slot = config.fork_slot::<P>(Phase::Bellatrix);

                let last_slot_in_phase = Toption::Some(slot)
                    .min(bellatrix_fork_slot)
                    .expect("result of min should always be Some because slot is always Some");

                if altair_state.slot < last_slot_in_phase {
                    altair::process_slots(config, altair_state, last_slot_in_phase)?;

                    made_progress = true;
                }

                if Toption::Some(last_slot_in_phase) == bellatrix_fork_slot {
                    *state =
                        fork::upgrade_to_bellatrix(config, altair_state.as_ref().clone()).into();

                    made_progress = true;
                }
            }
            BeaconState::Bellatrix(bellatrix_state) => {
                bellatrix::process_slots(config, bellatrix_state, slot)?;

                made_progress = true;
            }
        }

        assert!(made_progress);
    }

    Ok(())
}

// `process_justification_and_finalization` is used in the fork choice rule starting with
// `consensus-specs` version 1.3.0-rc.4.
pub fn process_justification_and_finalization(state: &mut BeaconState<impl Preset>) -> Result<()> {
    match state {
        BeaconState::Phase0(state) => {
            let (statistics, _, _) = phase0::statistics::<_, StatisticsForTransition>(state)?;
            phase0::process_justification_and_finalization(state, statistics);
        }
        BeaconState::Altair(state) => {
            let (statistics, _, _) = altair::statistics(state);
            altair::process_justification_and_finalization(state, statistics);
        }
        BeaconState::Bellatrix(state) => {
            let (statistics, _, _) = altair::statistics(state);
            altair::process_justification_and_finalization(state, statistics);
        }
    }

    Ok(())
}

pub fn process_epoch(config: &Config, state: &mut BeaconState<impl Preset>) -> Result<()> {
    match state {
        BeaconState::Phase0(state) => phase0::process_epoch(config, state),
        BeaconState::Altair(state) => altair::process_epoch(config, state),
        BeaconState::Bellatrix(state) => bellatrix::process_epoch(config, state),
    }
}

pub fn epoch_report(config: &Config, state: &mut BeaconState<impl Preset>) -> Result<EpochReport> {
    process_slots_for_epoch_report(config, state)?;

    let report = match state {
        BeaconState::Phase0(state) => phase0::epoch_report(config, state)?.into(),
        BeaconState::Altair(state) => altair::epoch_report(config, state)?.into(),
        BeaconState::Bellatrix(state) => bellatrix::epoch_report(config, state)?.into(),
    };

    post_process_slots_for_epoch_report(config, state)?;

    Ok(report)
}

fn process_slots_for_epoch_report<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<()> {
    let next_epoch = accessors::get_next_epoch(state);
    let last_slot = misc::compute_start_slot_at_epoch::<P>(next_epoch) - 1;

    if state.slot() < last_slot {
        process_slots(config, state, last_slot)?;
    }

    unphased::process_slot(state);

    assert!(misc::is_epoch_start::<P>(state.slot() + 1));

    Ok(())
}

fn post_process_slots_for_epoch_report<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<()> {
    let post_slot = state.slot() + 1;

    // If multiple phases have the same fork slots,
    // the state may need to be upgraded multiple times in the same slot.
    let final_phase = config.phase_at_slot::<P>(post_slot);

    *state.slot_mut() = post_slot;

    while state.phase() < final_phase {
        // The cloning below could be avoided using `replace_with`,
        // but the added complexity is probably not worth it.
        match state {
            BeaconState::Phase0(phase0_state) => {
                let altair_fork_slot = config.fork_slot::<P>(Phase::Altair);

                if Toption::Some(post_slot) == altair_fork_slot {
                    *state = fork::upgrade_to_altair(config, phase0_state.as_ref().clone())?.into();
                }
            }
            BeaconState::Altair(altair_state) => {
                let bellatrix_fork_slot = config.fork_slot::<P>(Phase::Bellatrix);

                if Toption::Some(post_slot) == bellatrix_fork_slot {
                    *state =
                        fork::upgrade_to_bellatrix(config, altair_state.as_ref().clone()).into();
                }
            }
            BeaconState::Bellatrix(_) => {}
        }
    }

    Ok(())
}

pub fn process_untrusted_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    slot_report: impl SlotReport,
    skip_randao_verification: bool,
) -> Result<()> {
    let verifier = if skip_randao_verification {
        MultiVerifier::new([VerifierOption::SkipRandaoVerification])
    } else {
        MultiVerifier::default()
    };

    process_block(config, state, block, verifier, slot_report)
}

pub fn process_trusted_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    slot_report: impl SlotReport,
) -> Result<()> {
    process_block(config, state, block, NullVerifier, slot_report)
}

fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    verifier: impl Verifier,
    slot_report: impl SlotReport,
) -> Result<()> {
    match (state, block) {
        (BeaconState::Phase0(state), BeaconBlock::Phase0(block)) => {
            phase0::process_block(config, state, block, verifier, slot_report)
        }
        (BeaconState::Altair(state), BeaconBlock::Altair(block)) => {
            altair::process_block(config, state, block, verifier, slot_report)
        }
        (BeaconState::Bellatrix(state), BeaconBlock::Bellatrix(block)) => {
            bellatrix::process_block(config, state, block, verifier, slot_report)
        }
        (state, _) => {
            // This match arm will silently match any new phases.
            // Cause a compilation error if a new phase is added.
            const_assert_eq!(Phase::CARDINALITY, 3);

            bail!(PhaseError {
                state_phase: state.phase(),
                block_phase: block.phase(),
            });
        }
    }
}

pub fn process_deposit_data(
    config: &Config,
    state: &mut BeaconState<impl Preset>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    match state {
        BeaconState::Phase0(state) => phase0::process_deposit_data(config, state, deposit_data),
        BeaconState::Altair(state) => altair::process_deposit_data(config, state, deposit_data),
        BeaconState::Bellatrix(state) => {
            // The use of `altair::process_deposit_data` is intentional.
            // Bellatrix does not modify `process_deposit_data`.
            altair::process_deposit_data(config, state, deposit_data)
        }
    }
}

pub fn statistics<P: Preset>(state: &BeaconState<P>) -> Result<Statistics> {
    let statistics = match state {
        BeaconState::Phase0(state) => {
            let (statistics, _, _) = phase0::statistics::<P, StatisticsForReport>(state)?;
            statistics.into()
        }
        BeaconState::Altair(state) => {
            let (statistics, _, _) = altair::statistics(state);
            statistics.into()
        }
        BeaconState::Bellatrix(state) => {
            let (statistics, _, _) = altair::statistics(state);
            statistics.into()
        }
    };

    Ok(statistics)
}

// Slots would provide more information, but they're not the direct cause of this error.
// The purpose of this error is to reveal bugs, so phases are more appropriate.
#[derive(Debug, Error)]
#[error("state and block phases do not match (state: {state_phase}, block: {block_phase})")]
pub struct PhaseError {
    state_phase: Phase,
    block_phase: Phase,
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use bls::{SecretKey, SecretKeyBytes};
    use ssz::PersistentList;
    use tap::{Conv as _, TryConv as _};
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            consts::FAR_FUTURE_EPOCH,
            containers::Validator,
        },
        preset::Minimal,
    };
    use typenum::Unsigned as _;

    use super::*;

    // Validators need real public keys because upgrading to Altair
    // computes sync committees from decompressed keys.
    fn genesis_phase0_state() -> Result<BeaconState<Minimal>> {
        let validators = (0..8)
            .map(|index| {
                let secret_key = [b'0' + index; 32]
                    .conv::<SecretKeyBytes>()
                    .try_conv::<SecretKey>()?;

                Ok(Validator {
                    pubkey: secret_key.to_public_key().into(),
                    effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
                    activation_epoch: 0,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    ..Validator::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let state = Phase0BeaconState::<Minimal> {
            validators: PersistentList::try_from_iter(validators)?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            ..Phase0BeaconState::default()
        };

        Ok(state.into())
    }

    #[test]
    fn process_slots_upgrades_through_all_phases() -> Result<()> {
        let config = Config::minimal().rapid_upgrade();
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = genesis_phase0_state()?;

        assert_eq!(state.phase(), Phase::Phase0);

        process_slots(&config, &mut state, slots_per_epoch)?;

        assert_eq!(state.phase(), Phase::Altair);
        assert_eq!(state.slot(), slots_per_epoch);

        process_slots(&config, &mut state, slots_per_epoch * 2)?;

        assert_eq!(state.phase(), Phase::Bellatrix);
        assert_eq!(state.slot(), slots_per_epoch * 2);

        Ok(())
    }

    #[test]
    fn process_slots_rejects_earlier_slots() -> Result<()> {
        let config = Config::minimal();
        let mut state = genesis_phase0_state()?;

        process_slots(&config, &mut state, 3)?;

        process_slots(&config, &mut state, 3)
            .expect_err("transitioning to the current slot should fail");

        process_slots(&config, &mut state, 2)
            .expect_err("transitioning to an earlier slot should fail");

        Ok(())
    }

    #[test]
    fn process_epoch_dispatches_on_phase() -> Result<()> {
        let config = Config::minimal().start_and_stay_in(Phase::Phase0);
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = genesis_phase0_state()?;

        process_slots(&config, &mut state, slots_per_epoch * 2)?;

        process_epoch(&config, &mut state)?;

        assert_eq!(state.phase(), Phase::Phase0);

        Ok(())
    }
}
