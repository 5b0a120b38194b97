use core::{mem, ops::Mul as _};
use std::collections::HashMap;

use anyhow::Result;
use helper_functions::{
    accessors::{get_current_epoch, total_active_balance},
    misc::vec_of_default,
    mutators::decrease_balance,
};
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use super::epoch_intermediates::{
    self, EpochDeltasForReport, EpochDeltasForTransition, PerformanceForReport,
    Phase0ValidatorSummary, Statistics as _, StatisticsForReport, StatisticsForTransition,
};
use crate::unphased::{self, SlashingPenalties};

pub struct EpochReport {
    pub statistics: StatisticsForReport,
    pub summaries: Vec<Phase0ValidatorSummary>,
    pub performance: Vec<PerformanceForReport>,
    pub epoch_deltas: Vec<EpochDeltasForReport>,
    pub slashing_penalties: HashMap<ValidatorIndex, Gwei>,
    pub post_balances: Vec<Gwei>,
}

pub fn process_epoch(config: &Config, state: &mut BeaconState<impl Preset>) -> Result<()> {
    let (statistics, mut summaries, performance) =
        epoch_intermediates::statistics::<_, StatisticsForTransition>(state)?;

    process_justification_and_finalization(state, statistics);

    // Epoch deltas must be computed after `process_justification_and_finalization`
    // because they depend on the updated value of `BeaconState.finalized_checkpoint`.
    let epoch_deltas: Vec<EpochDeltasForTransition> = epoch_intermediates::epoch_deltas(
        state,
        statistics,
        summaries.iter().copied(),
        performance,
    )?;

    unphased::process_rewards_and_penalties(state, epoch_deltas);
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;
    process_slashings::<_, ()>(state, &summaries);
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    state.cache.advance_epoch();

    Ok(())
}

pub fn epoch_report<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<EpochReport> {
    let (statistics, mut summaries, performance) =
        epoch_intermediates::statistics::<_, StatisticsForReport>(state)?;

    process_justification_and_finalization(state, statistics);

    // Rewards and penalties are not applied in the genesis epoch. Return zero deltas for states in
    // the genesis epoch to avoid making misleading reports.
    let epoch_deltas = if unphased::should_process_rewards_and_penalties(state) {
        epoch_intermediates::epoch_deltas(
            state,
            statistics,
            summaries.iter().copied(),
            performance.iter().copied(),
        )?
    } else {
        vec_of_default(state)
    };

    unphased::process_rewards_and_penalties(state, epoch_deltas.iter().copied());
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;

    let slashing_penalties = process_slashings(state, &summaries);
    let post_balances = state.balances.into_iter().copied().collect();

    // Do the rest of epoch processing to leave the state valid for further transitions.
    // This way it can be used to calculate statistics for multiple epochs in a row.
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    state.cache.advance_epoch();

    Ok(EpochReport {
        statistics,
        summaries,
        performance,
        epoch_deltas,
        slashing_penalties,
        post_balances,
    })
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    statistics: impl epoch_intermediates::Statistics,
) {
    if !unphased::should_process_justification_and_finalization(state) {
        return;
    }

    unphased::weigh_justification_and_finalization(
        state,
        statistics.current_epoch_active_balance(),
        statistics.previous_epoch_target_attesting_balance(),
        statistics.current_epoch_target_attesting_balance(),
    );
}

fn process_slashings<P: Preset, S: SlashingPenalties>(
    state: &mut BeaconState<P>,
    summaries: &[Phase0ValidatorSummary],
) -> S {
    let current_epoch = get_current_epoch(state);
    let target_withdrawable_epoch = current_epoch + P::EpochsPerSlashingsVector::U64 / 2;

    let mut slashing_penalties = S::default();

    // Most epochs have no slashings maturing in them. Returning early skips summing the active
    // balance and walking the balance tree.
    let any_matured = summaries
        .iter()
        .any(|summary| summary.slashed && summary.withdrawable_epoch == target_withdrawable_epoch);

    if !any_matured {
        return slashing_penalties;
    }

    let total_active_balance = total_active_balance(state);

    let adjusted_total_slashing_balance = state
        .slashings
        .into_iter()
        .sum::<Gwei>()
        .mul(P::PROPORTIONAL_SLASHING_MULTIPLIER)
        .min(total_active_balance);

    let mut summaries = (0..).zip(summaries);

    state.balances.update(|balance| {
        let (validator_index, summary) = summaries
            .next()
            .expect("list of validators and list of balances should have the same length");

        let Phase0ValidatorSummary {
            effective_balance,
            slashed,
            withdrawable_epoch,
            ..
        } = *summary;

        if !slashed {
            return;
        }

        if target_withdrawable_epoch != withdrawable_epoch {
            return;
        }

        // > Factored out from penalty numerator to avoid uint64 overflow
        let increment = P::EFFECTIVE_BALANCE_INCREMENT;
        let penalty_numerator = effective_balance / increment * adjusted_total_slashing_balance;
        let penalty = penalty_numerator / total_active_balance * increment.get();

        decrease_balance(balance, penalty);

        slashing_penalties.add(validator_index, penalty);
    });

    slashing_penalties
}

fn process_participation_record_updates<P: Preset>(state: &mut BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = mem::take(&mut state.current_epoch_attestations);
}

#[cfg(test)]
mod tests {
    use ssz::PersistentList;
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{AttestationData, PendingAttestation, Validator},
        },
        preset::Minimal,
    };

    use super::*;

    // Uses 8 validators so that each slot of an epoch has a single committee of one validator.
    fn state_with_full_participation() -> Result<BeaconState<Minimal>> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;

        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let attestations = (slots_per_epoch..slots_per_epoch * 2).map(|slot| {
            Ok(PendingAttestation {
                aggregation_bits: [true].try_into()?,
                data: AttestationData {
                    slot,
                    ..AttestationData::default()
                },
                inclusion_delay: 1,
                proposer_index: 0,
            })
        });

        let attestations = itertools::process_results(attestations, |attestations| {
            PersistentList::try_from_iter(attestations)
        })??;

        Ok(BeaconState {
            slot: slots_per_epoch * 2,
            validators: PersistentList::try_from_iter(itertools::repeat_n(validator, 8))?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_attestations: attestations,
            ..BeaconState::default()
        })
    }

    #[test]
    fn process_epoch_rewards_attesters_and_justifies_previous_epoch() -> Result<()> {
        let mut state = state_with_full_participation()?;

        process_epoch(&Config::minimal(), &mut state)?;

        for balance in &state.balances {
            assert!(*balance > Minimal::MAX_EFFECTIVE_BALANCE);
        }

        assert_eq!(state.current_justified_checkpoint.epoch, 1);
        assert!(state.justification_bits[1]);

        // > Rotate current/previous epoch attestations
        assert_eq!(state.previous_epoch_attestations.len_usize(), 0);
        assert_eq!(state.current_epoch_attestations.len_usize(), 0);

        Ok(())
    }

    #[test]
    fn process_slashings_penalizes_halfway_to_withdrawable() -> Result<()> {
        let epochs_per_slashings = <Minimal as Preset>::EpochsPerSlashingsVector::U64;
        let current_epoch = 2;

        let mut state = state_with_full_participation()?;

        let slashed_summary = Phase0ValidatorSummary {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            slashed: true,
            withdrawable_epoch: current_epoch + epochs_per_slashings / 2,
            eligible_for_penalties: true,
        };

        let unslashed_summary = Phase0ValidatorSummary {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            slashed: false,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            eligible_for_penalties: true,
        };

        *state.slashings.mod_index_mut(current_epoch) = Minimal::MAX_EFFECTIVE_BALANCE;

        let summaries = core::iter::once(slashed_summary)
            .chain(itertools::repeat_n(unslashed_summary, 7))
            .collect::<Vec<_>>();

        let slashing_penalties: HashMap<_, _> = process_slashings(&mut state, &summaries);

        assert_eq!(slashing_penalties.len(), 1);
        assert!(slashing_penalties[&0] > 0);
        assert!(state.balances.get(0)? < &Minimal::MAX_EFFECTIVE_BALANCE);

        Ok(())
    }
}
