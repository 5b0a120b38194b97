use core::ops::Mul as _;
use std::collections::HashMap;

use anyhow::Result;
use arithmetic::U64Ext;
use helper_functions::{
    accessors::{get_current_epoch, get_next_sync_committee, total_active_balance},
    misc::vec_of_default,
    mutators::decrease_balance,
    predicates::is_in_inactivity_leak,
};
use ssz::PersistentList;
use typenum::Unsigned as _;
use types::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    config::Config,
    nonstandard::Participation,
    phase0::{
        consts::GENESIS_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::{BeaconState, PostAltairBeaconState},
};

use super::epoch_intermediates::{
    self, AltairValidatorSummary, EpochDeltasForReport, EpochDeltasForTransition, Statistics,
};
use crate::unphased::{self, SlashingPenalties};

pub struct EpochReport {
    pub statistics: Statistics,
    pub summaries: Vec<AltairValidatorSummary>,
    pub epoch_deltas: Vec<EpochDeltasForReport>,
    pub slashing_penalties: HashMap<ValidatorIndex, Gwei>,
    pub post_balances: Vec<Gwei>,
}

pub fn process_epoch(config: &Config, state: &mut AltairBeaconState<impl Preset>) -> Result<()> {
    let (statistics, mut summaries, participation) = epoch_intermediates::statistics(state);

    process_justification_and_finalization(state, statistics);

    process_inactivity_updates(
        config,
        state,
        summaries.iter().copied(),
        participation.iter().copied(),
    );

    // Epoch deltas must be computed after `process_justification_and_finalization` and
    // `process_inactivity_updates` because they depend on updated values of
    // `AltairBeaconState.finalized_checkpoint` and `AltairBeaconState.inactivity_scores`.
    //
    // Using `vec_of_default` in the genesis epoch does not improve performance.
    let epoch_deltas: Vec<EpochDeltasForTransition> = epoch_intermediates::epoch_deltas(
        config,
        state,
        statistics,
        summaries.iter().copied(),
        participation,
    );

    unphased::process_rewards_and_penalties(state, epoch_deltas);
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;
    process_slashings::<_, ()>(state, &summaries);
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_flag_updates(state);
    process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(())
}

pub fn epoch_report<P: Preset>(
    config: &Config,
    state: &mut AltairBeaconState<P>,
) -> Result<EpochReport> {
    let (statistics, mut summaries, participation) = epoch_intermediates::statistics(state);

    process_justification_and_finalization(state, statistics);

    process_inactivity_updates(
        config,
        state,
        summaries.iter().copied(),
        participation.iter().copied(),
    );

    // Rewards and penalties are not applied in the genesis epoch. Return zero deltas for states in
    // the genesis epoch to avoid making misleading reports. The check cannot be done inside
    // `epoch_deltas` because some `rewards` test cases compute deltas in the genesis epoch.
    let epoch_deltas = if unphased::should_process_rewards_and_penalties(state) {
        epoch_intermediates::epoch_deltas(
            config,
            state,
            statistics,
            summaries.iter().copied(),
            participation,
        )
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
    process_participation_flag_updates(state);
    process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(EpochReport {
        statistics,
        summaries,
        epoch_deltas,
        slashing_penalties,
        post_balances,
    })
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut impl BeaconState<P>,
    statistics: Statistics,
) {
    if !unphased::should_process_justification_and_finalization(state) {
        return;
    }

    unphased::weigh_justification_and_finalization(
        state,
        total_active_balance(state),
        statistics.previous_epoch_target_participating_balance,
        statistics.current_epoch_target_participating_balance,
    );
}

pub fn process_inactivity_updates<P: Preset>(
    config: &Config,
    state: &mut impl PostAltairBeaconState<P>,
    summaries: impl IntoIterator<Item = AltairValidatorSummary>,
    participation: impl IntoIterator<Item = Participation>,
) {
    if !should_process_inactivity_updates(state) {
        return;
    }

    let in_inactivity_leak = is_in_inactivity_leak(state);

    let mut summaries = summaries.into_iter();
    let mut participation = participation.into_iter();

    state.inactivity_scores_mut().update(|inactivity_score| {
        let summary = summaries
            .next()
            .expect("summaries should have as many elements as there are validators");

        let participation = participation
            .next()
            .expect("participations should have as many elements as there are validators");

        if !summary.eligible_for_penalties {
            return;
        }

        let unslashed_and_participating = !summary.slashed
            && summary.active_in_previous_epoch
            && participation.previous_epoch_matching_target();

        // > Increase the inactivity score of inactive validators
        if unslashed_and_participating {
            *inactivity_score = inactivity_score.saturating_sub(1);
        } else {
            *inactivity_score += config.inactivity_score_bias.get();
        }

        // > Decrease the inactivity score of all eligible validators during a leak-free epoch
        if !in_inactivity_leak {
            *inactivity_score =
                inactivity_score.saturating_sub(config.inactivity_score_recovery_rate);
        }
    });
}

fn process_slashings<P: Preset, S: SlashingPenalties>(
    state: &mut AltairBeaconState<P>,
    summaries: &[AltairValidatorSummary],
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
        .mul(P::PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR)
        .min(total_active_balance);

    let mut summaries = (0..).zip(summaries);

    state.balances.update(|balance| {
        let (validator_index, summary) = summaries
            .next()
            .expect("list of validators and list of balances should have the same length");

        let AltairValidatorSummary {
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

pub fn process_participation_flag_updates<P: Preset>(state: &mut impl PostAltairBeaconState<P>) {
    // > Rotate current/previous epoch participation
    let zero_participation = PersistentList::repeat_zero_with_length_of(state.validators());

    *state.previous_epoch_participation_mut() =
        core::mem::replace(state.current_epoch_participation_mut(), zero_participation);
}

pub fn process_sync_committee_updates<P: Preset>(
    state: &mut impl PostAltairBeaconState<P>,
) -> Result<()> {
    let next_epoch = get_current_epoch(state) + 1;

    if U64Ext::is_multiple_of(next_epoch, P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD) {
        let committee = get_next_sync_committee(state)?;
        *state.current_sync_committee_mut() =
            core::mem::replace(state.next_sync_committee_mut(), committee);
    }

    Ok(())
}

fn should_process_inactivity_updates<P: Preset>(state: &impl BeaconState<P>) -> bool {
    // > Skip the genesis epoch as score updates are based on the previous epoch participation
    GENESIS_EPOCH < get_current_epoch(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bls::{SecretKey, SecretKeyBytes};
    use std_ext::ArcExt as _;
    use tap::{Conv as _, TryConv as _};
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator, primitives::Slot},
        preset::Minimal,
    };

    use super::*;

    const FULL_PARTICIPATION: u8 = 0b0000_0111;

    fn state_at_slot(slot: Slot, previous_participation: u8) -> Result<AltairBeaconState<Minimal>> {
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

        Ok(AltairBeaconState {
            slot,
            validators: PersistentList::try_from_iter(validators)?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_participation: PersistentList::try_from_iter(
                [previous_participation; 8],
            )?,
            current_epoch_participation: PersistentList::try_from_iter([FULL_PARTICIPATION; 8])?,
            inactivity_scores: PersistentList::try_from_iter([0; 8])?,
            ..AltairBeaconState::default()
        })
    }

    #[test]
    fn process_epoch_rewards_attesters_and_rotates_participation() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = state_at_slot(slots_per_epoch * 2, FULL_PARTICIPATION)?;

        process_epoch(&Config::minimal(), &mut state)?;

        for balance in &state.balances {
            assert!(*balance > Minimal::MAX_EFFECTIVE_BALANCE);
        }

        // Both the previous and the current epoch have supermajority target participation.
        assert_eq!(state.current_justified_checkpoint.epoch, 2);
        assert!(state.justification_bits[0]);
        assert!(state.justification_bits[1]);

        // > Rotate current/previous epoch participation
        itertools::assert_equal(
            state.previous_epoch_participation.into_iter().copied(),
            itertools::repeat_n(FULL_PARTICIPATION, 8),
        );
        itertools::assert_equal(
            state.current_epoch_participation.into_iter().copied(),
            itertools::repeat_n(0, 8),
        );

        Ok(())
    }

    #[test]
    fn process_inactivity_updates_penalizes_only_non_participants() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let config = Config::minimal();

        let mut state = state_at_slot(slots_per_epoch * 2, FULL_PARTICIPATION)?;
        state.inactivity_scores = PersistentList::try_from_iter([5; 8])?;

        let (_, summaries, participation) = epoch_intermediates::statistics(&state);

        process_inactivity_updates(&config, &mut state, summaries, participation);

        // Participating validators have their scores decreased,
        // first by 1 and then by the recovery rate outside a leak.
        let expected = 5_u64
            .saturating_sub(1)
            .saturating_sub(config.inactivity_score_recovery_rate);

        itertools::assert_equal(
            state.inactivity_scores.into_iter().copied(),
            itertools::repeat_n(expected, 8),
        );

        let mut state = state_at_slot(slots_per_epoch * 2, 0)?;

        let (_, summaries, participation) = epoch_intermediates::statistics(&state);

        process_inactivity_updates(&config, &mut state, summaries, participation);

        // Non-participants are penalized by the bias before the recovery rate is applied.
        let expected = config
            .inactivity_score_bias
            .get()
            .saturating_sub(config.inactivity_score_recovery_rate);

        itertools::assert_equal(
            state.inactivity_scores.into_iter().copied(),
            itertools::repeat_n(expected, 8),
        );

        Ok(())
    }

    #[test]
    fn process_sync_committee_updates_rotates_only_at_period_boundaries() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;

        // Not at a period boundary. The committees must remain untouched.
        let mut state = state_at_slot(slots_per_epoch * 2, FULL_PARTICIPATION)?;
        let old_current = state.current_sync_committee.clone_arc();
        let old_next = state.next_sync_committee.clone_arc();

        process_sync_committee_updates(&mut state)?;

        assert!(Arc::ptr_eq(&state.current_sync_committee, &old_current));
        assert!(Arc::ptr_eq(&state.next_sync_committee, &old_next));

        // The last epoch of a sync committee period.
        let period_epochs = <Minimal as Preset>::EPOCHS_PER_SYNC_COMMITTEE_PERIOD;
        let mut state = state_at_slot(slots_per_epoch * (period_epochs - 1), FULL_PARTICIPATION)?;
        let old_next = state.next_sync_committee.clone_arc();

        process_sync_committee_updates(&mut state)?;

        assert!(Arc::ptr_eq(&state.current_sync_committee, &old_next));
        assert!(!Arc::ptr_eq(&state.next_sync_committee, &old_next));

        Ok(())
    }

    #[test]
    fn process_slashings_penalizes_halfway_to_withdrawable() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let epochs_per_slashings = <Minimal as Preset>::EpochsPerSlashingsVector::U64;
        let current_epoch = 2;

        let mut state = state_at_slot(slots_per_epoch * current_epoch, FULL_PARTICIPATION)?;

        *state.slashings.mod_index_mut(current_epoch) = Minimal::MAX_EFFECTIVE_BALANCE;

        let (_, mut summaries, _) = epoch_intermediates::statistics(&state);

        summaries[0].slashed = true;
        summaries[0].withdrawable_epoch = current_epoch + epochs_per_slashings / 2;

        let slashing_penalties: HashMap<_, _> = process_slashings(&mut state, &summaries);

        assert_eq!(slashing_penalties.len(), 1);
        assert!(slashing_penalties[&0] > 0);
        assert!(state.balances.get(0)? < &Minimal::MAX_EFFECTIVE_BALANCE);

        Ok(())
    }

    #[test]
    fn process_slashings_skips_epochs_with_no_matured_slashings() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let epochs_per_slashings = <Minimal as Preset>::EpochsPerSlashingsVector::U64;
        let current_epoch = 2;

        let mut state = state_at_slot(slots_per_epoch * current_epoch, FULL_PARTICIPATION)?;

        *state.slashings.mod_index_mut(current_epoch) = Minimal::MAX_EFFECTIVE_BALANCE;

        let (_, mut summaries, _) = epoch_intermediates::statistics(&state);

        // Slashed but not halfway to withdrawable, so no penalty matures this epoch.
        summaries[0].slashed = true;
        summaries[0].withdrawable_epoch = current_epoch + epochs_per_slashings / 2 + 1;

        let old_balances = state.balances.clone();

        let slashing_penalties: HashMap<_, _> = process_slashings(&mut state, &summaries);

        assert_eq!(slashing_penalties.len(), 0);
        assert_eq!(state.balances, old_balances);

        Ok(())
    }
}
