use core::ops::Mul as _;

use anyhow::Result;
use helper_functions::{
    accessors::{get_current_epoch, total_active_balance},
    misc::vec_of_default,
    mutators::decrease_balance,
};
use typenum::Unsigned as _;
use types::{
    bellatrix::beacon_state::BeaconState as BellatrixBeaconState, config::Config,
    phase0::primitives::Gwei, preset::Preset, traits::BeaconState,
};

use super::epoch_intermediates;
use crate::{
    altair::{self, EpochDeltasForTransition, EpochReport, ValidatorSummary},
    unphased::{self, SlashingPenalties},
};

pub fn process_epoch(config: &Config, state: &mut BellatrixBeaconState<impl Preset>) -> Result<()> {
    let (statistics, mut summaries, participation) = altair::statistics(state);

    altair::process_justification_and_finalization(state, statistics);

    altair::process_inactivity_updates(
        config,
        state,
        summaries.iter().copied(),
        participation.iter().copied(),
    );

    // Epoch deltas must be computed after `process_justification_and_finalization` and
    // `process_inactivity_updates` because they depend on updated values of
    // `BellatrixBeaconState.finalized_checkpoint` and `BellatrixBeaconState.inactivity_scores`.
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
    altair::process_participation_flag_updates(state);
    altair::process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(())
}

pub fn epoch_report<P: Preset>(
    config: &Config,
    state: &mut BellatrixBeaconState<P>,
) -> Result<EpochReport> {
    let (statistics, mut summaries, participation) = altair::statistics(state);

    altair::process_justification_and_finalization(state, statistics);

    altair::process_inactivity_updates(
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
    altair::process_participation_flag_updates(state);
    altair::process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(EpochReport {
        statistics,
        summaries,
        epoch_deltas,
        slashing_penalties,
        post_balances,
    })
}

pub fn process_slashings<P: Preset, S: SlashingPenalties>(
    state: &mut impl BeaconState<P>,
    summaries: &[ValidatorSummary],
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

    let (balances, slashings) = state.balances_mut_with_slashings();

    let adjusted_total_slashing_balance = slashings
        .into_iter()
        .sum::<Gwei>()
        .mul(P::PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX)
        .min(total_active_balance);

    let mut summaries = (0..).zip(summaries);

    balances.update(|balance| {
        let (validator_index, summary) = summaries
            .next()
            .expect("list of validators and list of balances should have the same length");

        let ValidatorSummary {
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

#[cfg(test)]
mod tests {
    use ssz::PersistentList;
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator, primitives::Slot},
        preset::Minimal,
    };

    use super::*;

    const FULL_PARTICIPATION: u8 = 0b0000_0111;

    fn state_with_full_participation(slot: Slot) -> Result<BellatrixBeaconState<Minimal>> {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Ok(BellatrixBeaconState {
            slot,
            validators: PersistentList::try_from_iter(itertools::repeat_n(validator, 8))?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_participation: PersistentList::try_from_iter(
                [FULL_PARTICIPATION; 8],
            )?,
            current_epoch_participation: PersistentList::try_from_iter([FULL_PARTICIPATION; 8])?,
            inactivity_scores: PersistentList::try_from_iter([0; 8])?,
            ..BellatrixBeaconState::default()
        })
    }

    #[test]
    fn process_epoch_rewards_attesters_and_justifies() -> Result<()> {
        let config = Config::minimal();
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = state_with_full_participation(slots_per_epoch * 2)?;

        process_epoch(&config, &mut state)?;

        for balance in &state.balances {
            assert!(*balance > Minimal::MAX_EFFECTIVE_BALANCE);
        }

        assert_eq!(state.current_justified_checkpoint.epoch, 2);
        assert!(state.justification_bits[0]);
        assert!(state.justification_bits[1]);

        // Participation flags rotate into the previous epoch.
        for flags in &state.previous_epoch_participation {
            assert_eq!(*flags, FULL_PARTICIPATION);
        }

        for flags in &state.current_epoch_participation {
            assert_eq!(*flags, 0);
        }

        Ok(())
    }

    #[test]
    fn process_slashings_applies_tripled_multiplier() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = state_with_full_participation(slots_per_epoch * 2)?;

        let current_epoch = get_current_epoch(&state);
        let halfway_epoch =
            current_epoch + <Minimal as Preset>::EpochsPerSlashingsVector::U64 / 2;

        let (_, mut summaries, _) = altair::statistics(&state);

        summaries[0].slashed = true;
        summaries[0].withdrawable_epoch = halfway_epoch;

        *state.slashings.mod_index_mut(current_epoch) = Minimal::MAX_EFFECTIVE_BALANCE;

        process_slashings::<_, ()>(&mut state, &summaries);

        let total_active_balance = Minimal::MAX_EFFECTIVE_BALANCE * 8;

        let adjusted_total_slashing_balance = (Minimal::MAX_EFFECTIVE_BALANCE
            * Minimal::PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX)
            .min(total_active_balance);

        let increment = Minimal::EFFECTIVE_BALANCE_INCREMENT;
        let penalty_numerator =
            Minimal::MAX_EFFECTIVE_BALANCE / increment * adjusted_total_slashing_balance;
        let penalty = penalty_numerator / total_active_balance * increment.get();

        assert_eq!(
            *state.balances.get(0)?,
            Minimal::MAX_EFFECTIVE_BALANCE - penalty,
        );

        Ok(())
    }
}
