use std::collections::HashMap;

use helper_functions::{
    accessors::{
        combined_participation, compute_base_reward, get_base_reward_per_increment,
        get_current_epoch, get_previous_epoch, total_active_balance,
    },
    mutators::clamp_balance,
    predicates::{is_active_validator, is_eligible_for_penalties, is_in_inactivity_leak},
};
use itertools::izip;
use serde::Serialize;
use static_assertions::assert_eq_size;
use types::{
    altair::{
        beacon_state::BeaconState,
        consts::{
            TIMELY_HEAD_WEIGHT, TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_WEIGHT, WEIGHT_DENOMINATOR,
        },
    },
    config::Config,
    nonstandard::Participation,
    phase0::{
        containers::Validator,
        primitives::{Epoch, Gwei},
    },
    preset::Preset,
    traits::PostAltairBeaconState,
};

use crate::unphased::{EpochDeltas, ValidatorSummary};

pub trait AltairEpochDeltas: Default {
    fn add_source_reward(&mut self, value: Gwei);
    fn add_source_penalty(&mut self, value: Gwei);
    fn add_target_reward(&mut self, value: Gwei);
    fn add_target_penalty(&mut self, value: Gwei);
    fn add_head_reward(&mut self, value: Gwei);
    fn add_inactivity_penalty(&mut self, value: Gwei);
}

#[derive(Clone, Copy, Debug, Serialize)]
#[cfg_attr(test, derive(Default))]
pub struct AltairValidatorSummary {
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub withdrawable_epoch: Epoch,
    // Storing `activation_epoch` and `exit_epoch` is more general but caused a measurable slowdown
    // in Phase 0 and requires duplicating the implementation of `is_active_validator`.
    pub active_in_previous_epoch: bool,
    pub eligible_for_penalties: bool,
}

assert_eq_size!(AltairValidatorSummary, [u64; 3]);

impl ValidatorSummary for AltairValidatorSummary {
    // This does not update derived fields because `process_slashings` does not use them.
    fn update_from(&mut self, validator: &Validator) {
        self.effective_balance = validator.effective_balance;
        self.slashed = validator.slashed;
        self.withdrawable_epoch = validator.withdrawable_epoch;
    }
}

// This has no field for the active balance in the current epoch because during most epoch
// transitions it should already be calculated and cached in `Cache.total_active_balance`.
#[expect(clippy::struct_field_names)]
#[derive(Clone, Copy, Default, Debug, Serialize)]
pub struct Statistics {
    pub previous_epoch_source_participating_balance: Gwei,
    pub previous_epoch_target_participating_balance: Gwei,
    pub previous_epoch_head_participating_balance: Gwei,
    pub current_epoch_target_participating_balance: Gwei,
}

impl Statistics {
    fn clamp_balances<P: Preset>(&mut self) {
        clamp_balance::<P>(&mut self.previous_epoch_source_participating_balance);
        clamp_balance::<P>(&mut self.previous_epoch_target_participating_balance);
        clamp_balance::<P>(&mut self.previous_epoch_head_participating_balance);
        clamp_balance::<P>(&mut self.current_epoch_target_participating_balance);
    }
}

#[derive(Clone, Copy, Default)]
pub struct EpochDeltasForTransition {
    reward: Gwei,
    penalty: Gwei,
}

impl EpochDeltas for EpochDeltasForTransition {
    fn combined_reward(self) -> Gwei {
        self.reward
    }

    fn combined_penalty(self) -> Gwei {
        self.penalty
    }
}

impl AltairEpochDeltas for EpochDeltasForTransition {
    fn add_source_reward(&mut self, value: Gwei) {
        self.reward += value;
    }

    fn add_source_penalty(&mut self, value: Gwei) {
        self.penalty += value;
    }

    fn add_target_reward(&mut self, value: Gwei) {
        self.reward += value;
    }

    fn add_target_penalty(&mut self, value: Gwei) {
        self.penalty += value;
    }

    fn add_head_reward(&mut self, value: Gwei) {
        self.reward += value;
    }

    fn add_inactivity_penalty(&mut self, value: Gwei) {
        self.penalty += value;
    }
}

#[derive(Clone, Copy, Default, Debug, Serialize)]
pub struct EpochDeltasForReport {
    pub source_reward: Gwei,
    pub source_penalty: Gwei,
    pub target_reward: Gwei,
    pub target_penalty: Gwei,
    pub head_reward: Gwei,
    pub inactivity_penalty: Gwei,
}

impl EpochDeltas for EpochDeltasForReport {
    fn combined_reward(self) -> Gwei {
        self.source_reward + self.target_reward + self.head_reward
    }

    fn combined_penalty(self) -> Gwei {
        self.source_penalty + self.target_penalty + self.inactivity_penalty
    }
}

impl AltairEpochDeltas for EpochDeltasForReport {
    fn add_source_reward(&mut self, value: Gwei) {
        self.source_reward += value;
    }

    fn add_source_penalty(&mut self, value: Gwei) {
        self.source_penalty += value;
    }

    fn add_target_reward(&mut self, value: Gwei) {
        self.target_reward += value;
    }

    fn add_target_penalty(&mut self, value: Gwei) {
        self.target_penalty += value;
    }

    fn add_head_reward(&mut self, value: Gwei) {
        self.head_reward += value;
    }

    fn add_inactivity_penalty(&mut self, value: Gwei) {
        self.inactivity_penalty += value;
    }
}

pub fn statistics<P: Preset, S: PostAltairBeaconState<P>>(
    state: &S,
) -> (Statistics, Vec<AltairValidatorSummary>, Vec<Participation>) {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);
    let participation = combined_participation(state);

    let mut statistics = Statistics::default();

    let summaries = state
        .validators()
        .into_iter()
        .zip(participation.iter().copied())
        .map(|(validator, participation)| {
            let Validator {
                effective_balance,
                slashed,
                withdrawable_epoch,
                ..
            } = *validator;

            let active_in_previous_epoch = is_active_validator(validator, previous_epoch);
            let active_in_current_epoch = is_active_validator(validator, current_epoch);
            let eligible_for_penalties = is_eligible_for_penalties(validator, previous_epoch);

            if !slashed {
                // Unlike `get_unslashed_attesting_indices` in Phase 0,
                // `get_unslashed_participating_indices` in Altair checks if validators were active.
                // There doesn't seem to be a way for a validator that's not active to attest in
                // normal operation, but some test cases in `consensus-spec-tests` cover the check.

                if active_in_previous_epoch {
                    if participation.previous_epoch_matching_source() {
                        statistics.previous_epoch_source_participating_balance += effective_balance;
                    }

                    if participation.previous_epoch_matching_target() {
                        statistics.previous_epoch_target_participating_balance += effective_balance;
                    }

                    if participation.previous_epoch_matching_head() {
                        statistics.previous_epoch_head_participating_balance += effective_balance;
                    }
                }

                if active_in_current_epoch && participation.current_epoch_matching_target() {
                    statistics.current_epoch_target_participating_balance += effective_balance;
                }
            }

            AltairValidatorSummary {
                effective_balance,
                slashed,
                withdrawable_epoch,
                active_in_previous_epoch,
                eligible_for_penalties,
            }
        })
        .collect();

    statistics.clamp_balances::<P>();

    (statistics, summaries, participation)
}

// Rewards and penalties for a participation component are functions of the effective balance
// alone. Effective balances take few distinct values thanks to hysteresis, so the line items are
// computed once per distinct value and reused for all validators that share it.
#[derive(Clone, Copy)]
pub(crate) struct LineItems {
    pub(crate) source_reward: Gwei,
    pub(crate) target_reward: Gwei,
    pub(crate) head_reward: Gwei,
    pub(crate) source_penalty: Gwei,
    pub(crate) target_penalty: Gwei,
}

impl LineItems {
    pub(crate) fn new<P: Preset>(
        effective_balance: Gwei,
        base_reward_per_increment: Gwei,
        statistics: Statistics,
        active_increments: Gwei,
        in_inactivity_leak: bool,
    ) -> Self {
        let increment = P::EFFECTIVE_BALANCE_INCREMENT;
        let base_reward = compute_base_reward::<P>(effective_balance, base_reward_per_increment);

        let participation_component_reward = |weight, participating_balance: Gwei| {
            if in_inactivity_leak {
                return 0;
            }

            let unslashed_participating_increments = participating_balance / increment;
            let reward_numerator = base_reward * weight * unslashed_participating_increments;
            let reward_denominator = active_increments * WEIGHT_DENOMINATOR.get();
            reward_numerator / reward_denominator
        };

        let participation_component_penalty = |weight| base_reward * weight / WEIGHT_DENOMINATOR;

        Self {
            source_reward: participation_component_reward(
                TIMELY_SOURCE_WEIGHT,
                statistics.previous_epoch_source_participating_balance,
            ),
            target_reward: participation_component_reward(
                TIMELY_TARGET_WEIGHT,
                statistics.previous_epoch_target_participating_balance,
            ),
            head_reward: participation_component_reward(
                TIMELY_HEAD_WEIGHT,
                statistics.previous_epoch_head_participating_balance,
            ),
            source_penalty: participation_component_penalty(TIMELY_SOURCE_WEIGHT),
            target_penalty: participation_component_penalty(TIMELY_TARGET_WEIGHT),
        }
    }
}

pub fn epoch_deltas<P: Preset, D: AltairEpochDeltas>(
    config: &Config,
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: impl IntoIterator<Item = AltairValidatorSummary>,
    participation: impl IntoIterator<Item = Participation>,
) -> Vec<D> {
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let base_reward_per_increment = get_base_reward_per_increment(state);
    let active_increments = total_active_balance(state) / P::EFFECTIVE_BALANCE_INCREMENT;

    let mut line_item_cache = HashMap::<Gwei, LineItems>::new();

    izip!(summaries, participation, &state.inactivity_scores)
        .map(|(summary, participation, inactivity_score)| {
            let mut deltas = D::default();

            let AltairValidatorSummary {
                effective_balance,
                slashed,
                eligible_for_penalties,
                ..
            } = summary;

            if !eligible_for_penalties {
                return deltas;
            }

            let line_items = *line_item_cache.entry(effective_balance).or_insert_with(|| {
                LineItems::new::<P>(
                    effective_balance,
                    base_reward_per_increment,
                    statistics,
                    active_increments,
                    in_inactivity_leak,
                )
            });

            if !slashed && participation.previous_epoch_matching_source() {
                deltas.add_source_reward(line_items.source_reward);
            } else {
                deltas.add_source_penalty(line_items.source_penalty);
            }

            if !slashed && participation.previous_epoch_matching_target() {
                deltas.add_target_reward(line_items.target_reward);
            } else {
                deltas.add_target_penalty(line_items.target_penalty);

                let penalty_numerator = effective_balance * inactivity_score;
                let penalty_denominator = config.inactivity_score_bias.get()
                    * P::INACTIVITY_PENALTY_QUOTIENT_ALTAIR.get();

                deltas.add_inactivity_penalty(penalty_numerator / penalty_denominator);
            }

            if !slashed && participation.previous_epoch_matching_head() {
                deltas.add_head_reward(line_items.head_reward);
            }

            deltas
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use ssz::PersistentList;
    use try_from_iterator::TryFromIterator as _;
    use typenum::Unsigned as _;
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, primitives::Slot},
        preset::Minimal,
    };

    use super::*;

    const FULL_PARTICIPATION: u8 = 0b0000_0111;

    fn state_at_slot(slot: Slot, previous_participation: u8) -> Result<BeaconState<Minimal>> {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Ok(BeaconState {
            slot,
            validators: PersistentList::try_from_iter(itertools::repeat_n(validator, 8))?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_participation: PersistentList::try_from_iter(
                [previous_participation; 8],
            )?,
            current_epoch_participation: PersistentList::try_from_iter([0; 8])?,
            inactivity_scores: PersistentList::try_from_iter([0; 8])?,
            ..BeaconState::default()
        })
    }

    #[test]
    fn statistics_count_participating_balances() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let state = state_at_slot(slots_per_epoch * 2, FULL_PARTICIPATION)?;

        let (statistics, summaries, _) = statistics(&state);

        let full_balance = 8 * Minimal::MAX_EFFECTIVE_BALANCE;

        assert_eq!(
            statistics.previous_epoch_source_participating_balance,
            full_balance,
        );
        assert_eq!(
            statistics.previous_epoch_target_participating_balance,
            full_balance,
        );
        assert_eq!(
            statistics.previous_epoch_head_participating_balance,
            full_balance,
        );

        // No participation in the current epoch.
        // The balance is clamped to one increment to prevent division by zero.
        assert_eq!(
            statistics.current_epoch_target_participating_balance,
            Minimal::EFFECTIVE_BALANCE_INCREMENT.get(),
        );

        assert!(summaries
            .iter()
            .all(|summary| summary.eligible_for_penalties));

        Ok(())
    }

    #[test]
    fn epoch_deltas_reward_full_participation_equally() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let state = state_at_slot(slots_per_epoch * 2, FULL_PARTICIPATION)?;

        let (statistics, summaries, participation) = statistics(&state);

        let deltas: Vec<EpochDeltasForReport> = epoch_deltas(
            &Config::minimal(),
            &state,
            statistics,
            summaries,
            participation,
        );

        for deltas in &deltas {
            assert!(deltas.source_reward > 0);
            assert!(deltas.target_reward > 0);
            assert!(deltas.head_reward > 0);
            assert_eq!(deltas.combined_penalty(), 0);
        }

        // All validators have the same effective balance and participation,
        // so the line items must match exactly.
        itertools::assert_equal(
            deltas.iter().map(|deltas| deltas.combined_reward()),
            itertools::repeat_n(deltas[0].combined_reward(), 8),
        );

        Ok(())
    }

    #[test]
    fn epoch_deltas_penalize_non_participants_during_inactivity_leak() -> Result<()> {
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let mut state = state_at_slot(slots_per_epoch * 8, 0)?;

        state.inactivity_scores = PersistentList::try_from_iter([128; 8])?;

        assert!(is_in_inactivity_leak(&state));

        let (statistics, summaries, participation) = statistics(&state);

        let deltas: Vec<EpochDeltasForReport> = epoch_deltas(
            &Config::minimal(),
            &state,
            statistics,
            summaries,
            participation,
        );

        for deltas in &deltas {
            assert_eq!(deltas.combined_reward(), 0);
            assert!(deltas.source_penalty > 0);
            assert!(deltas.target_penalty > 0);
            assert!(deltas.inactivity_penalty > 0);
        }

        Ok(())
    }
}
