use std::collections::HashMap;

use helper_functions::{
    accessors::{get_base_reward_per_increment, total_active_balance},
    predicates::is_in_inactivity_leak,
};
use itertools::izip;
use types::{
    bellatrix::beacon_state::BeaconState,
    config::Config,
    nonstandard::Participation,
    phase0::primitives::Gwei,
    preset::Preset,
};

use crate::altair::{EpochDeltas, LineItems, Statistics, ValidatorSummary};

// Identical to `altair::epoch_deltas` except for the inactivity penalty quotient.
pub fn epoch_deltas<P: Preset, D: EpochDeltas>(
    config: &Config,
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: impl IntoIterator<Item = ValidatorSummary>,
    participation: impl IntoIterator<Item = Participation>,
) -> Vec<D> {
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let base_reward_per_increment = get_base_reward_per_increment(state);
    let active_increments = total_active_balance(state) / P::EFFECTIVE_BALANCE_INCREMENT;

    let mut line_item_cache = HashMap::<Gwei, LineItems>::new();

    izip!(summaries, participation, &state.inactivity_scores)
        .map(|(summary, participation, inactivity_score)| {
            let mut deltas = D::default();

            let ValidatorSummary {
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
                    * P::INACTIVITY_PENALTY_QUOTIENT_BELLATRIX.get();

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
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::Validator,
            primitives::Slot,
        },
        preset::Minimal,
    };

    use crate::altair::{self, EpochDeltasForReport};

    use super::*;

    fn non_participant_state(slot: Slot) -> Result<BeaconState<Minimal>> {
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
            previous_epoch_participation: PersistentList::try_from_iter([0; 8])?,
            current_epoch_participation: PersistentList::try_from_iter([0; 8])?,
            inactivity_scores: PersistentList::try_from_iter([128; 8])?,
            ..BeaconState::default()
        })
    }

    // The inactivity penalty quotient drops from 3 * 2^24 to 2^24 in Bellatrix,
    // tripling inactivity penalties relative to Altair.
    #[test]
    fn epoch_deltas_triple_inactivity_penalties() -> Result<()> {
        let config = Config::minimal();
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let bellatrix_state = non_participant_state(slots_per_epoch * 2)?;

        let altair_state = types::altair::beacon_state::BeaconState::<Minimal> {
            slot: bellatrix_state.slot,
            validators: bellatrix_state.validators.clone(),
            balances: bellatrix_state.balances.clone(),
            previous_epoch_participation: bellatrix_state.previous_epoch_participation.clone(),
            current_epoch_participation: bellatrix_state.current_epoch_participation.clone(),
            inactivity_scores: bellatrix_state.inactivity_scores.clone(),
            ..types::altair::beacon_state::BeaconState::default()
        };

        let (statistics, summaries, participation) = altair::statistics(&bellatrix_state);

        let bellatrix_deltas: Vec<EpochDeltasForReport> = epoch_deltas(
            &config,
            &bellatrix_state,
            statistics,
            summaries.clone(),
            participation.clone(),
        );

        let altair_deltas: Vec<EpochDeltasForReport> = altair::epoch_deltas(
            &config,
            &altair_state,
            statistics,
            summaries,
            participation,
        );

        for (bellatrix, altair) in bellatrix_deltas.iter().zip(&altair_deltas) {
            assert!(altair.inactivity_penalty > 0);
            assert_eq!(bellatrix.inactivity_penalty, altair.inactivity_penalty * 3);
        }

        Ok(())
    }
}
