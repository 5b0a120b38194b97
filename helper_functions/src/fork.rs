use core::ops::BitOrAssign as _;
use std::sync::Arc;

use anyhow::Result;
use itertools::Itertools as _;
use ssz::PersistentList;
use std_ext::ArcExt as _;
use types::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    bellatrix::beacon_state::BeaconState as BellatrixBeaconState,
    config::Config,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{Fork, PendingAttestation},
    },
    preset::Preset,
};

use crate::accessors;

pub fn upgrade_to_altair<P: Preset>(
    config: &Config,
    pre: Phase0BeaconState<P>,
) -> Result<AltairBeaconState<P>> {
    let epoch = accessors::get_current_epoch(&pre);

    let Phase0BeaconState {
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        validators,
        balances,
        randao_mixes,
        slashings,
        previous_epoch_attestations,
        current_epoch_attestations: _,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        cache,
    } = pre;

    let fork = Fork {
        previous_version: fork.previous_version,
        current_version: config.altair_fork_version,
        epoch,
    };

    let zero_participation = PersistentList::repeat_zero_with_length_of(&validators);
    let inactivity_scores = PersistentList::repeat_zero_with_length_of(&validators);

    let mut post = AltairBeaconState {
        // > Versioning
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        // > History
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        // > Eth1
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        // > Registry
        validators,
        balances,
        // > Randomness
        randao_mixes,
        // > Slashings
        slashings,
        // > Participation
        previous_epoch_participation: zero_participation.clone(),
        current_epoch_participation: zero_participation,
        // > Finality
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        // > Inactivity
        inactivity_scores,
        // Sync
        current_sync_committee: Arc::default(),
        next_sync_committee: Arc::default(),
        // Cache
        cache,
    };

    // > Fill in previous epoch participation from the pre state's pending attestations
    translate_participation(&mut post, &previous_epoch_attestations)?;

    // > Fill in sync committees
    // > Note: A duplicate committee is assigned for the current and next committee at the fork
    // >       boundary
    let sync_committee = accessors::get_next_sync_committee(&post)?;
    post.current_sync_committee = sync_committee.clone_arc();
    post.next_sync_committee = sync_committee;

    Ok(post)
}

fn translate_participation<'attestations, P: Preset>(
    state: &mut AltairBeaconState<P>,
    pending_attestations: impl IntoIterator<Item = &'attestations PendingAttestation<P>>,
) -> Result<()> {
    let mut root_cache = accessors::RootCache::default();

    for attestation in pending_attestations {
        let PendingAttestation {
            ref aggregation_bits,
            data,
            inclusion_delay,
            ..
        } = *attestation;

        let attesting_indices =
            accessors::get_attesting_indices(state, data, aggregation_bits)?.collect_vec();

        // > Translate attestation inclusion info to flag indices
        let participation_flags = accessors::get_attestation_participation_flags(
            state,
            data,
            inclusion_delay,
            &mut root_cache,
        )?;

        // > Apply flags to all attesting validators
        for attesting_index in attesting_indices {
            // Indexing here has a negligible effect on performance and only has to be done once.
            state
                .previous_epoch_participation
                .get_mut(attesting_index)?
                .bitor_assign(participation_flags);
        }
    }

    Ok(())
}

#[must_use]
pub fn upgrade_to_bellatrix<P: Preset>(
    config: &Config,
    pre: AltairBeaconState<P>,
) -> BellatrixBeaconState<P> {
    let epoch = accessors::get_current_epoch(&pre);

    let AltairBeaconState {
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        validators,
        balances,
        randao_mixes,
        slashings,
        previous_epoch_participation,
        current_epoch_participation,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        inactivity_scores,
        current_sync_committee,
        next_sync_committee,
        cache,
    } = pre;

    let fork = Fork {
        previous_version: fork.current_version,
        current_version: config.bellatrix_fork_version,
        epoch,
    };

    BellatrixBeaconState {
        // > Versioning
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        // > History
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        // > Eth1
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        // > Registry
        validators,
        balances,
        // > Randomness
        randao_mixes,
        // > Slashings
        slashings,
        // > Participation
        previous_epoch_participation,
        current_epoch_participation,
        // > Finality
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        // > Inactivity
        inactivity_scores,
        // > Sync
        current_sync_committee,
        next_sync_committee,
        // Cache
        cache,
    }
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SecretKeyBytes};
    use tap::{Conv as _, TryConv as _};
    use try_from_iterator::TryFromIterator as _;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{AttestationData, PendingAttestation, Validator},
        },
        preset::Minimal,
    };
    use typenum::Unsigned as _;

    use super::*;

    #[test]
    fn upgrade_to_altair_translates_participation_and_fills_sync_committees() -> Result<()> {
        let config = Config::minimal();

        let validators = (1..=8)
            .map(|last_byte| {
                let mut secret_key_bytes = *b"????????????????????????????????";
                secret_key_bytes[31] = last_byte;

                let secret_key = secret_key_bytes
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

        // With 8 validators in the minimal preset each slot has a single committee of one
        // validator, so an attestation for slot 0 covers exactly one of them.
        let attestation = PendingAttestation::<Minimal> {
            aggregation_bits: [true].try_into()?,
            data: AttestationData::default(),
            inclusion_delay: 1,
            proposer_index: 0,
        };

        let pre = Phase0BeaconState::<Minimal> {
            slot: <Minimal as Preset>::SlotsPerEpoch::U64,
            validators: PersistentList::try_from_iter(validators)?,
            balances: [Minimal::MAX_EFFECTIVE_BALANCE; 8].try_into()?,
            previous_epoch_attestations: [attestation].try_into()?,
            ..Phase0BeaconState::default()
        };

        let post = upgrade_to_altair(&config, pre)?;

        assert_eq!(post.fork.previous_version, config.genesis_fork_version);
        assert_eq!(post.fork.current_version, config.altair_fork_version);
        assert_eq!(post.fork.epoch, 1);

        // The attestation was timely on all three counts. It should translate to the source,
        // target, and head flags for the single member of the slot 0 committee.
        let participation = (0..8)
            .map(|validator_index| post.previous_epoch_participation.get(validator_index))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(
            participation
                .iter()
                .filter(|flags| ***flags == 0b0000_0111)
                .count(),
            1,
        );
        assert_eq!(
            participation.iter().filter(|flags| ***flags == 0).count(),
            7,
        );

        for validator_index in 0..8 {
            assert_eq!(*post.current_epoch_participation.get(validator_index)?, 0);
        }

        assert_eq!(post.current_sync_committee, post.next_sync_committee);

        Ok(())
    }

    #[test]
    fn upgrade_to_bellatrix_advances_fork_and_keeps_other_fields() {
        let config = Config::minimal();

        let pre = AltairBeaconState::<Minimal> {
            slot: <Minimal as Preset>::SlotsPerEpoch::U64 * 2,
            fork: Fork {
                previous_version: config.genesis_fork_version,
                current_version: config.altair_fork_version,
                epoch: 1,
            },
            ..AltairBeaconState::default()
        };

        let post = upgrade_to_bellatrix(&config, pre);

        assert_eq!(post.slot, <Minimal as Preset>::SlotsPerEpoch::U64 * 2);
        assert_eq!(post.fork.previous_version, config.altair_fork_version);
        assert_eq!(post.fork.current_version, config.bellatrix_fork_version);
        assert_eq!(post.fork.epoch, 2);
    }
}
