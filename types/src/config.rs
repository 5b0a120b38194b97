use core::{cmp::Ordering, num::NonZeroU64};
use std::{borrow::Cow, collections::BTreeMap};

use enum_iterator::Sequence as _;
use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use thiserror::Error;
use typenum::Unsigned as _;

use crate::{
    nonstandard::{Phase, Toption},
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        primitives::{
            ChainId, Epoch, ExecutionAddress, Gwei, NetworkId, Slot, UnixSeconds, Version, H160,
            H32,
        },
    },
    preset::{Preset, PresetName},
};

/// Configuration variables customizable at runtime.
///
/// See [configurations in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/configs).
///
/// The `*_fork_epoch` fields have type `Epoch` for compatibility with standard configurations.
/// `Toption<Epoch>` would be more appropriate.
#[expect(
    clippy::unsafe_derive_deserialize,
    reason = "A false positive triggered by `nonzero!`. \
             `Config` has no invariants. It is intended to be deserialized from user input. \
              The `unsafe` block in `nonzero!` only operates on the literal passed to it."
)]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    #[serde(with = "serde_utils::string_or_native")]
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    #[serde(with = "serde_utils::string_or_native")]
    pub min_genesis_active_validator_count: NonZeroU64,
    #[serde(with = "serde_utils::string_or_native")]
    pub min_genesis_time: UnixSeconds,

    // Forking
    #[serde(with = "serde_utils::string_or_native")]
    pub altair_fork_epoch: Epoch,
    pub altair_fork_version: Version,
    #[serde(with = "serde_utils::string_or_native")]
    pub bellatrix_fork_epoch: Epoch,
    pub bellatrix_fork_version: Version,

    // Time parameters
    #[serde(with = "serde_utils::string_or_native")]
    pub min_validator_withdrawability_delay: u64,
    #[serde(with = "serde_utils::string_or_native")]
    pub seconds_per_slot: NonZeroU64,
    #[serde(with = "serde_utils::string_or_native")]
    pub shard_committee_period: u64,

    // Validator cycle
    #[serde(with = "serde_utils::string_or_native")]
    pub churn_limit_quotient: NonZeroU64,
    #[serde(with = "serde_utils::string_or_native")]
    pub ejection_balance: Gwei,
    #[serde(with = "serde_utils::string_or_native")]
    pub inactivity_score_bias: NonZeroU64,
    #[serde(with = "serde_utils::string_or_native")]
    pub inactivity_score_recovery_rate: u64,
    #[serde(with = "serde_utils::string_or_native")]
    pub min_per_epoch_churn_limit: u64,

    // Deposit contract
    #[serde(with = "serde_utils::string_or_native")]
    pub deposit_chain_id: ChainId,
    pub deposit_contract_address: ExecutionAddress,
    #[serde(with = "serde_utils::string_or_native")]
    pub deposit_network_id: NetworkId,

    // Later phases and other unknown variables
    //
    // Collect unknown variables in a map so we can log a warning about them.
    // The downside to this is that we can no longer define `Config`s as constants.
    #[expect(
        clippy::zero_sized_map_values,
        reason = "False positive. Serde can only flatten structs and maps."
    )]
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            //
            // Use `default` as the default `config_name` and override it in `Config::mainnet`.
            // This way custom network data will be kept separate from mainnet data if a user
            // forgets to specify a custom `CONFIG_NAME`.
            config_name: Cow::Borrowed("default"),
            preset_base: PresetName::Mainnet,

            // Genesis
            genesis_delay: 604_800,
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_active_validator_count: nonzero!(1_u64 << 14),
            min_genesis_time: 0,

            // Forking
            altair_fork_epoch: FAR_FUTURE_EPOCH,
            altair_fork_version: H32(hex!("01000000")),
            bellatrix_fork_epoch: FAR_FUTURE_EPOCH,
            bellatrix_fork_version: H32(hex!("02000000")),

            // Time parameters
            min_validator_withdrawability_delay: 256,
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            // Validator cycle
            churn_limit_quotient: nonzero!(1_u64 << 16),
            ejection_balance: 16_000_000_000,
            inactivity_score_bias: nonzero!(4_u64),
            inactivity_score_recovery_rate: 16,
            min_per_epoch_churn_limit: 4,

            // Deposit contract
            deposit_chain_id: 0,
            deposit_contract_address: ExecutionAddress::zero(),
            deposit_network_id: 0,

            // Later phases and other unknown variables
            unknown: BTreeMap::new(),
        }
    }
}

// TODO(Grandine Team): Consider adding the linked repositories as submodules and adding
//                      tests that verify built-in configurations match YAML files in them.

impl Config {
    /// [Mainnet configuration](https://github.com/eth-clients/mainnet/blob/978f1794eada6f85bee76e4d2d5959a5fb8e0cc5/metadata/config.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("mainnet"),

            // Genesis
            min_genesis_time: 1_606_824_000,

            // Forking
            altair_fork_epoch: 74240,
            bellatrix_fork_epoch: 144_896,

            // Deposit contract
            deposit_chain_id: 1,
            deposit_contract_address: H160(hex!("00000000219ab540356cBB839Cbe05303d7705Fa")),
            deposit_network_id: 1,

            ..Self::default()
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            // Genesis
            genesis_delay: 300,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_active_validator_count: nonzero!(64_u64),
            min_genesis_time: 1_578_009_600,

            // Forking
            altair_fork_version: H32(hex!("01000001")),
            bellatrix_fork_version: H32(hex!("02000001")),

            // Time parameters
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            // Validator cycle
            churn_limit_quotient: nonzero!(32_u64),
            min_per_epoch_churn_limit: 2,

            // Deposit contract
            deposit_chain_id: 5,
            deposit_contract_address: H160(hex!("1234567890123456789012345678901234567890")),
            deposit_network_id: 5,

            ..Self::default()
        }
    }

    /// Modifies `self` to start in `phase` but never upgrade.
    ///
    /// This is needed to run `consensus-spec-tests`.
    /// They contain data that is arguably invalid: containers in slots that don't match the phase.
    /// This sort of thing is possible with the right configuration, but the tests use the default
    /// values of `*_FORK_EPOCH` in both mainnet and minimal configurations, so they're still wrong.
    #[must_use]
    pub fn start_and_stay_in(mut self, phase: Phase) -> Self {
        self.config_name = Cow::Owned(format!("{phase}-{}", self.config_name));
        self.upgrade_once(phase, GENESIS_EPOCH)
    }

    #[must_use]
    pub fn upgrade_once(mut self, post_phase: Phase, fork_epoch: Epoch) -> Self {
        for (phase, field) in self.fork_epochs_mut() {
            *field = match phase.cmp(&post_phase) {
                Ordering::Less => GENESIS_EPOCH,
                Ordering::Equal => fork_epoch,
                Ordering::Greater => FAR_FUTURE_EPOCH,
            };
        }

        self
    }

    #[must_use]
    pub fn rapid_upgrade(mut self) -> Self {
        self.config_name.to_mut().insert_str(0, "rapid-upgrade-");

        for ((_, field), epoch) in self.fork_epochs_mut().zip(1..) {
            *field = epoch;
        }

        self
    }

    // TODO(Grandine Team): Validate more. See the following for properties that must hold:
    //                      - <https://github.com/ethereum/consensus-specs/issues/407>
    //                      - <https://github.com/ethereum/consensus-specs/pull/2444>
    pub fn validate(&self) -> Result<(), Error> {
        if self.config_name.is_empty() {
            return Err(Error::NameEmpty);
        }

        // See <https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/mainnet.yaml#L10>.
        for character in self.config_name.chars() {
            if !matches!(character, 'a'..='z' | '0'..='9' | '-') {
                return Err(Error::NameContainsIllegalCharacters);
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn genesis_phase(&self) -> Phase {
        self.phase_at_epoch(GENESIS_EPOCH)
    }

    #[inline]
    #[must_use]
    pub const fn version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
            Phase::Altair => self.altair_fork_version,
            Phase::Bellatrix => self.bellatrix_fork_version,
        }
    }

    #[must_use]
    pub fn version_at_epoch(&self, epoch: Epoch) -> Version {
        let phase = self.phase_at_epoch(epoch);
        self.version(phase)
    }

    #[inline]
    #[must_use]
    pub const fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Altair => self.altair_fork_epoch,
            Phase::Bellatrix => self.bellatrix_fork_epoch,
        }
    }

    #[must_use]
    pub fn fork_slot<P: Preset>(&self, phase: Phase) -> Toption<Slot> {
        self.fork_epoch(phase)
            .checked_mul(P::SlotsPerEpoch::U64)
            .map_or(Toption::None, Toption::Some)
    }

    #[must_use]
    pub fn is_phase_enabled<P: Preset>(&self, phase: Phase) -> bool {
        self.fork_slot::<P>(phase).into_option().is_some()
    }

    #[must_use]
    pub fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        self.fork_epochs()
            .take_while(|(_, fork_epoch)| *fork_epoch <= epoch)
            .map(|(phase, _)| phase)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        self.fork_slots::<P>()
            .take_while(|(_, fork_slot)| *fork_slot <= Toption::Some(slot))
            .map(|(phase, _)| phase)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn next_phase_at_slot<P: Preset>(&self, slot: Slot) -> Option<Phase> {
        self.fork_slots::<P>()
            .find(|(_, fork_slot)| Some(slot) < fork_slot.into_option())
            .map(|(phase, _)| phase)
    }

    fn fork_slots<P: Preset>(&self) -> impl Iterator<Item = (Phase, Toption<Slot>)> + '_ {
        enum_iterator::all().map(|phase| (phase, self.fork_slot::<P>(phase)))
    }

    fn fork_epochs(&self) -> impl Iterator<Item = (Phase, Epoch)> {
        // Do not remove the type annotation.
        // It ensures that this method is up to date when new phases are added.
        let fields: [_; Phase::CARDINALITY - 1] =
            [self.altair_fork_epoch, self.bellatrix_fork_epoch];

        enum_iterator::all().skip(1).zip(fields)
    }

    fn fork_epochs_mut(&mut self) -> impl Iterator<Item = (Phase, &mut Epoch)> {
        // Do not remove the type annotation.
        // It ensures that this method is up to date when new phases are added.
        let fields: [_; Phase::CARDINALITY - 1] =
            [&mut self.altair_fork_epoch, &mut self.bellatrix_fork_epoch];

        enum_iterator::all().skip(1).zip(fields)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration name is empty")]
    NameEmpty,
    #[error("configuration name contains illegal characters")]
    NameContainsIllegalCharacters,
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "Refactoring worsens readability, which is more important in tests."
)]
#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Config::mainnet())]
    #[test_case(Config::minimal())]
    fn config_is_valid(config: Config) -> Result<(), Error> {
        config.validate()
    }

    #[test]
    fn phase_at_slot_follows_fork_schedule() {
        let config = Config::minimal().rapid_upgrade();

        let slots_per_epoch = <crate::preset::Minimal as Preset>::SlotsPerEpoch::U64;

        assert_eq!(config.phase_at_slot::<crate::preset::Minimal>(0), Phase::Phase0);
        assert_eq!(
            config.phase_at_slot::<crate::preset::Minimal>(slots_per_epoch),
            Phase::Altair,
        );
        assert_eq!(
            config.phase_at_slot::<crate::preset::Minimal>(2 * slots_per_epoch),
            Phase::Bellatrix,
        );
        assert_eq!(
            config.phase_at_slot::<crate::preset::Minimal>(3 * slots_per_epoch),
            Phase::Bellatrix,
        );
    }
}
