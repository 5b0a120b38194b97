use anyhow::Result;
use bls::{CachedPublicKey, SecretKey, Signature, SignatureBytes};
use derive_more::From;
use ssz::{Ssz, SszHash};
use types::{
    altair::{
        consts::{
            DOMAIN_CONTRIBUTION_AND_PROOF, DOMAIN_SYNC_COMMITTEE,
            DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF,
        },
        containers::{
            BeaconBlock as AltairBeaconBlock, ContributionAndProof, SyncAggregatorSelectionData,
        },
    },
    bellatrix::containers::BeaconBlock as BellatrixBeaconBlock,
    combined::BeaconBlock as CombinedBeaconBlock,
    config::Config,
    phase0::{
        consts::{
            DOMAIN_AGGREGATE_AND_PROOF, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER,
            DOMAIN_DEPOSIT, DOMAIN_RANDAO, DOMAIN_SELECTION_PROOF, DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{
            AggregateAndProof, AttestationData, BeaconBlock as Phase0BeaconBlock,
            BeaconBlockHeader, DepositMessage, VoluntaryExit,
        },
        primitives::{DomainType, Epoch, Slot, H256},
    },
    preset::Preset,
    traits::{BeaconBlock, BeaconState},
};

use crate::{
    accessors,
    error::SignatureKind,
    misc,
    verifier::{SingleVerifier, Verifier as _},
};

// This wrapper is needed to differentiate between `Epoch` and `Slot`.
// They are aliased to the same type and thus cannot have different trait implementations.
#[derive(From, Ssz)]
#[ssz(
    derive_read = false,
    derive_size = false,
    derive_write = false,
    transparent
)]
pub struct RandaoEpoch(Epoch);

pub trait SignForAllForks: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config) -> H256 {
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, None);
        misc::compute_signing_root(self, domain)
    }

    fn sign(&self, config: &Config, secret_key: &SecretKey) -> Signature {
        secret_key.sign(self.signing_root(config))
    }

    fn verify(
        &self,
        config: &Config,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

pub trait SignForSingleFork<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self) -> Epoch;

    fn signing_root(&self, config: &Config, beacon_state: &(impl BeaconState<P> + ?Sized)) -> H256 {
        let epoch = Some(self.epoch());
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, epoch);
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &impl BeaconState<P>,
        secret_key: &SecretKey,
    ) -> Signature {
        secret_key.sign(self.signing_root(config, beacon_state))
    }

    fn verify(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config, beacon_state),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

pub trait SignForSingleForkAtSlot<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        slot: Slot,
    ) -> H256 {
        let epoch = misc::compute_epoch_at_slot::<P>(slot);
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, Some(epoch));
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &impl BeaconState<P>,
        slot: Slot,
        secret_key: &SecretKey,
    ) -> Signature {
        secret_key.sign(self.signing_root(config, beacon_state, slot))
    }

    fn verify(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        slot: Slot,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config, beacon_state, slot),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#submit-deposit>
impl SignForAllForks for DepositMessage {
    const DOMAIN_TYPE: DomainType = DOMAIN_DEPOSIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Deposit;
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa01/specs/phase0/validator.md#broadcast-aggregate>
impl<P: Preset> SignForSingleFork<P> for AggregateAndProof<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_AGGREGATE_AND_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::AggregateAndProof;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.aggregate.data.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#aggregate-signature>
impl<P: Preset> SignForSingleFork<P> for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self) -> Epoch {
        self.target.epoch
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#signature>
impl<P: Preset> SignForSingleFork<P> for Phase0BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#signature>
impl<P: Preset> SignForSingleFork<P> for AltairBeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#signature>
impl<P: Preset> SignForSingleFork<P> for BellatrixBeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for CombinedBeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot())
    }
}

impl<P: Preset> SignForSingleFork<P> for dyn BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot())
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#signature>
impl<P: Preset> SignForSingleFork<P> for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.1/specs/altair/validator.md#broadcast-sync-committee-contribution>
impl<P: Preset> SignForSingleFork<P> for ContributionAndProof<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_CONTRIBUTION_AND_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::ContributionAndProof;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.contribution.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#randao-reveal>
impl<P: Preset> SignForSingleFork<P> for RandaoEpoch {
    const DOMAIN_TYPE: DomainType = DOMAIN_RANDAO;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Randao;

    fn epoch(&self) -> Epoch {
        self.0
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/validator.md#aggregation-selection>
impl<P: Preset> SignForSingleFork<P> for Slot {
    const DOMAIN_TYPE: DomainType = DOMAIN_SELECTION_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SelectionProof;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(*self)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.1/specs/altair/validator.md#aggregation-selection>
impl<P: Preset> SignForSingleFork<P> for SyncAggregatorSelectionData {
    const DOMAIN_TYPE: DomainType = DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SyncCommitteeSelectionProof;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/99934ee16c7e990c8c39bc66e1aa58845057faa0/specs/phase0/beacon-chain.md#voluntary-exits>
impl<P: Preset> SignForSingleFork<P> for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self) -> Epoch {
        self.epoch
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/ac911558acb9e4f1a1e7274a520c6182b1fe2146/specs/altair/beacon-chain.md#sync-aggregate-processing>
impl<P: Preset> SignForSingleForkAtSlot<P> for H256 {
    const DOMAIN_TYPE: DomainType = DOMAIN_SYNC_COMMITTEE;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SyncCommitteeMessage;
}

#[cfg(test)]
mod tests {
    use bls::SecretKeyBytes;
    use std_ext::CopyExt as _;
    use tap::{Conv as _, TryConv as _};
    use types::{
        phase0::beacon_state::BeaconState as Phase0BeaconState,
        preset::{Mainnet, Minimal},
    };

    use super::*;

    #[test]
    fn randao_epoch_signature_can_be_verified() -> Result<()> {
        let config = Config::minimal();
        let state = Phase0BeaconState::<Minimal>::default();
        let secret_key = secret_key()?;
        let public_key = secret_key.to_public_key().into();

        let randao_epoch = RandaoEpoch::from(5);
        let signature = randao_epoch.sign(&config, &state, &secret_key).into();

        randao_epoch.verify(&config, &state, signature, &public_key)
    }

    #[test]
    fn block_header_signing_root_matches_block_signing_root() {
        let config = Config::mainnet();
        let state = Phase0BeaconState::<Mainnet>::default();

        let block = Phase0BeaconBlock::<Mainnet> {
            slot: 93,
            ..Phase0BeaconBlock::default()
        };

        let header = block.to_header();

        assert_eq!(
            SignForSingleFork::signing_root(&block, &config, &state),
            SignForSingleFork::<Mainnet>::signing_root(&header, &config, &state),
        );
    }

    #[test]
    fn deposit_message_signature_is_independent_of_state_fork() -> Result<()> {
        let config = Config::minimal();
        let secret_key = secret_key()?;
        let public_key = secret_key.to_public_key().into();

        let deposit_message = DepositMessage {
            pubkey: secret_key.to_public_key().into(),
            withdrawal_credentials: H256::repeat_byte(0x11),
            amount: 32_000_000_000,
        };

        let signature = deposit_message.sign(&config, &secret_key).into();

        deposit_message.verify(&config, signature, &public_key)
    }

    fn secret_key() -> Result<SecretKey> {
        b"????????????????????????????????"
            .copy()
            .conv::<SecretKeyBytes>()
            .try_conv::<SecretKey>()
            .map_err(Into::into)
    }
}
