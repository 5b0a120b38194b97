use bls::{AggregatePublicKeyBytes, AggregateSignatureBytes, CachedPublicKey, SignatureBytes};
use serde::{Deserialize, Serialize};
use ssz::{BitVector, ContiguousList, ContiguousVector, Ssz};

use crate::{
    altair::primitives::SubcommitteeIndex,
    phase0::{
        containers::{
            Attestation, AttesterSlashing, Deposit, Eth1Data, ProposerSlashing,
            SignedVoluntaryExit,
        },
        primitives::{Slot, ValidatorIndex, H256},
    },
    preset::{Preset, SyncSubcommitteeSize},
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconBlock<P: Preset> {
    #[serde(with = "serde_utils::string_or_native")]
    pub slot: Slot,
    #[serde(with = "serde_utils::string_or_native")]
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body: BeaconBlockBody<P>,
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconBlockBody<P: Preset> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: H256,
    pub proposer_slashings: ContiguousList<ProposerSlashing, P::MaxProposerSlashings>,
    pub attester_slashings: ContiguousList<AttesterSlashing<P>, P::MaxAttesterSlashings>,
    pub attestations: ContiguousList<Attestation<P>, P::MaxAttestations>,
    pub deposits: ContiguousList<Deposit, P::MaxDeposits>,
    pub voluntary_exits: ContiguousList<SignedVoluntaryExit, P::MaxVoluntaryExits>,
    pub sync_aggregate: SyncAggregate<P>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct ContributionAndProof<P: Preset> {
    #[serde(with = "serde_utils::string_or_native")]
    pub aggregator_index: ValidatorIndex,
    pub contribution: SyncCommitteeContribution<P>,
    pub selection_proof: SignatureBytes,
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SignedBeaconBlock<P: Preset> {
    pub message: BeaconBlock<P>,
    pub signature: SignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SignedContributionAndProof<P: Preset> {
    pub message: ContributionAndProof<P>,
    pub signature: SignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Ssz)]
#[serde(deny_unknown_fields)]
pub struct SyncAggregate<P: Preset> {
    pub sync_committee_bits: BitVector<P::SyncCommitteeSize>,
    pub sync_committee_signature: AggregateSignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize, Ssz)]
#[serde(deny_unknown_fields)]
pub struct SyncAggregatorSelectionData {
    #[serde(with = "serde_utils::string_or_native")]
    pub slot: Slot,
    #[serde(with = "serde_utils::string_or_native")]
    pub subcommittee_index: SubcommitteeIndex,
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Ssz)]
#[serde(deny_unknown_fields)]
pub struct SyncCommittee<P: Preset> {
    // The vector has to be boxed because it's large enough to cause stack overflows when not in
    // release mode.
    pub pubkeys: Box<ContiguousVector<CachedPublicKey, P::SyncCommitteeSize>>,
    pub aggregate_pubkey: AggregatePublicKeyBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug, Deserialize, Serialize, Ssz)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SyncCommitteeContribution<P: Preset> {
    #[serde(with = "serde_utils::string_or_native")]
    pub slot: Slot,
    pub beacon_block_root: H256,
    #[serde(with = "serde_utils::string_or_native")]
    pub subcommittee_index: SubcommitteeIndex,
    pub aggregation_bits: BitVector<SyncSubcommitteeSize<P>>,
    pub signature: AggregateSignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize, Ssz)]
#[serde(deny_unknown_fields)]
pub struct SyncCommitteeMessage {
    #[serde(with = "serde_utils::string_or_native")]
    pub slot: Slot,
    pub beacon_block_root: H256,
    #[serde(with = "serde_utils::string_or_native")]
    pub validator_index: ValidatorIndex,
    pub signature: SignatureBytes,
}

#[cfg(test)]
mod tests {
    use ssz::{Size, SszSize as _, BYTES_PER_LENGTH_OFFSET as OFFSET};
    use test_case::test_case;
    use typenum::Unsigned as _;

    use crate::preset::Mainnet;

    use super::*;

    const UINT: usize = 8;
    const HASH: usize = 32;

    const PUBLIC_KEY: usize = 48;
    const SIGNATURE: usize = 96;

    const ANY_LIST_MIN: usize = 0;

    const AGGREGATION_BITS: usize = SyncSubcommitteeSize::<Mainnet>::USIZE / 8;
    const SYNC_COMMITTEE_BITS: usize = <Mainnet as Preset>::SyncCommitteeSize::USIZE / 8;

    const PUBKEYS: usize = <Mainnet as Preset>::SyncCommitteeSize::USIZE * PUBLIC_KEY;

    const ETH1_DATA: usize = HASH + UINT + HASH;

    const BEACON_BLOCK_MIN: usize = UINT + UINT + HASH + HASH + OFFSET + BEACON_BLOCK_BODY_MIN;
    const BEACON_BLOCK_BODY_MIN: usize = SIGNATURE
        + ETH1_DATA
        + HASH
        + OFFSET
        + OFFSET
        + OFFSET
        + OFFSET
        + OFFSET
        + SYNC_AGGREGATE
        + ANY_LIST_MIN
        + ANY_LIST_MIN
        + ANY_LIST_MIN
        + ANY_LIST_MIN
        + ANY_LIST_MIN;
    const CONTRIBUTION_AND_PROOF: usize = UINT + SYNC_COMMITTEE_CONTRIBUTION + SIGNATURE;
    const SIGNED_BEACON_BLOCK_MIN: usize = OFFSET + SIGNATURE + BEACON_BLOCK_MIN;
    const SIGNED_CONTRIBUTION_AND_PROOF: usize = CONTRIBUTION_AND_PROOF + SIGNATURE;
    const SYNC_AGGREGATE: usize = SYNC_COMMITTEE_BITS + SIGNATURE;
    const SYNC_AGGREGATOR_SELECTION_DATA: usize = UINT + UINT;
    const SYNC_COMMITTEE: usize = PUBKEYS + PUBLIC_KEY;
    const SYNC_COMMITTEE_CONTRIBUTION: usize = UINT + HASH + UINT + AGGREGATION_BITS + SIGNATURE;
    const SYNC_COMMITTEE_MESSAGE: usize = UINT + HASH + UINT + SIGNATURE;

    #[test_case(BitVector::<SyncSubcommitteeSize<Mainnet>>::SIZE,          Size::Fixed { size: AGGREGATION_BITS    })]
    #[test_case(BitVector::<<Mainnet as Preset>::SyncCommitteeSize>::SIZE, Size::Fixed { size: SYNC_COMMITTEE_BITS })]
    #[test_case(Box::<ContiguousVector<CachedPublicKey, <Mainnet as Preset>::SyncCommitteeSize>>::SIZE, Size::Fixed { size: PUBKEYS })]
    #[test_case(BeaconBlock::<Mainnet>::SIZE,                Size::Variable { minimum_size: BEACON_BLOCK_MIN        })]
    #[test_case(BeaconBlockBody::<Mainnet>::SIZE,            Size::Variable { minimum_size: BEACON_BLOCK_BODY_MIN   })]
    #[test_case(ContributionAndProof::<Mainnet>::SIZE,       Size::Fixed    { size: CONTRIBUTION_AND_PROOF          })]
    #[test_case(SignedBeaconBlock::<Mainnet>::SIZE,          Size::Variable { minimum_size: SIGNED_BEACON_BLOCK_MIN })]
    #[test_case(SignedContributionAndProof::<Mainnet>::SIZE, Size::Fixed    { size: SIGNED_CONTRIBUTION_AND_PROOF   })]
    #[test_case(SyncAggregate::<Mainnet>::SIZE,              Size::Fixed    { size: SYNC_AGGREGATE                  })]
    #[test_case(SyncAggregatorSelectionData::SIZE,           Size::Fixed    { size: SYNC_AGGREGATOR_SELECTION_DATA  })]
    #[test_case(SyncCommittee::<Mainnet>::SIZE,              Size::Fixed    { size: SYNC_COMMITTEE                  })]
    #[test_case(SyncCommitteeContribution::<Mainnet>::SIZE,  Size::Fixed    { size: SYNC_COMMITTEE_CONTRIBUTION     })]
    #[test_case(SyncCommitteeMessage::SIZE,                  Size::Fixed    { size: SYNC_COMMITTEE_MESSAGE          })]
    fn ssz_size(actual: Size, expected: Size) {
        assert_eq!(actual, expected);
    }
}
