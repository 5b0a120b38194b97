use bls::SignatureBytes;
use derive_more::From;
use duplicate::duplicate_item;
use enum_iterator::Sequence as _;
use serde::{Deserialize, Serialize};
use ssz::{
    Hc, Offset, ReadError, Size, SszHash, SszRead, SszReadDefault, SszSize, SszWrite, WriteError,
    H256,
};
use static_assertions::const_assert_eq;
use typenum::U1;
use variant_count::VariantCount;

use crate::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        containers::{
            BeaconBlock as AltairBeaconBlock, SignedBeaconBlock as AltairSignedBeaconBlock,
        },
    },
    bellatrix::{
        beacon_state::BeaconState as BellatrixBeaconState,
        containers::{
            BeaconBlock as BellatrixBeaconBlock, SignedBeaconBlock as BellatrixSignedBeaconBlock,
        },
    },
    config::Config,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{
            BeaconBlock as Phase0BeaconBlock, SignedBeaconBlock as Phase0SignedBeaconBlock,
            SignedBeaconBlockHeader,
        },
        primitives::{Slot, UnixSeconds},
    },
    preset::{Mainnet, Preset},
    traits::{
        BeaconBlock as _, BeaconState as _, PostAltairBeaconState, SignedBeaconBlock as _,
    },
};

#[derive(Clone, PartialEq, Eq, Debug, From, VariantCount, Serialize)]
#[serde(bound = "", untagged)]
pub enum BeaconState<P: Preset> {
    Phase0(Hc<Phase0BeaconState<P>>),
    Altair(Hc<AltairBeaconState<P>>),
    Bellatrix(Hc<BellatrixBeaconState<P>>),
}

// This assertion will become incorrect if later phases don't modify `BeaconState`.
const_assert_eq!(BeaconState::<Mainnet>::VARIANT_COUNT, Phase::CARDINALITY);

#[duplicate_item(
    implementor;
    [Phase0BeaconState];
    [AltairBeaconState];
    [BellatrixBeaconState];
)]
impl<P: Preset> From<implementor<P>> for BeaconState<P> {
    fn from(state: implementor<P>) -> Self {
        Hc::from(state).into()
    }
}

impl<P: Preset> SszSize for BeaconState<P> {
    // The const parameter should be `Self::VARIANT_COUNT`, but `Self` refers to a generic type.
    // Type parameters cannot be used in `const` contexts until `generic_const_exprs` is stable.
    const SIZE: Size = Size::for_untagged_union::<{ Phase::CARDINALITY }>([
        Phase0BeaconState::<P>::SIZE,
        AltairBeaconState::<P>::SIZE,
        BellatrixBeaconState::<P>::SIZE,
    ]);
}

impl<P: Preset> SszRead<Config> for BeaconState<P> {
    fn from_ssz_unchecked(config: &Config, bytes: &[u8]) -> Result<Self, ReadError> {
        // There are 2 fixed parts before `state.slot`:
        // - The contents of `state.genesis_time`.
        // - The contents of `state.genesis_validators_root`.
        let slot_start = UnixSeconds::SIZE.get() + H256::SIZE.get();
        let slot_end = slot_start + Slot::SIZE.get();
        let slot_bytes = ssz::subslice(bytes, slot_start..slot_end)?;
        let slot = Slot::from_ssz_default(slot_bytes)?;
        let phase = config.phase_at_slot::<P>(slot);

        let state = match phase {
            Phase::Phase0 => Self::Phase0(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Altair => Self::Altair(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Bellatrix => Self::Bellatrix(SszReadDefault::from_ssz_default(bytes)?),
        };

        assert_eq!(slot, state.slot());

        Ok(state)
    }
}

impl<P: Preset> SszWrite for BeaconState<P> {
    fn write_variable(&self, bytes: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Phase0(state) => state.write_variable(bytes),
            Self::Altair(state) => state.write_variable(bytes),
            Self::Bellatrix(state) => state.write_variable(bytes),
        }
    }
}

impl<P: Preset> SszHash for BeaconState<P> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(state) => state.hash_tree_root(),
            Self::Altair(state) => state.hash_tree_root(),
            Self::Bellatrix(state) => state.hash_tree_root(),
        }
    }
}

impl<P: Preset> BeaconState<P> {
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }

    // TODO(Grandine Team): Consider turning `BeaconState::post_*` into trait methods too.
    //                      That would make it possible to downcast trait objects when needed.
    //                      Adding the methods to the `BeaconState` trait would be tricky due to the
    //                      use of `duplicate::duplicate_item`.
    //                      Consider defining a new trait. Implement it for `*BeaconBlock` too.

    pub const fn post_altair(&self) -> Option<&dyn PostAltairBeaconState<P>> {
        match self {
            Self::Phase0(_) => None,
            Self::Altair(state) => Some(state),
            Self::Bellatrix(state) => Some(state),
        }
    }

    pub fn post_altair_mut(&mut self) -> Option<&mut dyn PostAltairBeaconState<P>> {
        match self {
            Self::Phase0(_) => None,
            Self::Altair(state) => Some(state),
            Self::Bellatrix(state) => Some(state),
        }
    }

    pub fn set_cached_root(&self, root: H256) {
        match self {
            Self::Phase0(state) => state.set_cached_root(root),
            Self::Altair(state) => state.set_cached_root(root),
            Self::Bellatrix(state) => state.set_cached_root(root),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, VariantCount, Deserialize, Serialize)]
#[serde(bound = "", untagged)]
pub enum SignedBeaconBlock<P: Preset> {
    Phase0(Phase0SignedBeaconBlock<P>),
    Altair(AltairSignedBeaconBlock<P>),
    Bellatrix(BellatrixSignedBeaconBlock<P>),
}

// This assertion will become incorrect if later phases don't modify `SignedBeaconBlock`.
const_assert_eq!(
    SignedBeaconBlock::<Mainnet>::VARIANT_COUNT,
    Phase::CARDINALITY,
);

impl<P: Preset> SszSize for SignedBeaconBlock<P> {
    // The const parameter should be `Self::VARIANT_COUNT`, but `Self` refers to a generic type.
    // Type parameters cannot be used in `const` contexts until `generic_const_exprs` is stable.
    const SIZE: Size = Size::for_untagged_union::<{ Phase::CARDINALITY }>([
        Phase0SignedBeaconBlock::<P>::SIZE,
        AltairSignedBeaconBlock::<P>::SIZE,
        BellatrixSignedBeaconBlock::<P>::SIZE,
    ]);
}

impl<P: Preset> SszRead<Config> for SignedBeaconBlock<P> {
    fn from_ssz_unchecked(config: &Config, bytes: &[u8]) -> Result<Self, ReadError> {
        // There are 2 fixed parts before `block.message.slot`:
        // - The offset of `block.message`.
        // - The contents of `block.signature`.
        let slot_start = Offset::SIZE.get() + SignatureBytes::SIZE.get();
        let slot_end = slot_start + Slot::SIZE.get();
        let slot_bytes = ssz::subslice(bytes, slot_start..slot_end)?;
        let slot = Slot::from_ssz_default(slot_bytes)?;
        let phase = config.phase_at_slot::<P>(slot);

        let block = match phase {
            Phase::Phase0 => Self::Phase0(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Altair => Self::Altair(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Bellatrix => Self::Bellatrix(SszReadDefault::from_ssz_default(bytes)?),
        };

        assert_eq!(slot, block.message().slot());

        Ok(block)
    }
}

impl<P: Preset> SszWrite for SignedBeaconBlock<P> {
    fn write_variable(&self, bytes: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Phase0(block) => block.write_variable(bytes),
            Self::Altair(block) => block.write_variable(bytes),
            Self::Bellatrix(block) => block.write_variable(bytes),
        }
    }
}

impl<P: Preset> SszHash for SignedBeaconBlock<P> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.hash_tree_root(),
            Self::Altair(block) => block.hash_tree_root(),
            Self::Bellatrix(block) => block.hash_tree_root(),
        }
    }
}

impl<P: Preset> SignedBeaconBlock<P> {
    pub fn split(self) -> (BeaconBlock<P>, SignatureBytes) {
        match self {
            Self::Phase0(block) => {
                let Phase0SignedBeaconBlock { message, signature } = block;
                (message.into(), signature)
            }
            Self::Altair(block) => {
                let AltairSignedBeaconBlock { message, signature } = block;
                (message.into(), signature)
            }
            Self::Bellatrix(block) => {
                let BellatrixSignedBeaconBlock { message, signature } = block;
                (message.into(), signature)
            }
        }
    }

    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }

    pub fn to_header(&self) -> SignedBeaconBlockHeader {
        self.message().to_header().with_signature(self.signature())
    }
}

#[derive(Clone, Debug, From, VariantCount, Serialize)]
#[serde(bound = "", untagged)]
pub enum BeaconBlock<P: Preset> {
    Phase0(Phase0BeaconBlock<P>),
    Altair(AltairBeaconBlock<P>),
    Bellatrix(BellatrixBeaconBlock<P>),
}

// This assertion will become incorrect if later phases don't modify `BeaconBlock`.
const_assert_eq!(BeaconBlock::<Mainnet>::VARIANT_COUNT, Phase::CARDINALITY);

impl<P: Preset> SszSize for BeaconBlock<P> {
    // The const parameter should be `Self::VARIANT_COUNT`, but `Self` refers to a generic type.
    // Type parameters cannot be used in `const` contexts until `generic_const_exprs` is stable.
    const SIZE: Size = Size::for_untagged_union::<{ Phase::CARDINALITY }>([
        Phase0BeaconBlock::<P>::SIZE,
        AltairBeaconBlock::<P>::SIZE,
        BellatrixBeaconBlock::<P>::SIZE,
    ]);
}

impl<P: Preset> SszRead<Config> for BeaconBlock<P> {
    fn from_ssz_unchecked(config: &Config, bytes: &[u8]) -> Result<Self, ReadError> {
        // The offset of `block.slot` is the first fixed part in `block`.
        let slot_start = 0;
        let slot_end = slot_start + Slot::SIZE.get();
        let slot_bytes = ssz::subslice(bytes, slot_start..slot_end)?;
        let slot = Slot::from_ssz_default(slot_bytes)?;
        let phase = config.phase_at_slot::<P>(slot);

        let block = match phase {
            Phase::Phase0 => Self::Phase0(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Altair => Self::Altair(SszReadDefault::from_ssz_default(bytes)?),
            Phase::Bellatrix => Self::Bellatrix(SszReadDefault::from_ssz_default(bytes)?),
        };

        assert_eq!(slot, block.slot());

        Ok(block)
    }
}

impl<P: Preset> SszWrite for BeaconBlock<P> {
    fn write_variable(&self, bytes: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Phase0(block) => block.write_variable(bytes),
            Self::Altair(block) => block.write_variable(bytes),
            Self::Bellatrix(block) => block.write_variable(bytes),
        }
    }
}

impl<P: Preset> SszHash for BeaconBlock<P> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.hash_tree_root(),
            Self::Altair(block) => block.hash_tree_root(),
            Self::Bellatrix(block) => block.hash_tree_root(),
        }
    }
}

impl<P: Preset> BeaconBlock<P> {
    pub fn with_zero_signature(self) -> SignedBeaconBlock<P> {
        self.with_signature(SignatureBytes::zero())
    }

    pub fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        match self {
            Self::Phase0(message) => Phase0SignedBeaconBlock { message, signature }.into(),
            Self::Altair(message) => AltairSignedBeaconBlock { message, signature }.into(),
            Self::Bellatrix(message) => BellatrixSignedBeaconBlock { message, signature }.into(),
        }
    }

    #[must_use]
    pub fn with_state_root(mut self, state_root: H256) -> Self {
        match &mut self {
            Self::Phase0(block) => block.state_root = state_root,
            Self::Altair(block) => block.state_root = state_root,
            Self::Bellatrix(block) => block.state_root = state_root,
        }

        self
    }

    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }
}

impl<P: Preset> From<SignedBeaconBlock<P>> for BeaconBlock<P> {
    fn from(signed_block: SignedBeaconBlock<P>) -> Self {
        let (message, _) = signed_block.split();
        message
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use crate::preset::Minimal;

    use super::*;

    fn config() -> Config {
        Config::minimal().rapid_upgrade()
    }

    #[test_case(0, Phase::Phase0)]
    #[test_case(8, Phase::Altair)]
    #[test_case(16, Phase::Bellatrix)]
    fn decodes_beacon_state_from_phase_matching_slot(slot: Slot, expected_phase: Phase) {
        let state: BeaconState<Minimal> = match expected_phase {
            Phase::Phase0 => Phase0BeaconState {
                slot,
                ..Phase0BeaconState::default()
            }
            .into(),
            Phase::Altair => AltairBeaconState {
                slot,
                ..AltairBeaconState::default()
            }
            .into(),
            Phase::Bellatrix => BellatrixBeaconState {
                slot,
                ..BellatrixBeaconState::default()
            }
            .into(),
        };

        let ssz_bytes = state.to_ssz().expect("SSZ encoding should succeed");

        let decoded = BeaconState::<Minimal>::from_ssz(&config(), ssz_bytes.as_slice())
            .expect("SSZ decoding should succeed");

        assert_eq!(decoded.phase(), expected_phase);
        assert_eq!(decoded, state);
    }

    #[test_case(0, Phase::Phase0)]
    #[test_case(8, Phase::Altair)]
    #[test_case(16, Phase::Bellatrix)]
    fn decodes_signed_beacon_block_from_phase_matching_slot(slot: Slot, expected_phase: Phase) {
        let block: SignedBeaconBlock<Minimal> = match expected_phase {
            Phase::Phase0 => Phase0SignedBeaconBlock {
                message: Phase0BeaconBlock {
                    slot,
                    ..Phase0BeaconBlock::default()
                },
                ..Phase0SignedBeaconBlock::default()
            }
            .into(),
            Phase::Altair => AltairSignedBeaconBlock {
                message: AltairBeaconBlock {
                    slot,
                    ..AltairBeaconBlock::default()
                },
                ..AltairSignedBeaconBlock::default()
            }
            .into(),
            Phase::Bellatrix => BellatrixSignedBeaconBlock {
                message: BellatrixBeaconBlock {
                    slot,
                    ..BellatrixBeaconBlock::default()
                },
                ..BellatrixSignedBeaconBlock::default()
            }
            .into(),
        };

        let ssz_bytes = block.to_ssz().expect("SSZ encoding should succeed");

        let decoded = SignedBeaconBlock::<Minimal>::from_ssz(&config(), ssz_bytes.as_slice())
            .expect("SSZ decoding should succeed");

        assert_eq!(decoded.phase(), expected_phase);
        assert_eq!(decoded, block);
    }

    #[test]
    fn signed_beacon_block_splits_into_message_and_signature() {
        let block = SignedBeaconBlock::<Minimal>::Altair(AltairSignedBeaconBlock::default());

        let (message, signature) = block.split();

        assert_eq!(message.phase(), Phase::Altair);
        assert_eq!(signature, SignatureBytes::zero());
        assert_eq!(message.with_signature(signature).phase(), Phase::Altair);
    }
}
