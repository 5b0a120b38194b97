use bit_field::BitField as _;
use enum_iterator::Sequence;
use enum_map::Enum;
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use smallvec::SmallVec;
use static_assertions::assert_eq_size;
use strum::{AsRefStr, Display, EnumString};

use crate::{
    altair::{
        consts::{TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
        primitives::ParticipationFlags,
    },
    phase0::primitives::{Gwei, H256},
};

pub use smallvec::smallvec;

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Sequence,
    AsRefStr,
    Display,
    EnumString,
    DeserializeFromStr,
    SerializeDisplay,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Phase {
    Phase0,
    Altair,
    Bellatrix,
}

/// Like [`Option`], but with [`None`] greater than any [`Some`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(test, derive(Debug))]
pub enum Toption<T> {
    // The order of variants affects the derived `PartialOrd` and `Ord` impls.
    Some(T),
    None,
}

impl<T> Toption<T> {
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Some(value) => Some(value),
            Self::None => None,
        }
    }

    pub fn expect(self, message: &str) -> T {
        self.into_option().expect(message)
    }
}

#[derive(Clone, Copy, Debug, Enum)]
pub enum RelativeEpoch {
    Previous,
    Current,
    Next,
}

impl From<AttestationEpoch> for RelativeEpoch {
    fn from(attestation_epoch: AttestationEpoch) -> Self {
        match attestation_epoch {
            AttestationEpoch::Previous => Self::Previous,
            AttestationEpoch::Current => Self::Current,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AttestationEpoch {
    Previous,
    Current,
}

#[derive(Clone, Copy)]
pub enum SyncCommitteeEpoch {
    Current,
    Next,
}

#[derive(Debug, Enum)]
pub enum SlashingKind {
    Proposer,
    Attester,
}

pub type UsizeVec = SmallVec<[usize; 2]>;

assert_eq_size!(UsizeVec, Vec<usize>);

type U64Vec = SmallVec<[u64; 2 * size_of::<usize>() / size_of::<u64>()]>;

assert_eq_size!(U64Vec, Vec<u64>);

pub type GweiVec = U64Vec;
pub type SlotVec = U64Vec;

pub trait Outcome: Copy {
    fn compare(actual: H256, expected: H256) -> Self;
}

impl Outcome for bool {
    #[inline]
    fn compare(actual: H256, expected: H256) -> Self {
        actual == expected
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum AttestationOutcome {
    Match { root: H256 },
    Mismatch { expected: H256, actual: H256 },
}

impl Outcome for AttestationOutcome {
    #[inline]
    fn compare(actual: H256, expected: H256) -> Self {
        if actual == expected {
            Self::Match { root: expected }
        } else {
            Self::Mismatch { expected, actual }
        }
    }
}

impl AttestationOutcome {
    #[inline]
    #[must_use]
    pub const fn is_match(self) -> bool {
        matches!(self, Self::Match { .. })
    }

    #[inline]
    #[must_use]
    pub const fn should_replace(earlier: Option<Self>, later: Option<Self>) -> bool {
        matches!(
            (earlier, later),
            (Some(Self::Mismatch { .. }), Some(Self::Match { .. })) | (None, Some(_)),
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct BlockRewards {
    pub total: Gwei,
    pub attestations: Gwei,
    pub sync_aggregate: Gwei,
    pub proposer_slashings: Gwei,
    pub attester_slashings: Gwei,
}

#[derive(Clone, Copy)]
pub struct Participation {
    pub previous: ParticipationFlags,
    pub current: ParticipationFlags,
}

impl Participation {
    #[inline]
    #[must_use]
    pub fn previous_epoch_matching_source(self) -> bool {
        self.previous.get_bit(TIMELY_SOURCE_FLAG_INDEX)
    }

    #[inline]
    #[must_use]
    pub fn previous_epoch_matching_target(self) -> bool {
        self.previous.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }

    #[inline]
    #[must_use]
    pub fn previous_epoch_matching_head(self) -> bool {
        self.previous.get_bit(TIMELY_HEAD_FLAG_INDEX)
    }

    #[inline]
    #[must_use]
    pub fn current_epoch_matching_target(self) -> bool {
        self.current.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use strum::ParseError;
    use test_case::test_case;

    use super::*;

    #[test]
    fn phase_order() {
        let expected_order = [Phase::Phase0, Phase::Altair, Phase::Bellatrix];

        assert_eq!(expected_order.len(), Phase::CARDINALITY);

        assert!(expected_order
            .into_iter()
            .tuple_windows()
            .all(|(earlier, later)| earlier < later));
    }

    #[test_case(
        "phase0" => Ok(Phase::Phase0);
        "lowercase like in consensus-spec-tests and Eth Beacon Node API"
    )]
    #[test_case(
        "PHASE0" => Ok(Phase::Phase0);
        "uppercase like in Vouch or Web3Signer"
    )]
    fn phase_from_str(string: &str) -> Result<Phase, ParseError> {
        string.parse()
    }

    #[test_case(Phase::Phase0 => "phase0")]
    fn phase_display(phase: Phase) -> String {
        phase.to_string()
    }

    #[test]
    fn toption_comparisons() {
        assert_eq!(Toption::<usize>::None, Toption::<usize>::None);

        assert!(Toption::None > Toption::Some(usize::MIN));
        assert!(Toption::None > Toption::Some(usize::MAX));

        assert!(Toption::Some(usize::MIN) < Toption::None);
        assert!(Toption::Some(usize::MAX) < Toption::None);

        assert!(Toption::Some(usize::MIN) < Toption::Some(usize::MAX));
    }
}
