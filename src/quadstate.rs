//! Four-valued logic for membership voting.
//!
//! Membership predicates are evaluated as an ordered chain of voters. A
//! voter that is *certain* of its verdict ends the chain; an uncertain
//! "leaning" verdict can still be overridden by a later, more specific
//! voter.

/// A boolean verdict paired with a certainty bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadstate {
    AbsolutelyTrue,
    MaybeTrue,
    AbsolutelyFalse,
    MaybeFalse,
}

impl Quadstate {
    /// The boolean bit of the verdict, regardless of certainty.
    #[inline]
    pub fn as_bool(self) -> bool {
        matches!(self, Self::AbsolutelyTrue | Self::MaybeTrue)
    }

    /// True only for the two `Absolutely*` variants.
    ///
    /// A certain verdict short-circuits the voting chain: no later voter
    /// gets to override it.
    #[inline]
    pub fn is_certain(self) -> bool {
        matches!(self, Self::AbsolutelyTrue | Self::AbsolutelyFalse)
    }
}

impl From<Quadstate> for bool {
    fn from(value: Quadstate) -> Self {
        value.as_bool()
    }
}
