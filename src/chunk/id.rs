//! Transaction and message identifiers.
//!
//! Both identifiers share the token grammar `[A-Za-z0-9][A-Za-z0-9.+%=-]*`.
//! Transaction identifiers are 4 to 32 characters long, message identifiers 1
//! to 32. Locally generated identifiers draw from the alphanumeric alphabet
//! and are at least [`MIN_GENERATED_LENGTH`] characters, which gives more
//! than 64 bits of randomness.

use std::{fmt, num::NonZeroUsize, str::FromStr};

use rand::{Rng, distributions::Alphanumeric};
use thiserror::Error;

/// Shortest identifier the generator emits.
pub const MIN_GENERATED_LENGTH: usize = 11;
/// Longest identifier permitted on the wire.
pub const MAX_ID_LENGTH: usize = 32;

const MIN_TRANSACTION_ID_LENGTH: usize = 4;

/// Error raised when a token is not a valid identifier.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid {kind}: {value:?}")]
pub struct InvalidId {
    kind: &'static str,
    value: String,
}

fn is_valid_token(value: &str, min_len: usize) -> bool {
    let bytes = value.as_bytes();
    (min_len..=MAX_ID_LENGTH).contains(&bytes.len())
        && bytes[0].is_ascii_alphanumeric()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'%' | b'=' | b'-'))
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $min:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate `value` as an identifier.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidId`] when `value` violates the token grammar.
            pub fn new(value: impl Into<String>) -> Result<Self, InvalidId> {
                let value = value.into();
                if is_valid_token(&value, $min) {
                    Ok(Self(value))
                } else {
                    Err(InvalidId { kind: $kind, value })
                }
            }

            #[must_use]
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(value: &str) -> Result<Self, Self::Err> { Self::new(value) }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str { &self.0 }
        }
    };
}

identifier!(
    /// Identifier correlating a request with its response.
    TransactionId,
    "transaction id",
    MIN_TRANSACTION_ID_LENGTH
);

identifier!(
    /// Identifier shared by every chunk of one message.
    MessageId,
    "message id",
    1
);

/// Random identifier source with a fixed output length.
#[derive(Clone, Copy, Debug)]
pub struct IdGenerator {
    length: usize,
}

impl IdGenerator {
    /// Create a generator emitting identifiers of `length` characters, clamped
    /// to `MIN_GENERATED_LENGTH..=MAX_ID_LENGTH`.
    #[must_use]
    pub fn new(length: NonZeroUsize) -> Self {
        Self {
            length: length.get().clamp(MIN_GENERATED_LENGTH, MAX_ID_LENGTH),
        }
    }

    #[must_use]
    pub fn length(&self) -> usize { self.length }

    fn token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }

    /// Draw a fresh transaction identifier.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId { TransactionId(self.token()) }

    /// Draw a fresh message identifier.
    #[must_use]
    pub fn message_id(&self) -> MessageId { MessageId(self.token()) }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            length: MIN_GENERATED_LENGTH + 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("d93kswow", true)]
    #[case("a.b+c%d=e-f", true)]
    #[case("abc", false)]
    #[case(".abcd", false)]
    #[case("abcd efg", false)]
    #[case("abcdefghijklmnopqrstuvwxyz0123456", false)]
    fn transaction_id_grammar(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(TransactionId::new(value).is_ok(), valid, "{value}");
    }

    #[test]
    fn message_id_allows_short_tokens() {
        assert!(MessageId::new("1").is_ok());
        assert!(TransactionId::new("1").is_err());
    }

    #[rstest]
    #[case(1, MIN_GENERATED_LENGTH)]
    #[case(20, 20)]
    #[case(64, MAX_ID_LENGTH)]
    fn generator_clamps_length(#[case] requested: usize, #[case] expected: usize) {
        let generator = IdGenerator::new(NonZeroUsize::new(requested).expect("non-zero"));
        let id = generator.transaction_id();
        assert_eq!(id.as_str().len(), expected);
        assert!(TransactionId::new(id.as_str()).is_ok());
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let generator = IdGenerator::default();
        let ids: HashSet<_> = (0..1000).map(|_| generator.message_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
