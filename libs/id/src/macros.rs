//! Macros for defining typed id types.

/// Macro to define a typed integer id with a specific prefix.
///
/// This generates a newtype wrapper around `u64` with:
/// - A `PREFIX` constant
/// - `new()` and `value()`
/// - `parse()` accepting `{prefix}_{n}` or a bare `n`
/// - `Display` (prefixed) and `FromStr` implementations
/// - `Serialize`/`Deserialize` as the bare integer
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(BlockId, "blk");
///
/// let id = BlockId::new(3);
/// assert_eq!(id.to_string(), "blk_3");
/// let parsed: BlockId = "blk_3".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A typed id for this resource type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u64);

        impl $name {
            /// The prefix for this id type.
            pub const PREFIX: &'static str = $prefix;

            /// Creates an id from its raw sequence number.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw sequence number.
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }

            /// Parses an id from `{prefix}_{n}` or a bare integer.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let digits = match s.split_once('_') {
                    Some((prefix, digits)) => {
                        if prefix != Self::PREFIX {
                            return Err($crate::IdError::InvalidPrefix {
                                expected: Self::PREFIX,
                                actual: prefix.to_string(),
                            });
                        }
                        digits
                    }
                    None => s,
                };

                digits
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|e| $crate::IdError::InvalidNumber(e.to_string()))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u64(self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = u64::deserialize(deserializer)?;
                Ok(Self(value))
            }
        }
    };
}
