//! Helper macro for enums persisted as TEXT columns.

/// Define a `Copy` enum whose variants map 1:1 to stable string values.
///
/// Generates `as_str`, `ALL`, `Display`, `FromStr` (failing with
/// [`CoreError::Validation`](crate::error::CoreError::Validation)) and serde
/// impls that use the same strings.
macro_rules! define_text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $val)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted string value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $val),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($val => Ok($name::$variant),)+
                    other => Err($crate::error::CoreError::Validation(format!(
                        concat!("Invalid ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}
