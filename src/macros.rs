/// Defines a closed set of wire names as a non-exhaustive enum, together with
/// its parse error.
///
/// Generates `VARIANTS`, `as_str()`, `Display`, `AsRef<str>`, an ASCII
/// case-insensitive `FromStr`, and an error tuple struct holding the
/// rejected input.
///
/// ```ignore
/// define_wire_enum! {
///     /// Doc comment for the enum.
///     pub enum Color / ParseColorError("color") {
///         Red => "RED",
///         Green => "GREEN",
///     }
/// }
/// ```
macro_rules! define_wire_enum {
    (
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident / $Err:ident($what:literal) {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        #[doc = concat!("Error returned when parsing an unknown ", $what, ".")]
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis struct $Err(pub String);

        impl std::fmt::Display for $Err {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!("unknown ", $what, ": {}"), self.0)
            }
        }

        impl std::error::Error for $Err {}

        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const VARIANTS: &'static [$Name] = &[$( $Name::$variant, )+];

            /// Name as written on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::VARIANTS
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
