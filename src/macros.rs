/// Generates a non-exhaustive enum mapping Rust variants to wire-format
/// strings, plus the parse-error type for its `FromStr`.
///
/// Produces: enum definition + `as_str()` + `Display` + `AsRef<str>` +
/// `FromStr` (case-insensitive) + the error struct with the given display
/// prefix.
///
/// # Example
///
/// ```ignore
/// define_wire_enum! {
///     /// Doc comment for the enum.
///     pub enum MyEnum(error: ParseMyEnumError, "unknown thing") {
///         Foo => "foo-wire",
///         Bar => "bar-wire",
///     }
/// }
/// ```
macro_rules! define_wire_enum {
    (
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident ( error: $Err:ident, $errmsg:literal ) {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
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
            /// Wire-format name string.
            pub fn as_str(&self) -> &'static str {
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
                $(
                    if s.eq_ignore_ascii_case($wire) {
                        return Ok($Name::$variant);
                    }
                )+
                Err($Err(s.to_string()))
            }
        }

        /// Error returned when parsing an unrecognized wire name.
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis struct $Err(pub String);

        impl std::fmt::Display for $Err {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($errmsg, ": {}"), self.0)
            }
        }

        impl std::error::Error for $Err {}
    };
}
