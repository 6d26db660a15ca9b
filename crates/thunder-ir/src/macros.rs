/// Declares a field-less code enum together with its textual names and a
/// dense numeric encoding used by the persisted stream format.
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $name {
            /// Every variant, in declaration (and encoding) order.
            pub const ALL: &'static [Self] = &[$( Self::$variant, )*];

            /// The name used in assembly listings.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )*
                }
            }

            /// Dense numeric code for the binary stream format.
            pub fn code(self) -> u16 {
                self as u16
            }

            /// Inverse of [`Self::code`].
            pub fn from_code(code: u16) -> Option<Self> {
                Self::ALL.get(code as usize).copied()
            }

            /// Inverse of [`Self::name`].
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.name() == name)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}
