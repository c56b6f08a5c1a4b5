//! `define_port_error!`: port failures as `thiserror` enums whose variants
//! all carry a single `message`.
//!
//! Each variant is written as `Variant => "label"` and expands to
//! `Variant { message: String }` displayed as `label: message`, plus a
//! snake-case constructor taking `impl Into<String>` and a shared
//! `message()` accessor.

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $label:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error("{label}: {message}", label = $label)]
                $variant { message: String },
            )+
        }

        impl $name {
            $(
                ::paste::paste! {
                    /// Build this failure from an adapter message.
                    pub fn [<$variant:snake>](message: impl Into<String>) -> Self {
                        Self::$variant {
                            message: message.into(),
                        }
                    }
                }
            )+

            /// Adapter-provided detail, without the variant label.
            #[must_use]
            pub fn message(&self) -> &str {
                match self {
                    $(Self::$variant { message })|+ => message,
                }
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum ProbeError {
            Offline => "upstream unreachable",
            StoreFull => "queue store write failed",
        }
    }

    #[test]
    fn display_prefixes_the_label() {
        assert_eq!(
            ProbeError::store_full("disk full").to_string(),
            "queue store write failed: disk full"
        );
    }

    #[test]
    fn constructors_accept_owned_and_borrowed_text() {
        assert_eq!(
            ProbeError::offline(String::from("dns")),
            ProbeError::Offline {
                message: "dns".to_owned()
            }
        );
    }

    #[test]
    fn message_drops_the_label() {
        assert_eq!(ProbeError::offline("connection reset").message(), "connection reset");
    }
}
