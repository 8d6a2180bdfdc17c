use core::fmt;

use compact_str::CompactString;

pub type Str = CompactString;

/// Annotations used to carry provenance across the function boundary.
pub mod annotation {
    pub const PATH: &str = "config.kubernetes.io/path";
    pub const INDEX: &str = "config.kubernetes.io/index";
    /// Sequence number assigned to each resource for the duration of a function call.
    pub const ID: &str = "config.k8s.io/id";

    pub const ADMINISTRATIVE: &[&str] = &[PATH, INDEX, ID];
}

pub mod kind {
    use super::define_symbol;

    define_symbol!(ResourceList = "ResourceList");
}

pub mod apiversion {
    use super::define_symbol;

    define_symbol!(ConfigV1 = "config.kubernetes.io/v1");
}

macro_rules! define_symbol {
    ($name:ident = $value:literal) => {
        #[derive(Clone, PartialEq, Eq, Hash, Default)]
        #[allow(non_camel_case_types)]
        pub struct $name;

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str($value)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value: $crate::manifest::Str = ::serde::Deserialize::deserialize(deserializer)?;
                if value == $value {
                    Ok($name)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected `{}`, found `{value}`",
                        $value
                    )))
                }
            }
        }

        impl $crate::manifest::Symbol for $name {
            const VALUE: &'static str = $value;
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                other == $value
            }
        }
    };
}

use define_symbol;

pub trait Symbol: fmt::Debug + Send + Sync {
    const VALUE: &'static str;
}
