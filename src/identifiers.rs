//! Strongly-typed identifier newtypes.
//!
//! Run and model identifiers are opaque strings assigned by the backend. They
//! serialize as plain strings and compare by their trimmed value.
//!
//! ```ignore
//! use testops::{ModelId, RunId};
//!
//! let run: RunId = "3f2c9a1e".into();
//! let model: ModelId = "gpt-lite".into();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates a string wrapper newtype.
///
/// Each generated type trims its input, converts from `&str`/`String`,
/// implements `Display`, and (de)serializes as a plain string.
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_id_type!(
    RunId,
    "Pipeline run identifier, assigned by the backend when a run is submitted."
);

string_id_type!(
    ModelId,
    "Generation model identifier as listed by `GET /models` (e.g. \"gpt-lite\")."
);
