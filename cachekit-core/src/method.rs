//! Method identifiers naming a cacheable method.

use smol_str::SmolStr;
use std::fmt;

/// A textual identifier of the form `Type.Method` uniquely naming a cacheable method.
///
/// Cheap to clone: backed by [`SmolStr`], which inlines strings up to 23 bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MethodId(SmolStr);

impl MethodId {
    /// Builds a method id from a `Type.Method`-shaped string.
    pub fn new(id: impl AsRef<str>) -> Self {
        MethodId(SmolStr::new(id))
    }

    /// Builds a method id from separate type and method names.
    pub fn from_parts(type_name: &str, method_name: &str) -> Self {
        MethodId(SmolStr::new(format!("{type_name}.{method_name}")))
    }

    /// Returns the method id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MethodId {
    fn from(value: &str) -> Self {
        MethodId::new(value)
    }
}

impl From<String> for MethodId {
    fn from(value: String) -> Self {
        MethodId(SmolStr::new(value))
    }
}

impl AsRef<str> for MethodId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
