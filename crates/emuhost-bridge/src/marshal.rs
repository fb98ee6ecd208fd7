//! Typed views of [`ScriptResult`].

use emuhost_engine::ScriptResult;

use crate::error::BridgeError;

/// A host type a script result can be converted to.
pub trait FromScript: Sized + Default {
    /// Type name used in mismatch diagnostics.
    const EXPECTED: &'static str;

    fn from_script(value: ScriptResult) -> Option<Self>;

    /// Converts `value`, or reports why it could not be.
    fn marshal(value: ScriptResult) -> Result<Self, BridgeError> {
        let actual = value.type_name();
        Self::from_script(value).ok_or(BridgeError::TypeMismatch {
            expected: Self::EXPECTED,
            actual,
        })
    }
}

impl FromScript for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_script(value: ScriptResult) -> Option<Self> {
        match value {
            ScriptResult::Integer(i) => Some(i),
            // `as` truncates toward zero, saturates, and maps NaN to 0.
            ScriptResult::Real(r) => Some(r as i64),
            _ => None,
        }
    }
}

impl FromScript for i32 {
    const EXPECTED: &'static str = "integer";

    fn from_script(value: ScriptResult) -> Option<Self> {
        match value {
            ScriptResult::Integer(i) => Some(i as i32),
            ScriptResult::Real(r) => Some(r as i32),
            _ => None,
        }
    }
}

impl FromScript for f64 {
    const EXPECTED: &'static str = "real";

    fn from_script(value: ScriptResult) -> Option<Self> {
        match value {
            ScriptResult::Real(r) => Some(r),
            ScriptResult::Integer(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FromScript for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_script(value: ScriptResult) -> Option<Self> {
        match value {
            ScriptResult::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FromScript for Vec<u8> {
    const EXPECTED: &'static str = "text";

    fn from_script(value: ScriptResult) -> Option<Self> {
        match value {
            ScriptResult::Text(bytes) => Some(bytes),
            _ => None,
        }
    }
}
