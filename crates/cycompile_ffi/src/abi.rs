//! C ABI shared with native entry points.
//!
//! A compiled artifact exports [`INIT_SYMBOL`], run once when the artifact is
//! opened, and one [`NativeEntry`] per function under [`entry_symbol`]. Only
//! scalar values cross the boundary; strings and lists are rejected before
//! the call is made.
//!
//! Sibling calls made by native code come back through the [`LinkCallback`]
//! handed to every entry, so siblings are looked up by name at call time.

use std::ffi::{c_char, c_void};

use crate::value::Value;
use crate::InvokeError;

/// Prefix of exported per-function entry points.
pub const ENTRY_PREFIX: &str = "cyc_entry_";

/// Exported initialiser, `status = init(directory, module)`.
pub const INIT_SYMBOL: &str = "cyc_module_init";

pub fn entry_symbol(function: &str) -> String {
    format!("{ENTRY_PREFIX}{function}")
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiKind {
    None = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FfiValue {
    pub kind: FfiKind,
    pub int: i64,
    pub float: f64,
}

impl FfiValue {
    pub const NONE: FfiValue = FfiValue {
        kind: FfiKind::None,
        int: 0,
        float: 0.0,
    };

    pub fn into_value(self) -> Value {
        match self.kind {
            FfiKind::None => Value::None,
            FfiKind::Bool => Value::Bool(self.int != 0),
            FfiKind::Int => Value::Int(self.int),
            FfiKind::Float => Value::Float(self.float),
        }
    }
}

impl TryFrom<&Value> for FfiValue {
    type Error = InvokeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let ffi = match value {
            Value::None => FfiValue::NONE,
            Value::Bool(flag) => FfiValue {
                kind: FfiKind::Bool,
                int: i64::from(*flag),
                float: 0.0,
            },
            Value::Int(int) => FfiValue {
                kind: FfiKind::Int,
                int: *int,
                float: 0.0,
            },
            Value::Float(float) => FfiValue {
                kind: FfiKind::Float,
                int: 0,
                float: *float,
            },
            other => {
                return Err(InvokeError::Unsupported { kind: other.kind() });
            }
        };
        Ok(ffi)
    }
}

/// `status = link(ctx, name, argv, argc, out)`; zero means success.
pub type LinkCallback = unsafe extern "C" fn(
    ctx: *const c_void,
    name: *const c_char,
    argv: *const FfiValue,
    argc: usize,
    out: *mut FfiValue,
) -> i32;

/// `status = entry(argv, argc, out, link, ctx)`; zero means success. `ctx` is
/// opaque to native code and only ever passed back to `link`.
pub type NativeEntry = unsafe extern "C" fn(
    argv: *const FfiValue,
    argc: usize,
    out: *mut FfiValue,
    link: LinkCallback,
    ctx: *const c_void,
) -> i32;

/// Signature of [`INIT_SYMBOL`]: the artifact's directory and module name.
pub type InitEntry = unsafe extern "C" fn(directory: *const c_char, module: *const c_char) -> i32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_cross_the_boundary() -> Result<(), InvokeError> {
        let ffi = FfiValue::try_from(&Value::Bool(true))?;
        assert_eq!(ffi.kind, FfiKind::Bool);
        assert_eq!(ffi.into_value(), Value::Bool(true));
        assert_eq!(FfiValue::try_from(&Value::Int(-7))?.into_value(), Value::Int(-7));
        Ok(())
    }

    #[test]
    fn entry_symbols_are_prefixed() {
        assert_eq!(entry_symbol("is_odd"), "cyc_entry_is_odd");
        assert!(entry_symbol("f").starts_with(ENTRY_PREFIX));
    }

    #[test]
    fn strings_are_rejected() {
        let err = FfiValue::try_from(&Value::Str("x".into())).unwrap_err();
        assert!(matches!(err, InvokeError::Unsupported { kind: "str" }));
    }
}
