//! Result and error marshaling.
//!
//! Total mapping from whatever an evaluation produced to bounded text.
//! Every path ends in a [`BoundedText`]; values that cannot be turned into
//! text become a fixed placeholder instead of a failure.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result text capacity, terminator included
pub const RESULT_CAPACITY: usize = 65536;

/// Error text capacity, terminator included
pub const ERROR_CAPACITY: usize = 4096;

/// Placeholder for a success value with no text form
pub const OBJECT_FALLBACK: &str = "[object]";

/// Placeholder for a thrown value with no text form
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Significant digits used for non-integer numbers
const SIGNIFICANT_DIGITS: usize = 17;

/// Text copied under a fixed capacity
///
/// Holds at most `capacity - 1` bytes, leaving room for the terminator a
/// C reader expects. Longer sources are cut at the last UTF-8 character
/// boundary that fits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundedText {
    text: String,
    truncated: bool,
}

impl BoundedText {
    /// Copy `source` under `capacity`
    #[must_use]
    pub fn copy(source: &str, capacity: usize) -> Self {
        let limit = capacity.saturating_sub(1);
        if source.len() <= limit {
            return Self {
                text: source.to_owned(),
                truncated: false,
            };
        }

        let mut end = limit;
        while !source.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            text: source[..end].to_owned(),
            truncated: true,
        }
    }

    /// The copied text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the source was longer than the capacity allowed
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Byte length of the copied text
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Take the copied text
    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for BoundedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for BoundedText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Why an evaluation produced no result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// No context is live
    #[error("Not initialized")]
    NotInitialized,

    /// The script threw; holds the thrown value as text
    #[error("{0}")]
    Exception(BoundedText),
}

impl EvalError {
    /// Error text as the host reads it
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotInitialized => "Not initialized",
            Self::Exception(text) => text.as_str(),
        }
    }
}

/// Text for a completion value
///
/// Kinds are tried in order: undefined, null, boolean, integer, general
/// number, string, then anything else through the engine's string
/// conversion.
pub fn value_text<'js>(ctx: &Ctx<'js>, value: &Value<'js>, capacity: usize) -> BoundedText {
    if value.is_undefined() {
        return BoundedText::copy("undefined", capacity);
    }
    if value.is_null() {
        return BoundedText::copy("null", capacity);
    }
    if let Some(flag) = value.as_bool() {
        return BoundedText::copy(if flag { "true" } else { "false" }, capacity);
    }
    if let Some(int) = value.as_int() {
        return BoundedText::copy(&int.to_string(), capacity);
    }
    if let Some(float) = value.as_float() {
        return BoundedText::copy(&format_number(float), capacity);
    }
    if let Some(string) = value.as_string() {
        // An unreadable string yields empty text, not the placeholder
        return BoundedText::copy(&string.to_string().unwrap_or_default(), capacity);
    }

    match coerce_to_string(ctx, value) {
        Some(text) => BoundedText::copy(&text, capacity),
        None => BoundedText::copy(OBJECT_FALLBACK, capacity),
    }
}

/// Text for a thrown value
pub fn exception_text<'js>(ctx: &Ctx<'js>, thrown: &Value<'js>, capacity: usize) -> BoundedText {
    let text = match thrown.as_string() {
        Some(string) => string.to_string().ok(),
        None => coerce_to_string(ctx, thrown),
    };
    BoundedText::copy(text.as_deref().unwrap_or(UNKNOWN_ERROR), capacity)
}

/// Run the engine's string conversion on `value`
///
/// A conversion that throws leaves an exception pending on the context;
/// it is caught and dropped so the next evaluation starts clean.
fn coerce_to_string<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<String> {
    match value.get::<Coerced<String>>() {
        Ok(Coerced(text)) => Some(text),
        Err(err) => {
            let _ = ctx.catch();
            tracing::debug!(error = %err, "string conversion failed");
            None
        }
    }
}

/// Format a double the way `%.17g` does
///
/// Seventeen significant digits always round-trip an IEEE double. Trailing
/// zeros are dropped, and the exponent form is used below `1e-4` or at
/// `1e17` and above.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Drop trailing fractional zeros, and the point if nothing follows it
fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_copy_fits() {
        let text = BoundedText::copy("hello", 16);
        assert_eq!(text.as_str(), "hello");
        assert!(!text.is_truncated());
    }

    #[test]
    fn test_copy_at_capacity_truncates() {
        // Room for 4 bytes plus the terminator
        let text = BoundedText::copy("hello", 5);
        assert_eq!(text.as_str(), "hell");
        assert!(text.is_truncated());

        let text = BoundedText::copy("hell", 5);
        assert_eq!(text.as_str(), "hell");
        assert!(!text.is_truncated());
    }

    #[test]
    fn test_copy_respects_char_boundaries() {
        // "é" is two bytes; cutting at 2 would split it
        let text = BoundedText::copy("aé", 3);
        assert_eq!(text.as_str(), "a");
        assert!(text.is_truncated());
    }

    #[test]
    fn test_copy_zero_capacity() {
        let text = BoundedText::copy("x", 0);
        assert!(text.is_empty());
        assert!(text.is_truncated());
        assert!(!BoundedText::copy("", 0).is_truncated());
    }

    #[test]
    fn test_eval_error_message() {
        assert_eq!(EvalError::NotInitialized.message(), "Not initialized");
        let err = EvalError::Exception(BoundedText::copy("boom", ERROR_CAPACITY));
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_format_fractions() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-2.25), "-2.25");
        assert_eq!(format_number(0.1), "0.10000000000000001");
        assert_eq!(format_number(123.456), "123.456");
    }

    #[test]
    fn test_format_integral_doubles() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(9007199254740992.0), "9007199254740992");
        assert_eq!(format_number(-0.0), "-0");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn test_format_exponents() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e100), "1e+100");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(2f64.powi(-20)), "9.5367431640625e-07");
    }

    #[test]
    fn test_format_non_finite() {
        assert_eq!(format_number(f64::NAN), "nan");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
    }

    proptest! {
        #[test]
        fn prop_copy_never_exceeds_capacity(source in ".*", capacity in 0usize..64) {
            let text = BoundedText::copy(&source, capacity);
            prop_assert!(text.len() <= capacity.saturating_sub(1));
            prop_assert!(source.starts_with(text.as_str()));
            prop_assert_eq!(text.is_truncated(), text.len() < source.len());
        }

        #[test]
        fn prop_number_round_trips(value in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL) {
            let text = format_number(value);
            let parsed: f64 = text.parse().unwrap();
            prop_assert_eq!(parsed.to_bits(), value.to_bits());
        }
    }
}
