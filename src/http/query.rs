//! Query string handling for the echo endpoint

use http::StatusCode;
use url::form_urlencoded;

/// The query parameters the echo handler reacts to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoQuery {
    /// Literal `status_code` value, after form decoding
    pub status_code: Option<String>,
    /// `throw` was present
    pub throw: bool,
    /// `die` was present
    pub die: bool,
}

impl EchoQuery {
    /// Parses a form-encoded query string. Later duplicates win.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "status_code" => parsed.status_code = Some(value.into_owned()),
                "throw" => parsed.throw = true,
                "die" => parsed.die = true,
                _ => {}
            }
        }
        parsed
    }

    /// The status requested through `status_code`, if it names a final one.
    /// Informational (1xx) codes cannot end an exchange and yield `None`.
    pub fn response_status(&self) -> Option<StatusCode> {
        let code = coerce_integer(self.status_code.as_deref()?);
        u16::try_from(code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .filter(|status| !status.is_informational())
    }
}

/// Lenient integer coercion: optional leading whitespace, an optional sign,
/// then as many decimal digits as follow. Anything unparsable is 0 and
/// out-of-range values saturate.
pub fn coerce_integer(raw: &str) -> i64 {
    let trimmed = raw.trim_start_matches([' ', '\t', '\n', '\r', '\x0b', '\x0c']);
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    for digit in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}
