//! Fractional order keys for sibling ordering.
//!
//! Keys are non-empty base-62 strings (`0-9A-Za-z`, ASCII order) that never
//! end in `0`. Under plain byte comparison there is always room for another
//! key strictly between two distinct keys, so inserting never renumbers an
//! existing sibling. Repeated insertion at one spot grows key length instead
//! of exhausting the space.

use std::error::Error;
use std::fmt::{Display, Formatter};

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = DIGITS.len();

/// Key-shape or ordering violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKeyError {
    Empty,
    InvalidCharacter { key: String, ch: char },
    TrailingZero(String),
    NotOrdered { lower: String, upper: String },
}

impl Display for OrderKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "order key must not be empty"),
            Self::InvalidCharacter { key, ch } => {
                write!(f, "order key `{key}` contains `{ch}`; expected [0-9A-Za-z]")
            }
            Self::TrailingZero(key) => write!(f, "order key `{key}` must not end with `0`"),
            Self::NotOrdered { lower, upper } => {
                write!(f, "order key `{lower}` is not below `{upper}`")
            }
        }
    }
}

impl Error for OrderKeyError {}

/// Checks that `key` can take part in fractional allocation.
pub fn validate_order_key(key: &str) -> Result<(), OrderKeyError> {
    if key.is_empty() {
        return Err(OrderKeyError::Empty);
    }
    if let Some(ch) = key.chars().find(|ch| !ch.is_ascii_alphanumeric()) {
        return Err(OrderKeyError::InvalidCharacter {
            key: key.to_string(),
            ch,
        });
    }
    if key.ends_with('0') {
        return Err(OrderKeyError::TrailingZero(key.to_string()));
    }
    Ok(())
}

/// Allocates a key strictly between `lower` and `upper`.
///
/// `None` bounds are open: `(None, Some(k))` sorts before `k`,
/// `(Some(k), None)` after it, `(None, None)` yields the first key of an
/// empty sibling list.
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> Result<String, OrderKeyError> {
    if let Some(lower) = lower {
        validate_order_key(lower)?;
    }
    if let Some(upper) = upper {
        validate_order_key(upper)?;
    }

    let bytes = match (lower, upper) {
        (None, None) => midpoint(&[], None),
        (Some(lower), None) => key_after(lower.as_bytes()),
        (None, Some(upper)) => key_before(upper.as_bytes()),
        (Some(lower), Some(upper)) => {
            if lower >= upper {
                return Err(OrderKeyError::NotOrdered {
                    lower: lower.to_string(),
                    upper: upper.to_string(),
                });
            }
            midpoint(lower.as_bytes(), Some(upper.as_bytes()))
        }
    };

    // Every byte comes from DIGITS.
    Ok(bytes.into_iter().map(char::from).collect())
}

fn digit_value(byte: u8) -> usize {
    match byte {
        b'0'..=b'9' => usize::from(byte - b'0'),
        b'A'..=b'Z' => usize::from(byte - b'A') + 10,
        _ => usize::from(byte - b'a') + 36,
    }
}

/// Shortest key above `lower`: bump the first digit that is not `z`.
fn key_after(lower: &[u8]) -> Vec<u8> {
    for (index, byte) in lower.iter().enumerate() {
        let digit = digit_value(*byte);
        if digit + 1 < BASE {
            let mut out = lower[..index].to_vec();
            out.push(DIGITS[digit + 1]);
            return out;
        }
    }
    midpoint(lower, None)
}

/// Shortest key below `upper`: drop its leading digit by one when that stays
/// above `0`, otherwise bisect towards the empty string.
fn key_before(upper: &[u8]) -> Vec<u8> {
    let first = digit_value(upper[0]);
    if first > 1 {
        return vec![DIGITS[first - 1]];
    }
    midpoint(&[], Some(upper))
}

/// Digit-wise midpoint. `lower` may be empty (read as all zeros); `upper`
/// of `None` is read as one past the largest digit.
fn midpoint(lower: &[u8], upper: Option<&[u8]>) -> Vec<u8> {
    if let Some(upper) = upper {
        let mut common = 0;
        while common < upper.len()
            && lower.get(common).copied().unwrap_or(DIGITS[0]) == upper[common]
        {
            common += 1;
        }
        if common > 0 {
            let mut out = upper[..common].to_vec();
            let lower_rest = lower.get(common..).unwrap_or(&[]);
            out.extend(midpoint(lower_rest, Some(&upper[common..])));
            return out;
        }
    }

    let digit_lower = lower.first().map_or(0, |byte| digit_value(*byte));
    let digit_upper = upper
        .and_then(|upper| upper.first())
        .map_or(BASE, |byte| digit_value(*byte));

    if digit_upper - digit_lower > 1 {
        return vec![DIGITS[(digit_lower + digit_upper + 1) / 2]];
    }

    if let Some(upper) = upper {
        if upper.len() > 1 {
            return vec![upper[0]];
        }
    }

    let mut out = vec![DIGITS[digit_lower]];
    out.extend(midpoint(lower.get(1..).unwrap_or(&[]), None));
    out
}
