//! DSCP code point names and their TOS byte values.
//!
//! Operators mark test traffic by DSCP name (`ef`, `af41`, `cs5`, ...) or by
//! numeric value 0-63; either way the DSCP occupies the upper six bits of
//! the TOS / traffic-class byte.

use super::error::TwampError;

/// Well-known DSCP names, ascending by code point.
pub const DSCP_NAMES: &[(&str, u8)] = &[
    ("be", 0),
    ("cs1", 8),
    ("af11", 10),
    ("af12", 12),
    ("af13", 14),
    ("cs2", 16),
    ("af21", 18),
    ("af22", 20),
    ("af23", 22),
    ("cs3", 24),
    ("af31", 26),
    ("af32", 28),
    ("af33", 30),
    ("cs4", 32),
    ("af41", 34),
    ("af42", 36),
    ("af43", 38),
    ("cs5", 40),
    ("ef", 46),
    ("nc1", 48),
    ("nc2", 56),
];

/// Resolve a DSCP name or numeric value (0-63) into a TOS byte.
pub fn resolve_tos(input: &str) -> Result<u8, TwampError> {
    let lower = input.to_lowercase();
    if let Some(&(_, value)) = DSCP_NAMES.iter().find(|(name, _)| *name == lower) {
        return Ok(value << 2);
    }
    match lower.parse::<u8>() {
        Ok(value) if value <= 63 => Ok(value << 2),
        _ => Err(TwampError::UnknownDscp(input.to_string())),
    }
}
