//! Hex rendering and parsing of raw packet payloads.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Render bytes as upper-case, space-separated hex: `0A 1B FF`.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&hex::encode_upper([*b]));
    }
    out
}

/// Parse hex, ignoring any whitespace between digits.
/// An empty (or all-whitespace) input is an empty payload.
pub fn from_hex(input: &str) -> Result<Vec<u8>, PayloadError> {
    let sanitized: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if sanitized.len() % 2 != 0 {
        return Err(PayloadError::OddLength(sanitized.len()));
    }
    Ok(hex::decode(sanitized)?)
}
