use thiserror::Error;

/// Width external short codes are padded to.
pub const SHORT_CODE_PADDING: usize = 5;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq)]
pub enum ShortCodeError {
    #[error("'{0}' is not a base-36 code")]
    InvalidDigit(String),
}

/// Base-36 representation of `id`, zero-padded to at least `min_width`.
pub fn encode(mut id: u64, min_width: usize) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(ALPHABET[(id % 36) as usize] as char);
        id /= 36;
        if id == 0 {
            break;
        }
    }
    while digits.len() < min_width {
        digits.push('0');
    }
    digits.iter().rev().collect()
}

pub fn decode(code: &str) -> Result<u64, ShortCodeError> {
    u64::from_str_radix(code, 36).map_err(|_| ShortCodeError::InvalidDigit(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_pads() {
        for n in [0u64, 1, 35, 36, 1_295, 1_296, 123_456_789] {
            for width in [0usize, 1, 5, 10] {
                let code = encode(n, width);
                assert!(code.len() >= width, "{code} shorter than {width}");
                assert_eq!(decode(&code), Ok(n));
            }
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(encode(0, 5), "00000");
        assert_eq!(encode(35, 0), "z");
        assert_eq!(encode(36, 5), "00010");
        assert_eq!(encode(42, 5), "00016");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not base36!").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn decode_ignores_case() {
        assert_eq!(decode("Z"), Ok(35));
    }
}
