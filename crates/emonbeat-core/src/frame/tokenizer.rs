use super::error::FrameError;

/// Split a raw line into byte tokens.
///
/// Surrounding whitespace (including the CRLF terminator) is trimmed and the
/// remainder is split on ASCII whitespace. Every token must be a decimal
/// integer in `0..=255`; order is preserved because it encodes field
/// position.
///
/// # Examples
/// ```
/// use emonbeat_core::frame::tokenize;
///
/// let tokens = tokenize(b"10 44 1\r\n").unwrap();
/// assert_eq!(tokens, vec![10, 44, 1]);
/// ```
///
/// # Errors
/// Returns `FrameError::InvalidToken` for the first token that is not a
/// byte-range decimal integer.
pub fn tokenize(line: &[u8]) -> Result<Vec<u8>, FrameError> {
    line.trim_ascii()
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(index, token)| parse_token(index, token))
        .collect()
}

fn parse_token(index: usize, token: &[u8]) -> Result<u8, FrameError> {
    let invalid = || FrameError::InvalidToken {
        index,
        token: String::from_utf8_lossy(token).into_owned(),
    };
    if !token.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(token)
        .ok()
        .and_then(|text| text.parse::<u8>().ok())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::tokenize;
    use crate::frame::error::FrameError;

    #[test]
    fn tokenize_reference_line() {
        let tokens = tokenize(b"10 44 1 88 2 132 3 176 4 220 5\r\n").unwrap();
        assert_eq!(tokens, vec![10, 44, 1, 88, 2, 132, 3, 176, 4, 220, 5]);
    }

    #[test]
    fn tokenize_collapses_repeated_whitespace() {
        let tokens = tokenize(b"  1\t2   3 \r\n").unwrap();
        assert_eq!(tokens, vec![1, 2, 3]);
    }

    #[test]
    fn tokenize_empty_line() {
        assert!(tokenize(b"\r\n").unwrap().is_empty());
    }

    #[test]
    fn tokenize_accepts_bounds() {
        assert_eq!(tokenize(b"0 255\r\n").unwrap(), vec![0, 255]);
    }

    #[test]
    fn tokenize_rejects_out_of_range() {
        let err = tokenize(b"10 256 1\r\n").unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidToken {
                index: 1,
                token: "256".to_string()
            }
        );
    }

    #[test]
    fn tokenize_rejects_negative() {
        let err = tokenize(b"10 -1\r\n").unwrap_err();
        assert!(matches!(err, FrameError::InvalidToken { index: 1, .. }));
    }

    #[test]
    fn tokenize_rejects_non_numeric() {
        let err = tokenize(b"10 4a 1\r\n").unwrap_err();
        assert!(err.to_string().contains("invalid token"));
    }

    #[test]
    fn tokenize_rejects_sign_prefix() {
        assert!(tokenize(b"+10\r\n").is_err());
    }

    #[test]
    fn tokenize_rejects_non_ascii() {
        assert!(tokenize(&[b'1', 0xff, b'\r', b'\n']).is_err());
    }
}
