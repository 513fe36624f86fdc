//! Shelf-code codec.
//!
//! A location label carries `(shelf_id * 10 + row_number) * 10 + check_digit`
//! printed as an EAN-8 barcode: six digits of shelf id, one digit of row, one
//! check digit. The scanner validates the symbology check digit, so decoding
//! only strips it unless [`check_digit_matches`] is asked for explicitly.

use crate::error::{DecodeError, EncodeError};
use crate::types::ShelfLocation;

const MAX_SHELF_ID: u32 = 999_999;
const MAX_ROW: u32 = 9;

/// Turn a scanned code into a location. Leading zeros are fine, signs and
/// whitespace are not.
pub fn decode(code: &str) -> Result<ShelfLocation, DecodeError> {
    if code.is_empty() {
        return Err(DecodeError::Empty);
    }
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::NonNumeric(code.to_string()));
    }
    let value: u64 = code.parse().map_err(|_| DecodeError::Overflow(code.to_string()))?;

    let without_check = value / 10;
    let row_number = (without_check % 10) as u32;
    let shelf_id =
        u32::try_from(without_check / 10).map_err(|_| DecodeError::Overflow(code.to_string()))?;

    Ok(ShelfLocation { shelf_id, row_number })
}

/// Like [`decode`], but also rejects codes whose trailing digit is not the
/// EAN-8 check digit of the first seven.
pub fn decode_verified(code: &str) -> Result<ShelfLocation, DecodeError> {
    let location = decode(code)?;
    let digits = code.as_bytes();
    if digits.len() == 8 {
        let expected = ean8_check_digit(&digits[..7]);
        let found = digits[7] - b'0';
        if expected != found {
            return Err(DecodeError::ChecksumMismatch { code: code.to_string(), expected, found });
        }
    }
    Ok(location)
}

/// The raw arithmetic form of a label code with an explicit check digit.
pub fn compose(shelf_id: u32, row_number: u32, check_digit: u8) -> u64 {
    (u64::from(shelf_id) * 10 + u64::from(row_number)) * 10 + u64::from(check_digit)
}

/// Render the 8-digit label for a location, check digit included.
pub fn encode(location: ShelfLocation) -> Result<String, EncodeError> {
    if location.shelf_id > MAX_SHELF_ID {
        return Err(EncodeError::ShelfOutOfRange(location.shelf_id));
    }
    if location.row_number > MAX_ROW {
        return Err(EncodeError::RowOutOfRange(location.row_number));
    }
    let payload = format!("{:06}{}", location.shelf_id, location.row_number);
    let check = ean8_check_digit(payload.as_bytes());
    Ok(format!("{}{}", payload, check))
}

/// EAN-8 check digit over seven ASCII digits: weights 3,1,3,1,3,1,3 from the left.
pub fn ean8_check_digit(payload: &[u8]) -> u8 {
    let sum: u32 = payload
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b.saturating_sub(b'0'));
            if i % 2 == 0 {
                d * 3
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Whether an 8-digit code carries a valid EAN-8 check digit.
pub fn check_digit_matches(code: &str) -> bool {
    let digits = code.as_bytes();
    digits.len() == 8
        && digits.iter().all(u8::is_ascii_digit)
        && ean8_check_digit(&digits[..7]) == digits[7] - b'0'
}
