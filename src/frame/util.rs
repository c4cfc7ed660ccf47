use super::Error;

use bytes::Bytes;

/// Removes the pad length octet and the trailing padding from a padded
/// payload, returning the number of padding octets.
///
/// Fails when the pad length does not fit inside the payload.
pub fn strip_padding(payload: &mut Bytes) -> Result<u8, Error> {
    let pad_len = match payload.first() {
        Some(&n) if (n as usize) < payload.len() => n,
        _ => return Err(Error::TooMuchPadding),
    };

    let end = payload.len() - pad_len as usize;
    *payload = payload.slice(1..end);

    Ok(pad_len)
}
