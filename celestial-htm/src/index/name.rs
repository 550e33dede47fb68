//! HTM trixel names such as `N012` or `S3`.
//!
//! A name is the root hemisphere letter, the root number, and one digit per
//! subdivision. It is just another spelling of the internal id: the leading
//! `10`/`11` bits pick `S`/`N`, and every following bit pair is one digit.

use crate::constants::FIRST_ROOT_ID;
use crate::errors::{HtmError, HtmResult};

/// Longest name whose id still fits in a `u64`.
pub const MAX_NAME_LEN: usize = 32;

/// Renders internal id `id` as an HTM name.
pub fn name_by_id(id: u64) -> HtmResult<String> {
    let bits = 64 - id.leading_zeros() as usize;
    if id < FIRST_ROOT_ID || bits % 2 != 0 {
        return Err(HtmError::InvalidName(format!("#{id}")));
    }
    let size = bits / 2;
    let mut name = String::with_capacity(size);
    name.push(if (id >> (bits - 2)) & 1 == 1 { 'N' } else { 'S' });
    for i in (0..size - 1).rev() {
        let digit = ((id >> (2 * i)) & 3) as u8;
        name.push(char::from(b'0' + digit));
    }
    Ok(name)
}

/// Parses an HTM name back to its internal id.
pub fn id_by_name(name: &str) -> HtmResult<u64> {
    let invalid = || HtmError::InvalidName(name.to_string());
    let bytes = name.as_bytes();
    if bytes.len() < 2 || bytes.len() > MAX_NAME_LEN {
        return Err(invalid());
    }
    let mut id: u64 = match bytes[0] {
        b'S' => 2,
        b'N' => 3,
        _ => return Err(invalid()),
    };
    for &b in &bytes[1..] {
        if !(b'0'..=b'3').contains(&b) {
            return Err(invalid());
        }
        id = (id << 2) | u64::from(b - b'0');
    }
    Ok(id)
}
