//! Short text fingerprints used to disambiguate synthesized bubble keys.
//!
//! 32-bit FNV-1a over UTF-16 code units, rendered in base-36. Code units are
//! hashed rather than bytes so keys written by earlier JS builds of the
//! extension still match.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn fnv1a_hash(text: &str) -> String {
    hash_units(text.encode_utf16())
}

pub fn hash_units(units: impl IntoIterator<Item = u16>) -> String {
    let hash = units.into_iter().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    });
    to_base36(hash)
}

fn to_base36(mut value: u32) -> String {
    let mut digits = Vec::with_capacity(7);
    loop {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
