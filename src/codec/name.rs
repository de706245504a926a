//! Key name validation

/// Key of the reserved metadata row
pub const RESERVED_KEY: &str = "StorXInfo";

/// Check whether `name` is a valid key name
///
/// Matches `^[A-Za-z_\x80-\xff][A-Za-z0-9_\x80-\xff]*$` over the UTF-8 bytes,
/// so any non-ASCII character is accepted anywhere.
pub fn check_key_name(name: &str) -> bool {
    let mut bytes = name.bytes();

    match bytes.next() {
        Some(first) if is_name_start(first) => bytes.all(is_name_continue),
        _ => false,
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_name_continue(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit()
}
