//! Per-instance hostname generation.

const SUFFIX_LEN: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `prefix` followed by eight random lowercase alphanumerics.
pub fn generate_hostname(prefix: &str) -> String {
    let mut hostname = String::with_capacity(prefix.len() + SUFFIX_LEN);
    hostname.push_str(prefix);
    for _ in 0..SUFFIX_LEN {
        hostname.push(ALPHABET[fastrand::usize(..ALPHABET.len())] as char);
    }
    hostname
}
