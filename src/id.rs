use blake3::Hasher;
use rand::RngCore;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of base62 digits in a code (~47 bits of the fingerprint).
pub const CODE_LEN: usize = 8;

/// Fixed-width base62 of the low digits of `n`.
pub fn base62(mut n: u64, len: usize) -> String {
    let mut out = vec![ALPHABET[0]; len];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(n % 62) as usize];
        n /= 62;
    }
    // alphabet is ASCII
    out.into_iter().map(char::from).collect()
}

/// 64-bit fingerprint of `content || salt`.
pub fn fingerprint(content: &[u8], salt: Option<&[u8]>) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(content);
    if let Some(salt) = salt {
        hasher.update(salt);
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Derive a code. Deterministic for identical `(content, salt)`.
pub fn generate(content: &[u8], salt: Option<&[u8]>) -> String {
    base62(fingerprint(content, salt), CODE_LEN)
}

/// Salt for the n-th deterministic lead-URL attempt. The first attempt is
/// unsalted so that resubmitting the same URL lands on the same code; later
/// attempts are scoped to the owner so different owners of one URL do not
/// compete for the same slots.
pub fn link_salt(owner: Option<&str>, attempt: u32) -> Option<Vec<u8>> {
    if attempt == 0 {
        return None;
    }
    let mut salt = owner.unwrap_or_default().as_bytes().to_vec();
    salt.push(0);
    salt.extend_from_slice(&attempt.to_be_bytes());
    Some(salt)
}

/// Fresh random nonce. Media codes always use one; lead URLs fall back to
/// one once their deterministic slots are used up.
pub fn random_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
