//! Salted one-way hashing of room passwords.

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::value_object::PasswordHash;

const SALT_LEN: usize = 16;

/// Hash a password with a fresh random salt.
///
/// Returns `None` for an empty password: a private room never stores an
/// empty hash.
pub fn hash_password(password: &str) -> Option<PasswordHash> {
    if password.is_empty() {
        return None;
    }
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = to_hex(&salt_bytes);
    let digest = digest(&salt, password);
    PasswordHash::new(format!("{salt}${digest}")).ok()
}

/// Check a candidate password against a stored hash.
pub fn verify_password(hash: &PasswordHash, candidate: &str) -> bool {
    let computed = digest(hash.salt(), candidate);
    constant_time_eq(computed.as_bytes(), hash.digest().as_bytes())
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_never_stores_plaintext() {
        // テスト項目: ハッシュにはパスワードの平文が含まれない
        // given (前提条件):
        let password = "abcd";

        // when (操作):
        let hash = hash_password(password).unwrap();

        // then (期待する結果):
        assert!(!hash.as_str().contains(password));
        assert_eq!(hash.digest().len(), 64);
    }

    #[test]
    fn test_hash_password_rejects_empty() {
        // テスト項目: 空のパスワードからはハッシュが作られない
        // given (前提条件) / when (操作):
        let hash = hash_password("");

        // then (期待する結果):
        assert!(hash.is_none());
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        // テスト項目: 同じパスワードでもソルトが異なるためハッシュは一致しない
        // given (前提条件) / when (操作):
        let first = hash_password("abcd").unwrap();
        let second = hash_password("abcd").unwrap();

        // then (期待する結果):
        assert_ne!(first, second);
        assert!(verify_password(&first, "abcd"));
        assert!(verify_password(&second, "abcd"));
    }

    #[test]
    fn test_verify_password_rejects_wrong_candidate() {
        // テスト項目: 誤ったパスワードは検証に失敗する
        // given (前提条件):
        let hash = hash_password("abcd").unwrap();

        // when (操作) / then (期待する結果):
        assert!(!verify_password(&hash, "wrong"));
        assert!(!verify_password(&hash, ""));
        assert!(!verify_password(&hash, "abcd "));
    }
}
