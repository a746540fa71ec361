use crate::types::AccessToken;
use rand::RngCore;
use rand::rngs::OsRng;

const TOKEN_BYTES: usize = 16;

/// Source of group join tokens.
pub trait TokenGenerator: Send + Sync {
    /// Returns a fresh, collision-resistant token.
    fn generate(&self) -> AccessToken;
}

/// 128-bit tokens from the OS RNG, hex-encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> AccessToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        AccessToken::from_string(hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_should_be_32_hex_chars() {
        let token = RandomTokenGenerator.generate();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|ch| matches!(ch, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn tokens_should_differ() {
        let a = RandomTokenGenerator.generate();
        let b = RandomTokenGenerator.generate();
        assert_ne!(a, b);
    }
}
