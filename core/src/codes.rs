//! Ticket code generation.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Produces ticket codes. Uniqueness is enforced by the order store; a collision makes
/// the reservation retry with fresh codes.
pub trait CodeGenerator: Send + Sync {
    /// A new candidate code.
    fn generate(&self) -> String;
}

/// Random `TKT-XXXXXXXXXXXX` codes.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    /// Default number of random characters.
    pub const DEFAULT_LENGTH: usize = 12;

    /// Creates a generator producing `length` random characters.
    #[must_use]
    pub const fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(|byte| char::from(byte).to_ascii_uppercase())
            .collect();
        format!("TKT-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_have_prefix_and_length() {
        let code = RandomCodeGenerator::default().generate();
        assert!(code.starts_with("TKT-"));
        assert_eq!(code.len(), 4 + RandomCodeGenerator::DEFAULT_LENGTH);
    }

    #[test]
    fn codes_are_distinct() {
        let generator = RandomCodeGenerator::default();
        let codes: HashSet<String> = (0..1_000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 1_000);
    }
}
