//! Scripted ticket codes.

use fairsale_core::codes::{CodeGenerator, RandomCodeGenerator};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out pre-set codes first, then falls back to random ones.
///
/// Used to force ticket code collisions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCodeGenerator {
    scripted: Arc<Mutex<VecDeque<String>>>,
    fallback: RandomCodeGenerator,
}

impl ScriptedCodeGenerator {
    /// Creates a generator that yields `codes` in order before going random.
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Arc::new(Mutex::new(codes.into_iter().map(Into::into).collect())),
            fallback: RandomCodeGenerator::default(),
        }
    }

    /// Scripted codes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn generate(&self) -> String {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.generate())
    }
}
