//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step and is pure:
//! no I/O, no shared state. Stages hand their output to the next one wrapped
//! in [`Staged`], so diagnostics accumulate in pipeline order.
//!
//! ## Data Flow
//!
//! ```text
//! raw ──▶ sanitize ──▶ locate ──▶ parse ──▶ normalize ──▶ categorize
//! (text)   (fences)    (span)   (layers)    (schema)      (taxonomy)
//! ```
//!
//! 1. [`sanitize`]: strip fences, BOMs and line-ending noise; never fails
//! 2. [`locate`]: find the outermost JSON value with a string-aware scan
//! 3. [`parse`]: strict, then [`repair`]ed, then heuristic recovery
//! 4. [`normalize`]: map field aliases, coerce values, drop bad items
//! 5. [`categorize`]: assign every item exactly one taxonomy category

pub mod categorize;
pub mod locate;
pub mod normalize;
pub mod parse;
pub mod repair;
pub mod sanitize;

use crate::output::Diagnostic;

/// A stage output plus the diagnostics the stage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Staged<T> {
    pub fn new(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    /// Move the diagnostics onto `sink` and return the value.
    pub fn merge_into(mut self, sink: &mut Vec<Diagnostic>) -> T {
        sink.append(&mut self.diagnostics);
        self.value
    }
}
