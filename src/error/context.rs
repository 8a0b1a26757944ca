//! Error context and chaining utilities
//!
//! Migrator calls wrap driver failures with the operation that was running
//! ("creating test_models", "dropping column name"). The facade keeps the
//! wrapped error in its result and logs the whole chain.

use super::Error;
use std::fmt;

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to the error
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>;

    /// Add context with lazy evaluation
    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

/// Extension trait for Option types
pub trait OptionExt<T> {
    /// Convert None to an invalid-input error
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>,
    {
        self.ok_or_else(|| Error::invalid_input(context))
    }
}

/// Helper for walking error chains
pub struct ErrorChain<'a> {
    error: &'a Error,
    chain: Vec<String>,
}

impl<'a> ErrorChain<'a> {
    pub fn new(error: &'a Error) -> Self {
        let mut chain = Vec::new();
        Self::build_chain(error, &mut chain);
        Self { error, chain }
    }

    fn build_chain(error: &Error, chain: &mut Vec<String>) {
        chain.push(error.to_string());

        if let Error::WithContext { source, .. } = error {
            Self::build_chain(source, chain);
        }
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn root_cause(&self) -> &Error {
        self.error.root_cause()
    }

    /// Format the error chain for logging
    pub fn format_for_log(&self) -> String {
        self.chain.join(" -> ")
    }
}

impl<'a> fmt::Display for ErrorChain<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_for_log())
    }
}
