// Core modules: format scanning, index building, persistence, reads, errors.
pub mod builder;
pub mod dtype;
pub mod error;
pub mod format;
pub mod index;
pub mod reader;
pub mod scanner;
pub mod skip;

#[cfg(test)]
pub(crate) mod fixture;
