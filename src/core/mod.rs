// Core modules: address parsing, name sanitization, and errors.
pub mod address;
pub mod error;
pub mod name;
