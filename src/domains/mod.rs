//! Business logic. The gateway exposes a single domain: tools.

pub mod tools;
