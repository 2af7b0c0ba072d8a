//! Secret handling re-exports, so binaries need not depend on secrecy
//! directly.

pub use secrecy::{ExposeSecret, SecretString};
