//! # Module Requests
//!
//! Parsing and validation of module generation requests.
//!
//! A request arrives as JSON or YAML:
//!
//! ```yaml
//! name: user-api
//! type: CORE
//! domain: ecommerce
//! pattern: web_api
//! deployment_target: kubernetes   # optional, defaults to the pattern's first target
//! language: python                # optional, python or rust
//! extra_patterns: []              # optional secondary patterns
//! ```
//!
//! [`load_request`] / [`parse_request`] produce a raw [`ModuleSpec`];
//! [`validate`] checks it against a registry snapshot and yields a
//! [`ValidatedSpec`]. Validation never performs I/O, so an invalid request
//! cannot leave anything behind on disk.

mod load;
mod types;
mod validate;

pub use load::*;
pub use types::*;
pub use validate::{is_valid_name, validate};
