//! # CLI Module
//!
//! Thin command-line surface over [`crate::pipeline::Generator`].
//!
//! ## Commands
//!
//! ### `create-module`
//!
//! ```bash
//! modforge create-module orders --type CORE --domain commerce
//! modforge create-module user-api --type SUPPORTING --domain identity \
//!     --pattern web_api --output services --json
//! ```
//!
//! ### `generate` / `wave`
//!
//! One request file, or a list of them run on the worker pool:
//!
//! ```bash
//! modforge generate --request orders.yaml --output services --policy merge
//! modforge wave --requests wave.yaml --output services --workers 8
//! ```
//!
//! ### `check`
//!
//! Re-run the quality gate over an existing module root:
//!
//! ```bash
//! modforge check services/orders --request orders.yaml
//! ```
//!
//! ### `patterns`
//!
//! ```bash
//! modforge patterns --json
//! modforge --patterns patterns.yaml patterns --watch
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | `0`  | success                                              |
//! | `1`  | validation or registry error, nothing written        |
//! | `2`  | generation or quality failure                        |
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use modforge::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! let code = run_cli(Cli::parse())?;
//! std::process::exit(code);
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
