//! Error handling foundation shared by the Viki crates.
//!
//! Only the `Result` alias lives here. The store, policy, and orchestrator
//! crates each define their own error enums, return `Result<T, TheirError>`,
//! and wrap lower-layer reports with `Report::context` as failures move up
//! toward the caller.

use rootcause::Report;

/// A Result whose error is a rootcause `Report` carrying context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
