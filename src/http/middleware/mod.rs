//! Pipeline stages owned by the HTTP layer.
//!
//! Admission and origin stages live in `crate::security`, traffic metering in
//! `crate::observability`; `crate::http::server` stacks them all.

pub mod recover;

pub use recover::PanicGuard;
