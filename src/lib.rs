#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts in HTTP plumbing (status codes, body sizes)
#![allow(clippy::cast_possible_truncation)]
// Module structure — our modules use the foo::FooError pattern by design
#![allow(clippy::module_name_repetitions)]

pub mod abbrev;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod mcp;
pub mod registry;
pub mod spec;
pub mod synth;
pub mod toolid;
pub mod transport;
pub(crate) mod utils;

pub use errors::{BridgeError, BridgeResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVER_NAME: &str = "apibridge";
