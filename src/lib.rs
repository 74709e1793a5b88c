//! Mustache templates for Rust.
//!
//! Logic-less templates with filters, dynamic names, template inheritance,
//! lambdas and pluggable loaders and caches.
//!
//! ```
//! use stache::{Engine, map};
//!
//! let engine = Engine::default();
//! let out = engine
//!     .render_value("Hello, {{ planet }}!", map! { "planet" => "World" })
//!     .unwrap();
//! assert_eq!(out, "Hello, World!");
//! ```
pub mod error;
pub mod tpl;
pub mod value;

pub use error::{Error, Result};
pub use tpl::{Engine, EngineOptions, Template};
pub use value::{Lambda, Object, Property, Value, to_value};
pub use stache_macros::template_assets;

#[doc(hidden)]
pub use indexmap;
