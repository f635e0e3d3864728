#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod bisect;
pub mod bundle;
pub mod config;
pub mod orchestrator;
pub mod range;
pub mod repro;
pub mod signal;
pub mod vcs;

pub use config::Configuration;
pub use error::{Error, Result};
pub use vcs::Vcs;
