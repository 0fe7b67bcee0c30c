//! Core domain models for provisioning
//!
//! This module defines the step contract, the pipeline that orders steps,
//! the run record, and the static configuration they consume.

pub mod config;
pub mod descriptor;
pub mod pipeline;
pub mod state;
pub mod step;

pub use descriptor::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
