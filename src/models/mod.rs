//! # Models
//!
//! Dense linear-algebra backends and the timing-array posterior built on them.

pub mod matrix_ops;
pub mod pta;
