//! Core compute primitives.
//!
//! [`Vector`] is the flat storage behind every autograd tensor.

mod vector;

pub use vector::Vector;
