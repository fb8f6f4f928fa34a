//! Foundation module
//!
//! Small building blocks shared by the collision layers: rigid transforms
//! over nalgebra, an index-stable free list and logging setup.

pub mod math;
pub mod collections;
pub mod logging;
