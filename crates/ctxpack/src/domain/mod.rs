//! Domain types shared by the pipeline stages and collaborators.

pub mod errors;
pub mod model;
