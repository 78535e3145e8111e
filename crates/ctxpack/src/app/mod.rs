//! Application layer: the materialize → pack pipeline and its collaborators.

pub mod materialize;
pub mod optimize;
pub mod pack_config;
pub mod packager;
pub mod pipeline;
pub mod scan;
