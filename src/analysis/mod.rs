//! Fringe-counting engine: noise estimate, delta choice, hysteresis
//! extrema detection and the PMD formula, composed by [`pipeline::Pipeline`].

pub mod delta;
pub mod extrema;
pub mod noise;
pub mod pipeline;
pub mod pmd;
pub mod smoothing;

pub use delta::{DeltaSelection, DeltaSelector, ScanRange};
pub use extrema::ExtremaDetector;
pub use pipeline::{Pipeline, PipelineOutput};
