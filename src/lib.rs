//! Beta diversity square heatmaps rendered as SVG from a sample distance
//! matrix. The binary in `main.rs` is a thin CLI over this library.

pub mod error;
pub mod inputs;
pub mod matrix;
pub mod squares;
pub mod svg;

pub use error::{Error, Result};
pub use matrix::{DistanceMatrix, Distances};
pub use squares::{
    render, render_matrix, Diagnostics, LogDiagnostics, NormalizationRange, RangeMethod,
    RenderOptions, SampleOrder,
};
pub use svg::{Attributes, SvgWriter};
