//! Checkpoint figures for nodefit.
//!
//! One PNG per evaluation with three side-by-side panels: the x/y/z time
//! series, a 3D phase portrait and (optionally) a quiver plot of the learned
//! field. Panels are charted with plotters in parallel and composited into
//! one image.

pub mod figure;

pub use figure::{FigureData, FigureRenderer, PRED_COLORS, QuiverField, TRUTH_COLOR, render_figure};

pub type VizResult<T> = Result<T, VizError>;

#[derive(thiserror::Error, Debug)]
pub enum VizError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Plot rendering failed: {0}")]
    Plot(String),

    #[error("Invalid figure data: {what}")]
    InvalidData { what: &'static str },
}
