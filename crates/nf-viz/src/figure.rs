//! Three-panel checkpoint figure.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use image::{GenericImage, RgbImage};
use nalgebra::Vector3;
use plotters::coord::Shift;
use plotters::coord::ranged3d::Cartesian3d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::{VizError, VizResult};

const PANEL: u32 = 400;
const XY_LIMIT: f64 = 2.0;
const TITLE_FONT: (&str, u32) = ("sans-serif", 18);
const LABEL_FONT: (&str, u32) = ("sans-serif", 14);

const PURPLE: RGBColor = RGBColor(128, 0, 128);
const GRAY: RGBColor = RGBColor(160, 160, 160);

/// Color of the predicted x, y and z series in the time-series panel.
pub const PRED_COLORS: [RGBColor; 3] = [PURPLE, RED, BLUE];
pub const TRUTH_COLOR: RGBColor = GREEN;

static TEXTLESS_WARNING: Once = Once::new();

type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Unit directions of the learned field sampled on a grid.
#[derive(Clone, Debug, Default)]
pub struct QuiverField {
    pub points: Vec<Vector3<f64>>,
    pub directions: Vec<Vector3<f64>>,
}

impl QuiverField {
    /// `n^3` grid over x, y in [-2, 2] and z over `z_range`.
    pub fn grid(n: usize, z_range: (f64, f64)) -> Vec<Vector3<f64>> {
        let axis = |lo: f64, hi: f64, i: usize| {
            if n < 2 {
                lo
            } else {
                lo + (hi - lo) * i as f64 / (n - 1) as f64
            }
        };
        let mut pts = Vec::with_capacity(n * n * n);
        for iz in 0..n {
            for iy in 0..n {
                for ix in 0..n {
                    pts.push(Vector3::new(
                        axis(-XY_LIMIT, XY_LIMIT, ix),
                        axis(-XY_LIMIT, XY_LIMIT, iy),
                        axis(z_range.0, z_range.1, iz),
                    ));
                }
            }
        }
        pts
    }
}

/// Everything one checkpoint figure needs, already on the host.
#[derive(Clone, Debug)]
pub struct FigureData<'a> {
    pub times: &'a [f64],
    pub truth: &'a [Vector3<f64>],
    pub pred: &'a [Vector3<f64>],
    /// z extent of the phase and quiver panels (the trajectory's time span)
    pub z_range: (f64, f64),
    pub quiver: Option<&'a QuiverField>,
}

impl FigureData<'_> {
    fn validate(&self) -> VizResult<()> {
        if self.times.len() != self.truth.len() || self.times.len() != self.pred.len() {
            return Err(VizError::InvalidData {
                what: "times, truth and pred must have equal length",
            });
        }
        if let Some(q) = self.quiver {
            if q.points.len() != q.directions.len() {
                return Err(VizError::InvalidData {
                    what: "quiver points and directions must have equal length",
                });
            }
        }
        Ok(())
    }

    fn time_span(&self) -> (f64, f64) {
        let t0 = self.times.first().copied().unwrap_or(0.0);
        let t1 = self.times.last().copied().unwrap_or(1.0);
        non_degenerate(t0, t1)
    }
}

#[derive(Clone, Copy)]
enum Panel<'a> {
    Trajectories,
    PhasePortrait,
    VectorField(&'a QuiverField),
}

/// Render the figure into one `1200 x 400` image.
///
/// Panels draw in parallel into separate buffers. Without a quiver field the
/// third panel stays blank.
pub fn render_figure(data: &FigureData<'_>) -> VizResult<RgbImage> {
    data.validate()?;

    let ((traj, phase), quiver) = rayon::join(
        || {
            rayon::join(
                || render_panel(Panel::Trajectories, data),
                || render_panel(Panel::PhasePortrait, data),
            )
        },
        || data.quiver.map(|q| render_panel(Panel::VectorField(q), data)),
    );

    let mut out = RgbImage::from_pixel(3 * PANEL, PANEL, image::Rgb([255, 255, 255]));
    out.copy_from(&traj?, 0, 0)?;
    out.copy_from(&phase?, PANEL, 0)?;
    if let Some(q) = quiver {
        out.copy_from(&q?, 2 * PANEL, 0)?;
    }
    Ok(out)
}

fn render_panel(panel: Panel<'_>, data: &FigureData<'_>) -> VizResult<RgbImage> {
    let mut buf = vec![255u8; (PANEL * PANEL * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (PANEL, PANEL)).into_drawing_area();
        // text needs a system font; fall back to an unlabeled panel without one
        if let Err(e) = draw_panel(&root, panel, data, true) {
            TEXTLESS_WARNING.call_once(|| {
                tracing::warn!(error = %e, "labeled figure failed, drawing without text");
            });
            draw_panel(&root, panel, data, false).map_err(plot_err)?;
        }
        root.present().map_err(plot_err)?;
    }
    RgbImage::from_raw(PANEL, PANEL, buf).ok_or_else(|| VizError::Plot("panel buffer size".into()))
}

fn plot_err(e: impl std::fmt::Display) -> VizError {
    VizError::Plot(e.to_string())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: Panel<'_>,
    data: &FigureData<'_>,
    text: bool,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    match panel {
        Panel::Trajectories => trajectories(area, data, text),
        Panel::PhasePortrait => phase_portrait(area, data, text),
        Panel::VectorField(field) => vector_field(area, field, data.z_range, text),
    }
}

fn trajectories<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    data: &FigureData<'_>,
    text: bool,
) -> DrawResult<DB> {
    let (t0, t1) = data.time_span();

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if text {
        builder
            .caption("Trajectories", TITLE_FONT)
            .x_label_area_size(32)
            .y_label_area_size(40);
    }
    let mut chart = builder.build_cartesian_2d(t0..t1, -XY_LIMIT..XY_LIMIT)?;

    if text {
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("t")
            .y_desc("x,y,z")
            .label_style(LABEL_FONT)
            .draw()?;
    } else {
        chart.draw_series(std::iter::once(Rectangle::new(
            [(t0, -XY_LIMIT), (t1, XY_LIMIT)],
            GRAY.stroke_width(1),
        )))?;
    }

    let series = |states: &[Vector3<f64>], axis: usize| -> Vec<(f64, f64)> {
        data.times.iter().zip(states).map(|(&t, y)| (t, y[axis])).collect()
    };

    for axis in 0..3 {
        let runs = clip_runs(&series(data.truth, axis), -XY_LIMIT, XY_LIMIT);
        chart.draw_series(
            runs.into_iter()
                .map(|run| PathElement::new(run, TRUTH_COLOR.stroke_width(1))),
        )?;
    }

    let dash = dash_len(data.times.len());
    for (axis, (color, name)) in PRED_COLORS.into_iter().zip(["x", "y", "z"]).enumerate() {
        let runs = clip_runs(&series(data.pred, axis), -XY_LIMIT, XY_LIMIT);
        let anno = chart.draw_series(
            runs.iter()
                .flat_map(|run| dashes(run, dash))
                .map(|d| PathElement::new(d, color.stroke_width(1))),
        )?;
        if text {
            anno.label(name).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(1))
            });
        }
    }

    if text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font(LABEL_FONT)
            .background_style(WHITE.mix(0.8).filled())
            .border_style(GRAY.stroke_width(1))
            .draw()?;
    }
    Ok(())
}

/// Plot coordinates are `(x, z, y)`: plotters draws its second axis upward,
/// and the phase portrait puts the data's z (time-like) axis vertical.
fn to_plot(p: &Vector3<f64>) -> (f64, f64, f64) {
    (p.x, p.z, p.y)
}

fn cube_chart<'a, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, Shift>,
    title: &str,
    z_range: (f64, f64),
    text: bool,
) -> Result<
    ChartContext<'a, DB, Cartesian3d<RangedCoordf64, RangedCoordf64, RangedCoordf64>>,
    DrawingAreaErrorKind<DB::ErrorType>,
> {
    let (z0, z1) = non_degenerate(z_range.0, z_range.1);

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if text {
        builder.caption(title, TITLE_FONT);
    }
    let mut chart =
        builder.build_cartesian_3d(-XY_LIMIT..XY_LIMIT, z0..z1, -XY_LIMIT..XY_LIMIT)?;
    chart.with_projection(|mut pb| {
        pb.yaw = 0.6;
        pb.pitch = 0.35;
        pb.scale = 0.8;
        pb.into_matrix()
    });

    if text {
        chart
            .configure_axes()
            .light_grid_style(BLACK.mix(0.1).stroke_width(1))
            .max_light_lines(3)
            .label_style(LABEL_FONT)
            .draw()?;
        let names = [
            ("x", (XY_LIMIT * 1.15, z0, -XY_LIMIT)),
            ("y", (-XY_LIMIT, z0, XY_LIMIT * 1.15)),
            ("z", (-XY_LIMIT, z1 + 0.08 * (z1 - z0), -XY_LIMIT)),
        ];
        chart.draw_series(
            names
                .into_iter()
                .map(|(name, at)| Text::new(name, at, LABEL_FONT)),
        )?;
    } else {
        let (lo, hi) = (
            Vector3::new(-XY_LIMIT, -XY_LIMIT, z0),
            Vector3::new(XY_LIMIT, XY_LIMIT, z1),
        );
        chart.draw_series(
            cube_edges(lo, hi)
                .map(|(a, b)| PathElement::new(vec![to_plot(&a), to_plot(&b)], GRAY.stroke_width(1))),
        )?;
    }
    Ok(chart)
}

fn phase_portrait<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    data: &FigureData<'_>,
    text: bool,
) -> DrawResult<DB> {
    let mut chart = cube_chart(area, "Phase Portrait", data.z_range, text)?;

    chart.draw_series(LineSeries::new(
        data.truth.iter().map(to_plot),
        TRUTH_COLOR.stroke_width(1),
    ))?;

    let pred: Vec<_> = data.pred.iter().map(to_plot).collect();
    chart.draw_series(
        dashes(&pred, dash_len(pred.len())).map(|d| PathElement::new(d, BLUE.stroke_width(1))),
    )?;
    Ok(())
}

fn vector_field<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    field: &QuiverField,
    z_range: (f64, f64),
    text: bool,
) -> DrawResult<DB> {
    // arrow length as a fraction of the box diagonal in normalized units
    const ARROW: f64 = 0.06;

    let mut chart = cube_chart(area, "Learned Vector Field", z_range, text)?;
    let (z0, z1) = non_degenerate(z_range.0, z_range.1);
    let half_span = Vector3::new(XY_LIMIT, XY_LIMIT, (z1 - z0).abs() / 2.0);

    let arrows = field.points.iter().zip(&field.directions).filter_map(|(p, d)| {
        // direction in box-normalized units, rescaled to a fixed length
        let dn = d.component_div(&half_span);
        let norm = dn.norm();
        if !norm.is_finite() || norm == 0.0 {
            return None;
        }
        let tip = p + (dn * (ARROW / norm)).component_mul(&half_span);
        Some(PathElement::new(
            vec![to_plot(p), to_plot(&tip)],
            BLACK.stroke_width(1),
        ))
    });
    chart.draw_series(arrows)?;
    Ok(())
}

/// Widen an empty range so plotters gets a usable axis.
fn non_degenerate(lo: f64, hi: f64) -> (f64, f64) {
    if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) }
}

/// Split a polyline into runs that stay within `lo..=hi` on the second
/// coordinate. Segments crossing the band are cut at the boundary; non-finite
/// samples break the line.
pub fn clip_runs(points: &[(f64, f64)], lo: f64, hi: f64) -> Vec<Vec<(f64, f64)>> {
    fn flush(run: &mut Vec<(f64, f64)>, runs: &mut Vec<Vec<(f64, f64)>>) {
        if run.len() >= 2 {
            runs.push(std::mem::take(run));
        } else {
            run.clear();
        }
    }

    let mut runs = Vec::new();
    let mut run = Vec::new();
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            flush(&mut run, &mut runs);
            continue;
        }

        let dy = y1 - y0;
        let (mut s0, mut s1) = (0.0_f64, 1.0_f64);
        if dy == 0.0 {
            if !(lo..=hi).contains(&y0) {
                flush(&mut run, &mut runs);
                continue;
            }
        } else {
            let (a, b) = ((lo - y0) / dy, (hi - y0) / dy);
            s0 = s0.max(a.min(b));
            s1 = s1.min(a.max(b));
            if s0 > s1 {
                flush(&mut run, &mut runs);
                continue;
            }
        }

        let at = |s: f64| {
            if s <= 0.0 {
                (x0, y0)
            } else if s >= 1.0 {
                (x1, y1)
            } else {
                (x0 + (x1 - x0) * s, (y0 + dy * s).clamp(lo, hi))
            }
        };
        let (start, end) = (at(s0), at(s1));
        if run.last() != Some(&start) {
            flush(&mut run, &mut runs);
            run.push(start);
        }
        run.push(end);
        if s1 < 1.0 {
            flush(&mut run, &mut runs);
        }
    }
    flush(&mut run, &mut runs);
    runs
}

/// Roughly thirty dashes across a full series.
fn dash_len(samples: usize) -> usize {
    (samples / 60).max(1)
}

/// Every other stretch of `len` segments of `run`.
fn dashes<C: Copy>(run: &[C], len: usize) -> impl Iterator<Item = Vec<C>> + '_ {
    (0..run.len())
        .step_by(2 * len)
        .map(move |s| run[s..(s + len + 1).min(run.len())].to_vec())
        .filter(|d| d.len() >= 2)
}

fn cube_edges(
    lo: Vector3<f64>,
    hi: Vector3<f64>,
) -> impl Iterator<Item = (Vector3<f64>, Vector3<f64>)> {
    let corner = move |i: usize| {
        Vector3::new(
            if i & 1 == 0 { lo.x } else { hi.x },
            if i & 2 == 0 { lo.y } else { hi.y },
            if i & 4 == 0 { lo.z } else { hi.z },
        )
    };
    // corners differing in exactly one bit share an edge
    (0..8usize)
        .flat_map(|i| [1usize, 2, 4].map(|bit| (i, i | bit)))
        .filter(|(i, j)| i != j)
        .map(move |(i, j)| (corner(i), corner(j)))
}

/// Writes sequentially numbered figures (`000.png`, `001.png`, ...).
///
/// The output directory is created on the first write, so a run that never
/// reaches a checkpoint leaves nothing behind.
#[derive(Debug)]
pub struct FigureRenderer {
    out_dir: PathBuf,
    next_index: usize,
}

impl FigureRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            next_index: 0,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Number of figures written so far.
    pub fn count(&self) -> usize {
        self.next_index
    }

    pub fn render(&mut self, data: &FigureData<'_>) -> VizResult<PathBuf> {
        let img = render_figure(data)?;
        if !self.out_dir.exists() {
            fs::create_dir_all(&self.out_dir)?;
        }
        let path = self.out_dir.join(format!("{:03}.png", self.next_index));
        img.save(&path)?;
        self.next_index += 1;
        tracing::debug!(path = %path.display(), "wrote figure");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_series_is_one_run() {
        let pts = [(0.0, 0.0), (1.0, 1.0), (2.0, -1.5)];
        assert_eq!(clip_runs(&pts, -2.0, 2.0), vec![pts.to_vec()]);
    }

    #[test]
    fn crossing_segment_is_cut_at_the_limit() {
        let runs = clip_runs(&[(0.0, 0.0), (1.0, 4.0), (2.0, 0.0)], -2.0, 2.0);
        assert_eq!(runs, vec![vec![(0.0, 0.0), (0.5, 2.0)], vec![(1.5, 2.0), (2.0, 0.0)]]);
    }

    #[test]
    fn series_outside_band_draws_nothing() {
        let pts: Vec<_> = (0..10).map(|i| (i as f64, 10.0 - i as f64 * 0.5)).collect();
        assert!(clip_runs(&pts, -2.0, 2.0).is_empty());
    }

    #[test]
    fn non_finite_sample_breaks_the_line() {
        let runs = clip_runs(
            &[(0.0, 0.0), (1.0, 0.5), (2.0, f64::NAN), (3.0, 0.0), (4.0, 0.1)],
            -2.0,
            2.0,
        );
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().flatten().all(|p| p.1.is_finite()));
    }

    #[test]
    fn dashes_alternate() {
        let run: Vec<usize> = (0..10).collect();
        let d: Vec<_> = dashes(&run, 2).collect();
        assert_eq!(d, vec![vec![0, 1, 2], vec![4, 5, 6], vec![8, 9]]);
    }

    #[test]
    fn cube_has_twelve_edges() {
        let edges: Vec<_> = cube_edges(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)).collect();
        assert_eq!(edges.len(), 12);
        assert!(edges.iter().all(|(a, b)| ((a - b).norm() - 1.0).abs() < 1e-12));
    }
}
