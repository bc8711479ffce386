use image::RgbImage;
use nalgebra::Vector3;
use nf_viz::{FigureData, FigureRenderer, PRED_COLORS, QuiverField, TRUTH_COLOR, render_figure};

fn spiral(n: usize) -> (Vec<f64>, Vec<Vector3<f64>>) {
    let times = (0..n)
        .map(|i| -2.0 + 4.0 * i as f64 / (n - 1) as f64)
        .collect::<Vec<_>>();
    let states = times
        .iter()
        .map(|&t| {
            Vector3::new(
                (std::f64::consts::PI * t).sin(),
                (std::f64::consts::PI * t).cos(),
                t,
            )
        })
        .collect();
    (times, states)
}

fn count_in_panel(img: &RgbImage, panel: u32, pred: impl Fn([u8; 3]) -> bool) -> usize {
    (panel * 400..(panel + 1) * 400)
        .flat_map(|x| (0..400).map(move |y| (x, y)))
        .filter(|&(x, y)| pred(img.get_pixel(x, y).0))
        .count()
}

fn rgb(c: plotters::style::RGBColor) -> [u8; 3] {
    [c.0, c.1, c.2]
}

#[test]
fn figure_has_three_charted_panels() {
    let (times, truth) = spiral(50);
    let pred: Vec<_> = truth.iter().map(|p| p * 0.9).collect();
    let points = QuiverField::grid(5, (-2.0, 2.0));
    let directions = points.iter().map(|p| Vector3::new(-p.y, p.x, 1.0)).collect();
    let quiver = QuiverField { points, directions };

    let img = render_figure(&FigureData {
        times: &times,
        truth: &truth,
        pred: &pred,
        z_range: (-2.0, 2.0),
        quiver: Some(&quiver),
    })
    .unwrap();
    assert_eq!(img.dimensions(), (1200, 400));

    for panel in 0..3u32 {
        let inked = count_in_panel(&img, panel, |p| p != [255, 255, 255]);
        assert!(inked > 100, "panel {panel} nearly empty: {inked}");
    }

    // truth in green in both data panels, every predicted axis in its own color
    let truth = rgb(TRUTH_COLOR);
    assert!(count_in_panel(&img, 0, |p| p == truth) > 0);
    assert!(count_in_panel(&img, 1, |p| p == truth) > 0);
    for color in PRED_COLORS {
        let c = rgb(color);
        assert!(count_in_panel(&img, 0, |p| p == c) > 0, "missing {c:?}");
    }
}

#[test]
fn vector_field_panel_is_blank_without_quiver() {
    let (times, truth) = spiral(30);
    let img = render_figure(&FigureData {
        times: &times,
        truth: &truth,
        pred: &truth,
        z_range: (-2.0, 2.0),
        quiver: None,
    })
    .unwrap();
    assert_eq!(count_in_panel(&img, 2, |p| p != [255, 255, 255]), 0);
}

#[test]
fn time_series_is_clipped_to_the_plot_band() {
    let (times, _) = spiral(40);
    // every axis far above the +-2 band
    let truth = vec![Vector3::new(5.0, 6.0, 7.0); times.len()];
    let img = render_figure(&FigureData {
        times: &times,
        truth: &truth,
        pred: &truth,
        z_range: (-10.0, 10.0),
        quiver: None,
    })
    .unwrap();
    let green = rgb(TRUTH_COLOR);
    assert_eq!(count_in_panel(&img, 0, |p| p == green), 0);
}

#[test]
fn renderer_numbers_files_and_creates_dir_lazily() {
    let dir = std::env::temp_dir().join("nf_viz_render_smoke");
    let _ = std::fs::remove_dir_all(&dir);

    let mut renderer = FigureRenderer::new(&dir);
    assert!(!dir.exists());

    let (times, truth) = spiral(20);
    let data = FigureData {
        times: &times,
        truth: &truth,
        pred: &truth,
        z_range: (-2.0, 2.0),
        quiver: None,
    };
    let first = renderer.render(&data).unwrap();
    let second = renderer.render(&data).unwrap();
    assert_eq!(first, dir.join("000.png"));
    assert_eq!(second, dir.join("001.png"));
    assert!(second.exists());
    assert_eq!(renderer.count(), 2);

    let decoded = image::open(&first).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1200, 400));
}

#[test]
fn mismatched_lengths_are_rejected() {
    let (times, truth) = spiral(10);
    let result = render_figure(&FigureData {
        times: &times,
        truth: &truth,
        pred: &truth[..5],
        z_range: (-2.0, 2.0),
        quiver: None,
    });
    assert!(result.is_err());
}
