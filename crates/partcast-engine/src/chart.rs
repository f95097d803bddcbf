//! Survival chart rendering
//!
//! One PNG per group, drawn directly into an RGB buffer:
//!
//! ```text
//!  S(t)
//!  1.0 ┤▔▔▔▔▔▔▔╲___           ┆
//!      │  ░░░░░░░░▔▔╲___       ┆   ─ Kaplan-Meier step curve + band
//!      │        ░░░░░░░▔▔╲__   ┆   ─ Weibull curve + band
//!      │                       ┆   ┆ reliable horizon
//!  y₀  ┼────┬────┬────┬────┬───┴──
//!      0    6    12   18   24     months
//! ```
//!
//! The y axis starts at the lowest band value rounded down to a tenth so that
//! small failure probabilities stay visible.

use std::{
    io,
    path::{Path, PathBuf},
};

use image::{ImageError, ImageFormat, Rgb, RgbImage};
use uuid::Uuid;

use crate::estimator::BandedCurve;

pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 540;

const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 24.0;
const MARGIN_BOTTOM: f64 = 48.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRIDLINE: Rgb<u8> = Rgb([225, 225, 225]);
pub const KM_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
pub const WEIBULL_COLOR: Rgb<u8> = Rgb([214, 39, 40]);
pub const HORIZON_COLOR: Rgb<u8> = Rgb([44, 160, 44]);
const BAND_ALPHA: f64 = 0.2;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ChartError {
    #[display("failed to create chart directory {}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[display("failed to write chart {}", path.display())]
    Write { path: PathBuf, source: ImageError },
}

/// Curves of one group, all sampled on the same month grid.
#[derive(Debug, Clone, Copy)]
pub struct ChartData<'a> {
    pub months: &'a [u32],
    pub km: &'a BandedCurve,
    pub weibull: &'a BandedCurve,
    pub reliable_month: u32,
}

/// A written chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartArtifact {
    pub path: PathBuf,
    /// File name relative to the chart directory.
    pub reference: String,
}

/// Renders `data` and writes it as `<dir>/<uuid>.png`, creating `dir` if needed.
pub fn write_chart(dir: &Path, data: &ChartData<'_>) -> Result<ChartArtifact, ChartError> {
    std::fs::create_dir_all(dir).map_err(|source| ChartError::CreateDir {
        path: dir.to_owned(),
        source,
    })?;
    let reference = format!("{}.png", Uuid::new_v4());
    let path = dir.join(&reference);
    render(data)
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|source| ChartError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(ChartArtifact { path, reference })
}

/// Renders the chart into an image buffer.
#[must_use]
pub fn render(data: &ChartData<'_>) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    let months = data.months.iter().map(|&m| f64::from(m)).collect::<Vec<_>>();
    let frame = Frame::new(
        months.last().copied().unwrap_or(0.0),
        data.km.floor().min(data.weibull.floor()),
    );

    frame.draw_grid(&mut img);
    let mut canvas = Canvas {
        img: &mut img,
        frame: &frame,
    };
    canvas.fill_band(&months, data.km, KM_COLOR, true);
    canvas.fill_band(&months, data.weibull, WEIBULL_COLOR, false);

    let km_points = step_points(&months, &data.km.survival);
    canvas.polyline(&km_points, KM_COLOR);
    let weibull_points = months
        .iter()
        .zip(&data.weibull.survival)
        .map(|(&m, &s)| (m, s))
        .collect::<Vec<_>>();
    canvas.polyline(&weibull_points, WEIBULL_COLOR);
    canvas.dashed_vertical(f64::from(data.reliable_month), HORIZON_COLOR);

    frame.draw_axes(&mut img);
    img
}

fn step_points(months: &[f64], survival: &[f64]) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(survival.len() * 2);
    for (i, (&m, &s)) in months.iter().zip(survival).enumerate() {
        if i > 0 {
            points.push((m, survival[i - 1]));
        }
        points.push((m, s));
    }
    points
}

/// Plot area and data ranges.
struct Frame {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    max_month: f64,
    y_min: f64,
}

impl Frame {
    fn new(max_month: f64, lowest: f64) -> Self {
        let y_min = ((lowest.clamp(0.0, 1.0) * 10.0).floor() / 10.0).min(0.9);
        Self {
            left: MARGIN_LEFT,
            right: f64::from(WIDTH) - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: f64::from(HEIGHT) - MARGIN_BOTTOM,
            max_month: max_month.max(1.0),
            y_min,
        }
    }

    fn x(&self, month: f64) -> f64 {
        self.left + month / self.max_month * (self.right - self.left)
    }

    fn month(&self, x: f64) -> f64 {
        (x - self.left) / (self.right - self.left) * self.max_month
    }

    fn y(&self, survival: f64) -> f64 {
        let s = survival.clamp(self.y_min, 1.0);
        self.bottom - (s - self.y_min) / (1.0 - self.y_min) * (self.bottom - self.top)
    }

    fn draw_grid(&self, img: &mut RgbImage) {
        let mut month = 0.0;
        while month <= self.max_month {
            let x = self.x(month);
            vline(img, x, self.top, self.bottom, GRIDLINE);
            month += 6.0;
        }
        let mut tenth = (self.y_min * 10.0).round();
        while tenth <= 10.0 {
            let y = self.y(tenth / 10.0);
            hline(img, self.left, self.right, y, GRIDLINE);
            tenth += 1.0;
        }
    }

    fn draw_axes(&self, img: &mut RgbImage) {
        hline(img, self.left, self.right, self.bottom, AXIS);
        vline(img, self.left, self.top, self.bottom, AXIS);
        let mut month = 0.0;
        while month <= self.max_month {
            vline(img, self.x(month), self.bottom, self.bottom + 6.0, AXIS);
            month += 6.0;
        }
        let mut tenth = (self.y_min * 10.0).round();
        while tenth <= 10.0 {
            hline(img, self.left - 6.0, self.left, self.y(tenth / 10.0), AXIS);
            tenth += 1.0;
        }
    }
}

struct Canvas<'a> {
    img: &'a mut RgbImage,
    frame: &'a Frame,
}

impl Canvas<'_> {
    /// Shades the band between `lower` and `upper` column by column.
    ///
    /// Step bands hold each grid value until the next grid month.
    fn fill_band(&mut self, months: &[f64], curve: &BandedCurve, color: Rgb<u8>, step: bool) {
        let (Some(&first), Some(&last)) = (months.first(), months.last()) else {
            return;
        };
        let n = months.len().min(curve.len());
        if n == 0 {
            return;
        }
        let mut x = self.frame.x(first).round();
        let x_end = self.frame.x(last).round();
        while x <= x_end {
            let m = self.frame.month(x);
            let i = months[..n].partition_point(|&v| v <= m).saturating_sub(1);
            let j = (i + 1).min(n - 1);
            let (lo, hi) = if step || j == i {
                (curve.lower[i], curve.upper[i])
            } else {
                let t = ((m - months[i]) / (months[j] - months[i])).clamp(0.0, 1.0);
                (
                    lerp(curve.lower[i], curve.lower[j], t),
                    lerp(curve.upper[i], curve.upper[j], t),
                )
            };
            let mut y = self.frame.y(hi).round();
            let y_end = self.frame.y(lo).round();
            while y <= y_end {
                blend(self.img, x, y, color, BAND_ALPHA);
                y += 1.0;
            }
            x += 1.0;
        }
    }

    fn polyline(&mut self, points: &[(f64, f64)], color: Rgb<u8>) {
        for pair in points.windows(2) {
            let (m0, s0) = pair[0];
            let (m1, s1) = pair[1];
            self.segment(
                (self.frame.x(m0), self.frame.y(s0)),
                (self.frame.x(m1), self.frame.y(s1)),
                color,
            );
        }
    }

    fn segment(&mut self, (x0, y0): (f64, f64), (x1, y1): (f64, f64), color: Rgb<u8>) {
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0);
        let mut k = 0.0;
        while k <= steps {
            let t = k / steps;
            let (x, y) = (lerp(x0, x1, t), lerp(y0, y1, t));
            for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
                blend(self.img, x.round() + dx, y.round() + dy, color, 1.0);
            }
            k += 1.0;
        }
    }

    fn dashed_vertical(&mut self, month: f64, color: Rgb<u8>) {
        let x = self.frame.x(month.min(self.frame.max_month)).round();
        let mut y = self.frame.top;
        while y <= self.frame.bottom {
            // 8px on, 6px off
            if (y - self.frame.top) % 14.0 < 8.0 {
                blend(self.img, x, y, color, 1.0);
                blend(self.img, x + 1.0, y, color, 1.0);
            }
            y += 1.0;
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn hline(img: &mut RgbImage, x0: f64, x1: f64, y: f64, color: Rgb<u8>) {
    let mut x = x0.round();
    while x <= x1.round() {
        blend(img, x, y.round(), color, 1.0);
        x += 1.0;
    }
}

fn vline(img: &mut RgbImage, x: f64, y0: f64, y1: f64, color: Rgb<u8>) {
    let mut y = y0.round();
    while y <= y1.round() {
        blend(img, x.round(), y, color, 1.0);
        y += 1.0;
    }
}

/// Mixes `color` into the pixel at `(x, y)`; pixels outside the image are ignored.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(img: &mut RgbImage, x: f64, y: f64, color: Rgb<u8>, alpha: f64) {
    if !(x >= 0.0 && y >= 0.0 && x < f64::from(img.width()) && y < f64::from(img.height())) {
        return;
    }
    let pixel = img.get_pixel_mut(x as u32, y as u32);
    for (dst, &src) in pixel.0.iter_mut().zip(&color.0) {
        *dst = lerp(f64::from(*dst), f64::from(src), alpha).round() as u8;
    }
}
