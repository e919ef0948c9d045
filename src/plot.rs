//! Scatter plot of station series.
//!
//! Time runs along the x axis and values along the y axis, one colour per
//! station in sorted station order. Text (title, tick labels, legend) needs
//! a TrueType font; without one only the geometry is drawn.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::config::PlotConfig;
use crate::error::{NmdbError, Result};
use crate::report::StationGrid;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FOREGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// Same cycle as matplotlib's default.
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

const X_TICKS: usize = 6;
const Y_TICKS: usize = 5;

pub fn station_colour(index: usize) -> Rgb<u8> {
    PALETTE[index % PALETTE.len()]
}

/// Load a TrueType font for plot text.
pub fn load_font(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path).map_err(|e| {
        NmdbError::config(format!("Couldn't read font {}: {}", path.display(), e))
    })?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| NmdbError::config(format!("Not a usable TrueType font: {}", path.display())))
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Linear map from data coordinates onto a pixel span.
#[derive(Debug, Clone, Copy)]
struct Axis {
    min: f64,
    max: f64,
    from_px: f64,
    to_px: f64,
}

impl Axis {
    /// Degenerate ranges are widened so every point still lands inside.
    fn new(min: f64, max: f64, pad: f64, from_px: f64, to_px: f64) -> Axis {
        let (min, max) = if max > min {
            let margin = (max - min) * pad;
            (min - margin, max + margin)
        } else {
            (min - 1.0, max + 1.0)
        };
        Axis { min, max, from_px, to_px }
    }

    fn map(&self, value: f64) -> f32 {
        let fraction = (value - self.min) / (self.max - self.min);
        (self.from_px + fraction * (self.to_px - self.from_px)) as f32
    }

    fn ticks(&self, count: usize) -> impl Iterator<Item = f64> + '_ {
        let step = (self.max - self.min) / (count.saturating_sub(1).max(1)) as f64;
        (0..count).map(move |i| self.min + step * i as f64)
    }
}

fn seconds(t: &NaiveDateTime) -> f64 {
    t.and_utc().timestamp() as f64
}

fn from_seconds(secs: f64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs.round() as i64, 0).map(|dt| dt.naive_utc())
}

/// Plot area inside the margins, as `(left, top, right, bottom)`.
fn plot_area(width: u32, height: u32) -> (i32, i32, i32, i32) {
    let left = (width / 10) as i32;
    let right = width as i32 - (width / 25) as i32;
    let top = (height / 10) as i32;
    let bottom = height as i32 - (height / 10) as i32;
    (left, top, right, bottom)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct Text<'f> {
    font: &'f Font<'f>,
    scale: Scale,
}

impl Text<'_> {
    fn size(&self, text: &str) -> (i32, i32) {
        text_size(self.scale, self.font, text)
    }

    fn draw(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, colour: Rgb<u8>) {
        draw_text_mut(img, colour, x, y, self.scale, self.font, text);
    }
}

/// Render the grid's series as a scatter plot.
pub fn render_scatter(grid: &StationGrid, config: &PlotConfig, font: Option<&Font<'_>>) -> RgbImage {
    let (width, height) = (config.width, config.height);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let (left, top, right, bottom) = plot_area(width, height);

    let text = font.map(|font| Text {
        font,
        scale: Scale::uniform(height as f32 / 40.0),
    });

    let (t_min, t_max) = match (grid.timestamps.first(), grid.timestamps.last()) {
        (Some(first), Some(last)) => (seconds(first), seconds(last)),
        _ => (0.0, 0.0),
    };
    let (v_min, v_max) = grid.value_bounds().unwrap_or((0.0, 0.0));
    let x_axis = Axis::new(t_min, t_max, 0.05, left as f64, right as f64);
    let y_axis = Axis::new(v_min, v_max, 0.05, bottom as f64, top as f64);

    // grid lines and ticks
    let tick = (height / 100).max(3) as f32;
    for x in x_axis.ticks(X_TICKS) {
        let px = x_axis.map(x);
        draw_line_segment_mut(&mut img, (px, top as f32), (px, bottom as f32), GRID);
        draw_line_segment_mut(&mut img, (px, bottom as f32), (px, bottom as f32 + tick), FOREGROUND);
        if let (Some(text), false, Some(t)) = (&text, grid.is_empty(), from_seconds(x)) {
            let label = t.format(&config.time_format).to_string();
            let (w, _) = text.size(&label);
            text.draw(&mut img, px as i32 - w / 2, bottom + 2 * tick as i32, &label, FOREGROUND);
        }
    }
    for y in y_axis.ticks(Y_TICKS) {
        let py = y_axis.map(y);
        draw_line_segment_mut(&mut img, (left as f32, py), (right as f32, py), GRID);
        draw_line_segment_mut(&mut img, (left as f32 - tick, py), (left as f32, py), FOREGROUND);
        if let (Some(text), false) = (&text, grid.is_empty()) {
            let label = format!("{:.1}", y);
            let (w, h) = text.size(&label);
            text.draw(&mut img, left - 2 * tick as i32 - w, py as i32 - h / 2, &label, FOREGROUND);
        }
    }

    draw_hollow_rect_mut(
        &mut img,
        Rect::at(left, top).of_size((right - left) as u32, (bottom - top) as u32),
        FOREGROUND,
    );

    // points
    let radius = (width / 640).max(1) as i32;
    for (index, station) in grid.stations.iter().enumerate() {
        let colour = station_colour(index);
        for (t, value) in grid.series(station) {
            if !value.is_finite() {
                continue;
            }
            let x = x_axis.map(seconds(&t)).round() as i32;
            let y = y_axis.map(value).round() as i32;
            draw_filled_circle_mut(&mut img, (x, y), radius, colour);
        }
    }

    if let Some(text) = &text {
        let (w, h) = text.size(&config.title);
        text.draw(&mut img, (width as i32 - w) / 2, (top - h) / 2, &config.title, FOREGROUND);
        draw_legend(&mut img, grid, text, right);
    }

    img
}

fn draw_legend(img: &mut RgbImage, grid: &StationGrid, text: &Text<'_>, right: i32) {
    let (_, line_height) = text.size("Ag");
    let swatch = (line_height / 2).max(4);
    let top = (img.height() / 10) as i32 + line_height / 2;
    for (index, station) in grid.stations.iter().enumerate() {
        let (w, _) = text.size(station);
        let y = top + index as i32 * (line_height + line_height / 4);
        let x = right - w - swatch * 3;
        draw_filled_rect_mut(
            img,
            Rect::at(x, y + (line_height - swatch) / 2).of_size(swatch as u32, swatch as u32),
            station_colour(index),
        );
        text.draw(img, x + swatch * 2, y, station, FOREGROUND);
    }
}

/// Save the image; the format follows the file extension.
pub fn save(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .map_err(|e| NmdbError::render(format!("Couldn't save plot to {}: {}", path.display(), e)))
}
