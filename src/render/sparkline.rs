use super::surface::{Rgb, Surface};
use crate::model::Bucket;

/// Placement of a chart on the surface. Rows run from 0 (baseline) to
/// `height` inclusive, so the chart occupies `height + 1` pixel rows
/// starting at `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartArea {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl ChartArea {
    fn baseline_y(&self) -> usize {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparklineStyle {
    pub base: Rgb,
    pub top: Rgb,
}

impl Default for SparklineStyle {
    fn default() -> Self {
        Self {
            base: Rgb::new(0, 140, 0),
            top: Rgb::new(0, 255, 90),
        }
    }
}

/// Map each bucket to its peak row in `[0, height]`; gaps stay `None`.
pub fn scale_peaks(window: &[Bucket], height: usize) -> Vec<Option<usize>> {
    let (min, max) = window
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min > max {
        return vec![None; window.len()];
    }
    let range = max - min;
    window
        .iter()
        .map(|bucket| {
            bucket.map(|v| {
                if range <= 0.0 {
                    0
                } else {
                    (((v - min) / range) * height as f64).round() as usize
                }
            })
        })
        .collect()
}

/// Draw `window` (oldest first) into `area`. Only the newest
/// `area.width` buckets are shown and the chart starts at the first
/// real sample. Returns the number of pixels set.
pub fn draw_sparkline<S: Surface + ?Sized>(
    surface: &mut S,
    area: ChartArea,
    window: &[Bucket],
    style: SparklineStyle,
) -> usize {
    let visible = &window[window.len().saturating_sub(area.width)..];
    let Some(first) = visible.iter().position(Option::is_some) else {
        return 0;
    };
    let peaks = scale_peaks(&visible[first..], area.height);

    let mut drawn = 0;
    for (col, peak) in peaks.iter().enumerate() {
        let Some(peak) = *peak else {
            continue;
        };
        let left = col.checked_sub(1).and_then(|i| peaks[i]);
        let right = peaks.get(col + 1).copied().flatten();
        let x = area.x + col;

        for row in 0..=peak {
            let ridge = left.is_some_and(|l| l < row) || right.is_some_and(|r| r < row);
            let color = if row == peak || ridge {
                style.top
            } else {
                style.base
            };
            surface.set_pixel(x, area.baseline_y() - row, color);
            drawn += 1;
        }
    }
    drawn
}
