//! Color/shape pre-filter.
//!
//! Cheap first stage ahead of the model: blur, HSV threshold against flame and
//! smoke ranges, dilate, then look for an outer contour large enough to be a fire
//! rather than a stray highlight. HSV uses the 8-bit convention of most vision
//! libraries: hue in `0..180`, saturation and value in `0..=255`.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

/// Gaussian sigma for the 7x7 pre-threshold smoothing.
const BLUR_SIGMA: f32 = 1.4;
/// Chebyshev radius per dilation pass (5x5 structuring element).
const DILATE_RADIUS: u8 = 2;
const DILATE_PASSES: usize = 2;

/// Inclusive HSV bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

pub const FIRE_RANGE: HsvRange = HsvRange {
    lower: [0, 74, 200],
    upper: [22, 170, 235],
};

pub const SMOKE_RANGE: HsvRange = HsvRange {
    lower: [95, 11, 150],
    upper: [105, 45, 190],
};

/// RGB to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        ((h / 2.0).round() as u32).min(180) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// Bounding box and area of one candidate blob.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Polygon area enclosed by the contour.
    pub area: f64,
}

#[derive(Clone, Debug)]
pub struct ColorFilter {
    ranges: Vec<HsvRange>,
    min_width: u32,
    min_height: u32,
    min_area: f64,
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self {
            ranges: vec![FIRE_RANGE, SMOKE_RANGE],
            min_width: 10,
            min_height: 5,
            min_area: 60.0,
        }
    }
}

impl ColorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary mask (255 = in range) of the smoothed image, before dilation.
    pub fn mask(&self, image: &RgbImage) -> GrayImage {
        let smoothed = imageops::blur(image, BLUR_SIGMA);
        let mut mask = GrayImage::new(image.width(), image.height());
        for (x, y, pixel) in smoothed.enumerate_pixels() {
            let hsv = rgb_to_hsv(pixel.0);
            if self.ranges.iter().any(|range| range.contains(hsv)) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    /// Outer blobs of the dilated mask, whatever their size.
    pub fn candidate_regions(&self, image: &RgbImage) -> Vec<Region> {
        let mut mask = self.mask(image);
        for _ in 0..DILATE_PASSES {
            mask = dilate(&mask, Norm::LInf, DILATE_RADIUS);
        }
        find_contours::<i32>(&mask)
            .iter()
            .filter(|contour| contour.parent.is_none())
            .filter_map(region_of)
            .collect()
    }

    /// Whether a region is big enough to pass the filter.
    pub fn is_significant(&self, region: &Region) -> bool {
        region.width > self.min_width && region.height > self.min_height && region.area > self.min_area
    }

    /// True if any candidate region passes the size thresholds.
    pub fn accepts(&self, image: &RgbImage) -> bool {
        self.candidate_regions(image)
            .iter()
            .any(|region| self.is_significant(region))
    }
}

fn region_of(contour: &Contour<i32>) -> Option<Region> {
    let points = &contour.points;
    let first = points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    // Shoelace over the closed border polygon.
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    Some(Region {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
        area: twice_area.abs() as f64 / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const FLAME: [u8; 3] = [220, 151, 117];

    fn scene_with_box(w: u32, h: u32, box_w: u32, box_h: u32) -> RgbImage {
        let mut image = RgbImage::new(w, h);
        let (x0, y0) = ((w - box_w) / 2, (h - box_h) / 2);
        for y in y0..y0 + box_h {
            for x in x0..x0 + box_w {
                image.put_pixel(x, y, Rgb(FLAME));
            }
        }
        image
    }

    #[test]
    fn hsv_matches_eight_bit_convention() {
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(FLAME), [10, 119, 220]);
    }

    #[test]
    fn hue_just_below_red_saturates_instead_of_wrapping() {
        // 359.25 degrees halves to 179.6, which rounds to 180, not 0.
        let hsv = rgb_to_hsv([230, 150, 151]);
        assert_eq!(hsv, [180, 89, 230]);
        assert!(!FIRE_RANGE.contains(hsv));
    }

    #[test]
    fn flame_color_is_in_fire_range() {
        assert!(FIRE_RANGE.contains(rgb_to_hsv(FLAME)));
        assert!(!SMOKE_RANGE.contains(rgb_to_hsv(FLAME)));
        assert!(!FIRE_RANGE.contains(rgb_to_hsv([60, 90, 50])));
    }

    #[test]
    fn large_flame_patch_is_accepted() {
        let image = scene_with_box(128, 128, 40, 30);
        let filter = ColorFilter::new();
        let regions = filter.candidate_regions(&image);
        assert_eq!(regions.len(), 1);
        assert!(filter.is_significant(&regions[0]));
        assert!(filter.accepts(&image));
    }

    #[test]
    fn smoke_patch_is_accepted() {
        const SMOKE: [u8; 3] = [150, 163, 170];
        assert_eq!(rgb_to_hsv(SMOKE), [101, 30, 170]);
        assert!(SMOKE_RANGE.contains(rgb_to_hsv(SMOKE)));

        let mut image = RgbImage::new(128, 128);
        for y in 40..60 {
            for x in 30..60 {
                image.put_pixel(x, y, Rgb(SMOKE));
            }
        }
        let filter = ColorFilter::new();
        let regions = filter.candidate_regions(&image);
        assert_eq!(regions.len(), 1);
        assert!(filter.is_significant(&regions[0]));
        assert!(filter.accepts(&image));
    }

    #[test]
    fn black_scene_is_rejected() {
        let image = RgbImage::new(128, 128);
        let filter = ColorFilter::new();
        assert!(filter.candidate_regions(&image).is_empty());
        assert!(!filter.accepts(&image));
    }

    #[test]
    fn small_speck_is_rejected() {
        // Dilation grows a 2x2 speck to at most ~10x10, which stays under the width bound.
        let image = scene_with_box(128, 128, 2, 2);
        assert!(!ColorFilter::new().accepts(&image));
    }

    #[test]
    fn region_thresholds_are_strict() {
        let filter = ColorFilter::new();
        let region = Region {
            x: 0,
            y: 0,
            width: 10,
            height: 20,
            area: 200.0,
        };
        assert!(!filter.is_significant(&region));
        assert!(filter.is_significant(&Region {
            width: 11,
            ..region
        }));
        assert!(!filter.is_significant(&Region {
            width: 11,
            area: 60.0,
            ..region
        }));
    }
}
