//! Aspect-preserving fit into a square model canvas.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Scale `image` so its larger side equals `size`, then center it on a black
/// `size x size` canvas. Padding is split evenly, the odd pixel going to the
/// bottom/right.
pub fn letterbox(image: &RgbImage, size: u32) -> RgbImage {
    let mut canvas = RgbImage::new(size, size);
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || size == 0 {
        return canvas;
    }

    let aspect = width as f64 / height as f64;
    let (new_w, new_h) = if aspect > 1.0 {
        (size, (size as f64 / aspect) as u32)
    } else {
        ((size as f64 * aspect) as u32, size)
    };
    let (new_w, new_h) = (new_w.clamp(1, size), new_h.clamp(1, size));

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let left = (size - new_w) / 2;
    let top = (size - new_h) / 2;
    imageops::replace(&mut canvas, &resized, left as i64, top as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn content_rows(canvas: &RgbImage) -> (u32, u32) {
        let rows: Vec<u32> = (0..canvas.height())
            .filter(|&y| canvas.get_pixel(canvas.width() / 2, y) != &Rgb([0, 0, 0]))
            .collect();
        (rows[0], *rows.last().unwrap_or(&0))
    }

    #[test]
    fn landscape_pads_top_and_bottom_evenly() {
        let canvas = letterbox(&RgbImage::from_pixel(200, 100, WHITE), 128);
        assert_eq!(canvas.dimensions(), (128, 128));
        // 200x100 -> 128x64, 32 rows of padding on each side.
        assert_eq!(content_rows(&canvas), (32, 95));
        assert_eq!(canvas.get_pixel(0, 64), &WHITE);
        assert_eq!(canvas.get_pixel(127, 64), &WHITE);
    }

    #[test]
    fn portrait_pads_left_and_right_evenly() {
        let canvas = letterbox(&RgbImage::from_pixel(100, 200, WHITE), 128);
        assert_eq!(canvas.dimensions(), (128, 128));
        assert_eq!(canvas.get_pixel(31, 64), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(32, 64), &WHITE);
        assert_eq!(canvas.get_pixel(95, 64), &WHITE);
        assert_eq!(canvas.get_pixel(96, 64), &Rgb([0, 0, 0]));
    }

    #[test]
    fn square_input_fills_canvas() {
        let canvas = letterbox(&RgbImage::from_pixel(64, 64, WHITE), 128);
        assert!(canvas.pixels().all(|p| p == &WHITE));
    }

    #[test]
    fn padding_is_centered() {
        // 640x480 -> 128x96: 16 rows above, 16 below.
        let canvas = letterbox(&RgbImage::from_pixel(640, 480, WHITE), 128);
        assert_eq!(content_rows(&canvas), (16, 111));
        // 300x101 -> 128x43: 42 above, 43 below.
        let canvas = letterbox(&RgbImage::from_pixel(300, 101, WHITE), 128);
        assert_eq!(content_rows(&canvas), (42, 84));
    }
}
