//! Bounding box overlay for rendered frames

use image::Rgb;

use super::Detection;
use crate::camera::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 224, 255]);
const THICKNESS: i32 = 2;

/// Draw each detection's box outline onto the frame
///
/// Boxes are clipped to the frame.
pub fn draw_detections(frame: &mut Frame, detections: &[Detection]) {
    for detection in detections {
        draw_box(frame, detection.bbox);
    }
}

fn draw_box(frame: &mut Frame, [x1, y1, x2, y2]: [i32; 4]) {
    let (width, height) = (frame.width() as i32, frame.height() as i32);
    if width == 0 || height == 0 {
        return;
    }
    let (left, right) = (x1.min(x2).max(0), x1.max(x2).min(width - 1));
    let (top, bottom) = (y1.min(y2).max(0), y1.max(y2).min(height - 1));
    if left > right || top > bottom {
        return;
    }

    for t in 0..THICKNESS {
        for x in left..=right {
            put(frame, x, top + t);
            put(frame, x, bottom - t);
        }
        for y in top..=bottom {
            put(frame, left + t, y);
            put(frame, right - t, y);
        }
    }
}

fn put(frame: &mut Frame, x: i32, y: i32) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: [i32; 4]) -> Detection {
        Detection {
            label: "cat".to_string(),
            confidence: 0.9,
            bbox,
        }
    }

    #[test]
    fn test_outline_drawn_interior_untouched() {
        let mut frame = Frame::new(20, 20);
        draw_detections(&mut frame, &[detection([2, 2, 15, 15])]);

        assert_eq!(*frame.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*frame.get_pixel(15, 9), BOX_COLOR);
        assert_eq!(*frame.get_pixel(9, 9), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_bounds_box_is_clipped() {
        let mut frame = Frame::new(10, 10);
        draw_detections(&mut frame, &[detection([-50, -50, 500, 500])]);
        assert_eq!(*frame.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*frame.get_pixel(9, 9), BOX_COLOR);
    }

    #[test]
    fn test_box_entirely_outside_is_ignored() {
        let mut frame = Frame::new(10, 10);
        draw_detections(&mut frame, &[detection([20, 20, 30, 30])]);
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
