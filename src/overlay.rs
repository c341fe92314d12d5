use crate::gaze::GazeOutput;
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const RAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Annotate a frame with its detections: one box per reported face and a
/// gaze ray from each box center. Detections without a box get a ray from
/// the frame center so the rendered clip still shows the estimate.
pub fn annotate(frame: &RgbImage, gaze: &GazeOutput) -> RgbImage {
    let mut out = frame.clone();

    let ray_len = (frame.width().min(frame.height()) as f32) / 4.0;

    if gaze.boxes.is_empty() {
        if let Some((pitch, yaw)) = gaze.primary() {
            let cx = frame.width() as f32 / 2.0;
            let cy = frame.height() as f32 / 2.0;
            draw_ray(&mut out, cx, cy, pitch, yaw, ray_len);
        }
        return out;
    }

    for (i, b) in gaze.boxes.iter().enumerate() {
        draw_box(&mut out, b);
        if let (Some(&pitch), Some(&yaw)) = (gaze.pitch.get(i), gaze.yaw.get(i)) {
            let cx = b[0] + b[2] / 2.0;
            let cy = b[1] + b[3] / 2.0;
            draw_ray(&mut out, cx, cy, pitch, yaw, b[2].max(ray_len / 2.0));
        }
    }

    out
}

fn draw_box(img: &mut RgbImage, b: &[f32; 4]) {
    let x0 = b[0] as i64;
    let y0 = b[1] as i64;
    let x1 = (b[0] + b[2]) as i64;
    let y1 = (b[1] + b[3]) as i64;

    for x in x0..=x1 {
        put(img, x, y0, BOX_COLOR);
        put(img, x, y1, BOX_COLOR);
    }
    for y in y0..=y1 {
        put(img, x0, y, BOX_COLOR);
        put(img, x1, y, BOX_COLOR);
    }
}

/// Project the gaze angles onto the image plane and draw the ray
fn draw_ray(img: &mut RgbImage, cx: f32, cy: f32, pitch: f32, yaw: f32, len: f32) {
    let pitch = pitch.to_radians();
    let yaw = yaw.to_radians();

    let dx = -len * yaw.sin() * pitch.cos();
    let dy = -len * pitch.sin();

    draw_line(img, cx, cy, cx + dx, cy + dy, RAY_COLOR);
}

fn draw_line(img: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb<u8>) {
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil() as i64;
    if steps == 0 {
        put(img, x0 as i64, y0 as i64, color);
        return;
    }

    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let x = x0 + (x1 - x0) * t;
        let y = y0 + (y1 - y0) * t;
        put(img, x as i64, y as i64, color);
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
