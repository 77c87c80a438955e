//! Frame annotation for the live feed.
//!
//! Object mode draws a box and "Person" label per detection plus a running
//! count caption. Thermal mode is a visualization only: it maps luminance
//! through a blur and a jet palette. It is not radiometric data.

use image::imageops;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::rect::Rect;

use cg_models::DetectionMode;

use crate::frame::{Detection, Frame};
use crate::glyphs::{draw_text, text_height, text_width};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const CAPTION_X: i32 = 20;
const CAPTION_Y: i32 = 18;
const CAPTION_SCALE: u32 = 3;
const LABEL_SCALE: u32 = 1;

/// Blur radius applied before the thermal palette, matching a 21px kernel.
const THERMAL_SIGMA: f32 = 3.5;

/// Caption text for a frame in `mode`.
pub fn caption(mode: DetectionMode, count: usize) -> String {
    match mode {
        DetectionMode::Object => format!("LIVE COUNT: {}", count),
        DetectionMode::Thermal => format!("THERMAL COUNT: {}", count),
    }
}

/// Region (x, y, width, height) covered by a caption with `text`.
pub fn caption_region(text: &str) -> (u32, u32, u32, u32) {
    (
        CAPTION_X as u32,
        CAPTION_Y as u32,
        text_width(text, CAPTION_SCALE),
        text_height(CAPTION_SCALE),
    )
}

/// Draw detections and the count caption onto `frame`.
pub fn annotate(frame: Frame, detections: &[Detection], mode: DetectionMode) -> Frame {
    let mut image = match mode {
        DetectionMode::Object => frame.into_image(),
        DetectionMode::Thermal => thermal_palette(frame.image()),
    };

    let text = caption(mode, detections.len());
    match mode {
        DetectionMode::Object => {
            for d in detections {
                draw_box(&mut image, d, 2, GREEN);
                draw_text(&mut image, d.x, d.y - 10, "Person", LABEL_SCALE, GREEN);
            }
            draw_text(&mut image, CAPTION_X, CAPTION_Y, &text, CAPTION_SCALE, RED);
        }
        DetectionMode::Thermal => {
            for d in detections {
                draw_box(&mut image, d, 1, WHITE);
            }
            draw_text(&mut image, CAPTION_X, CAPTION_Y, &text, CAPTION_SCALE, WHITE);
        }
    }

    Frame::from_image(image)
}

/// Hollow rectangle `thickness` pixels wide, drawn inwards.
fn draw_box(image: &mut RgbImage, d: &Detection, thickness: u32, color: Rgb<u8>) {
    for inset in 0..thickness {
        let (Some(w), Some(h)) = (
            d.width.checked_sub(2 * inset).filter(|w| *w > 0),
            d.height.checked_sub(2 * inset).filter(|h| *h > 0),
        ) else {
            return;
        };
        let rect = Rect::at(d.x + inset as i32, d.y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Grayscale, blur, then map intensity through a jet palette.
fn thermal_palette(image: &RgbImage) -> RgbImage {
    let gray: GrayImage = imageops::grayscale(image);
    let blurred = gaussian_blur_f32(&gray, THERMAL_SIGMA);
    RgbImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        jet(blurred.get_pixel(x, y)[0])
    })
}

fn jet(value: u8) -> Rgb<u8> {
    let v = value as f32 / 255.0;
    let channel = |offset: f32| {
        let c = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}
