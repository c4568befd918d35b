//! Pure bitmap composition for button tiles and the auxiliary strip.
//!
//! Nothing here touches the device or the page model; the controller
//! resolves colors (including page inheritance) before calling in.

mod canvas;

pub use canvas::font_for_size;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use image::{imageops, RgbImage};
use tracing::warn;

use crate::config::Rgb;
use canvas::Canvas;

/// Whether the strip bitmap must be pre-rotated for the panel mounting.
///
/// Transports that correct orientation themselves take `Native`; the raw
/// chunked protocol needs `Rotated180`. This is a device-capability
/// distinction owned by the caller, not a rendering decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripOrientation {
    /// Output is rotated 180 degrees before return.
    Rotated180,
    /// Output is returned as composed.
    Native,
}

/// Render a button tile.
///
/// Fills the tile with `bg_color`; with an icon, the icon sits centered in
/// the upper half (about half the tile height) and the label centered in
/// the lower half, otherwise the label alone is centered. An unreadable
/// icon degrades to the label-only layout. Never fails.
#[must_use]
pub fn render_button(
    label: &str,
    icon: Option<&str>,
    font_size: u32,
    bg_color: Rgb,
    text_color: Rgb,
    tile_size: (u32, u32),
) -> RgbImage {
    let (width, height) = tile_size;
    let mut image = RgbImage::from_pixel(width, height, image::Rgb([bg_color.0, bg_color.1, bg_color.2]));
    let fg = Rgb888::new(text_color.0, text_color.1, text_color.2);

    if let Some(path) = icon {
        match load_icon(path, height / 2) {
            Some(icon_image) => {
                let x = i64::from(width.saturating_sub(icon_image.width()) / 2);
                let y = i64::from((height / 2).saturating_sub(icon_image.height()) / 2);
                imageops::overlay(&mut image, &icon_image, x, y);
                draw_centered(&mut image, label, width / 2, height * 3 / 4, font_size, fg);
                return image;
            }
            None => {
                warn!(icon = %path, "Icon not usable, rendering label only");
            }
        }
    }

    draw_centered(&mut image, label, width / 2, height / 2, font_size, fg);
    image
}

/// Font size used for the strip title line.
const STRIP_FONT_SIZE: u32 = 20;

/// Render the paging status strip: `"{title} ({index}/{total})"` centered.
#[must_use]
pub fn render_strip(
    title: &str,
    page_index: usize,
    total_pages: usize,
    bg_color: Rgb,
    text_color: Rgb,
    strip_size: (u32, u32),
    orientation: StripOrientation,
) -> RgbImage {
    let (width, height) = strip_size;
    let mut image = RgbImage::from_pixel(width, height, image::Rgb([bg_color.0, bg_color.1, bg_color.2]));
    let fg = Rgb888::new(text_color.0, text_color.1, text_color.2);

    let text = format!("{title} ({page_index}/{total_pages})");
    draw_centered(&mut image, &text, width / 2, height / 2, STRIP_FONT_SIZE, fg);

    match orientation {
        StripOrientation::Rotated180 => imageops::rotate180(&image),
        StripOrientation::Native => image,
    }
}

fn draw_centered(image: &mut RgbImage, text: &str, cx: u32, cy: u32, font_size: u32, color: Rgb888) {
    if text.is_empty() {
        return;
    }
    let style = MonoTextStyle::new(font_for_size(font_size), color);
    let text_style = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build();
    let mut canvas = Canvas::new(image);
    #[allow(clippy::cast_possible_wrap)] // Tile dimensions are always small
    let origin = Point::new(cx as i32, cy as i32);
    // Error type is Infallible
    let _ = Text::with_text_style(text, origin, style, text_style).draw(&mut canvas);
}

/// Load an icon and scale it to the target height, preserving aspect ratio.
fn load_icon(path: &str, target_height: u32) -> Option<RgbImage> {
    if target_height == 0 {
        return None;
    }
    let img = match image::open(path) {
        Ok(img) => img,
        Err(err) => {
            warn!(icon = %path, error = %err, "Failed to load icon");
            return None;
        }
    };
    Some(
        img.resize(
            target_height * 2,
            target_height,
            imageops::FilterType::Lanczos3,
        )
        .to_rgb8(),
    )
}
