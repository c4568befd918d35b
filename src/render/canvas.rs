//! Drawing adapter between `image` buffers and `embedded-graphics`.

use core::convert::Infallible;

use embedded_graphics::mono_font::ascii::{
    FONT_5X8, FONT_6X10, FONT_7X13_BOLD, FONT_9X15_BOLD, FONT_9X18_BOLD, FONT_10X20,
};
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::Pixel;
use image::RgbImage;

/// Exposes an [`RgbImage`] as an embedded-graphics draw target.
///
/// Out-of-bounds pixels are discarded, so clipped text cannot fail.
pub struct Canvas<'a> {
    image: &'a mut RgbImage,
}

impl<'a> Canvas<'a> {
    pub fn new(image: &'a mut RgbImage) -> Self {
        Self { image }
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        #[allow(clippy::cast_possible_wrap)] // Tile dimensions are always small
        let (width, height) = (self.image.width() as i32, self.image.height() as i32);
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 && point.x < width && point.y < height {
                #[allow(clippy::cast_sign_loss)] // Bounds checked above
                self.image.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    image::Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }
        Ok(())
    }
}

/// Pick the largest built-in font not exceeding the requested pixel height.
///
/// The candidates are all compiled in, so resolution cannot fail; the
/// smallest font is the unconditional floor.
#[must_use]
pub fn font_for_size(px: u32) -> &'static MonoFont<'static> {
    match px {
        0..=8 => &FONT_5X8,
        9..=10 => &FONT_6X10,
        11..=13 => &FONT_7X13_BOLD,
        14..=15 => &FONT_9X15_BOLD,
        16..=18 => &FONT_9X18_BOLD,
        _ => &FONT_10X20,
    }
}
