//! Post-processing applied to images between download and caching.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use potd_archive::ImageMetadata;
use tracing::debug;

use crate::error::CacheError;

/// DejaVu Sans, see `assets/LICENSE-DejaVu.txt`.
const DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// A transformation of a decoded image.
pub trait Mutation: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform `image`, using `metadata` for context.
    fn apply(&self, image: DynamicImage, metadata: &ImageMetadata) -> DynamicImage;
}

/// Ordered list of mutations run on one image.
///
/// Cloning is cheap; mutations are shared.
#[derive(Clone, Default)]
pub struct MutationPipeline {
    mutations: Vec<Arc<dyn Mutation>>,
}

impl MutationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation; mutations run in insertion order.
    pub fn with(mut self, mutation: impl Mutation + 'static) -> Self {
        self.mutations.push(Arc::new(mutation));
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Decode `input`, apply every mutation, and encode to `output` in the
    /// format the input was detected as.
    ///
    /// Blocking; async callers run it on the blocking pool.
    pub fn run(
        &self,
        input: &Path,
        metadata: &ImageMetadata,
        output: &Path,
    ) -> Result<(), CacheError> {
        let reader = ImageReader::open(input)?.with_guessed_format()?;
        let format = reader.format();
        let mut image = reader.decode()?;

        for mutation in &self.mutations {
            debug!(id = %metadata.id, mutation = mutation.name(), "Applying mutation");
            image = mutation.apply(image, metadata);
        }

        match format {
            Some(format) => image.save_with_format(output, format)?,
            None => image.save(output)?,
        }

        Ok(())
    }
}

/// Resize to exact dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Mutation for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn apply(&self, image: DynamicImage, _metadata: &ImageMetadata) -> DynamicImage {
        if image.width() == self.width && image.height() == self.height {
            return image;
        }
        image.resize_exact(self.width, self.height, FilterType::Lanczos3)
    }
}

/// Draws the image's descriptive text in the bottom-left corner, in white
/// on a translucent black box.
#[derive(Clone)]
pub struct DescriptiveCaption {
    font: FontArc,
    /// Text height in pixels.
    pub font_size: f32,
    /// Opacity of the black box, `0.0..=1.0`.
    pub opacity: f32,
    /// Gap between text, box and image edges, in pixels.
    pub padding: u32,
}

impl DescriptiveCaption {
    /// Caption using the bundled font.
    pub fn new() -> Result<Self, CacheError> {
        Ok(Self::with_font(FontArc::try_from_slice(DEFAULT_FONT)?))
    }

    /// Caption using a TrueType/OpenType font file.
    pub fn from_font_file(path: &Path) -> Result<Self, CacheError> {
        let data = fs::read(path)?;
        Ok(Self::with_font(FontArc::try_from_vec(data)?))
    }

    fn with_font(font: FontArc) -> Self {
        Self {
            font,
            font_size: 28.0,
            opacity: 0.4,
            padding: 10,
        }
    }

    /// Box `(x, y, width, height)` and text origin for a text block of
    /// `text_width` x `text_height` on an image of the given size. `None` if
    /// the image is too small to hold one line.
    fn layout(
        &self,
        text_width: u32,
        text_height: u32,
        width: u32,
        height: u32,
    ) -> Option<((u32, u32, u32, u32), (i32, i32))> {
        let padding = self.padding;
        let box_height = text_height + padding;
        if height < box_height + padding || width <= padding {
            return None;
        }

        let x = padding / 2;
        let y = height - box_height - padding;
        let box_width = (text_width + padding).min(width - x);
        let origin = (padding as i32, (y + padding / 2) as i32);

        Some(((x, y, box_width, box_height), origin))
    }
}

impl Mutation for DescriptiveCaption {
    fn name(&self) -> &str {
        "descriptive-caption"
    }

    fn apply(&self, image: DynamicImage, metadata: &ImageMetadata) -> DynamicImage {
        let text = metadata.descriptive_text.trim();
        if text.is_empty() {
            return image;
        }

        let scale = PxScale::from(self.font_size);
        let (text_width, _) = text_size(scale, &self.font, text);
        // Full line height, so descenders stay inside the box.
        let text_height = self.font.as_scaled(scale).height().ceil() as u32;
        let Some(((x, y, w, h), (text_x, text_y))) =
            self.layout(text_width, text_height, image.width(), image.height())
        else {
            return image;
        };

        let keep_alpha = image.color().has_alpha();
        let mut canvas: RgbaImage = image.into_rgba8();
        let keep = 1.0 - self.opacity.clamp(0.0, 1.0);
        let shade = |c: u8| (c as f32 * keep).round() as u8;

        for py in y..(y + h).min(canvas.height()) {
            for px in x..(x + w).min(canvas.width()) {
                let Rgba([r, g, b, a]) = *canvas.get_pixel(px, py);
                canvas.put_pixel(px, py, Rgba([shade(r), shade(g), shade(b), a]));
            }
        }

        draw_text_mut(
            &mut canvas,
            Rgba([255, 255, 255, 255]),
            text_x,
            text_y,
            scale,
            &self.font,
            text,
        );

        let captioned = DynamicImage::ImageRgba8(canvas);
        if keep_alpha {
            captioned
        } else {
            DynamicImage::ImageRgb8(captioned.into_rgb8())
        }
    }
}
