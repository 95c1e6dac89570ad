//! Raster asset decoding.
//!
//! Bytes come from an [`AssetLoader`]; decoding goes through the `image`
//! crate and produces a premultiplied `tiny_skia::Pixmap`.

use anyhow::{anyhow, Context, Result};
use tiny_skia::{ColorU8, Pixmap};
use tracing::{debug, instrument};

use crate::AssetLoader;

/// Decodes any format the `image` crate recognizes.
pub fn decode_pixmap(bytes: &[u8]) -> Result<Pixmap> {
    let rgba = image::load_from_memory(bytes)
        .context("unsupported or corrupt image data")?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid image size {width}x{height}"))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Loads and decodes the image at `href`.
#[instrument(level = "debug", skip(loader))]
pub fn load_pixmap(loader: &dyn AssetLoader, href: &str) -> Result<Pixmap> {
    let path = href.strip_prefix("file://").unwrap_or(href);
    let bytes = loader.load_bytes(path)?;
    let pixmap = decode_pixmap(&bytes).with_context(|| format!("decoding {path}"))?;
    debug!(width = pixmap.width(), height = pixmap.height(), "decoded image");
    Ok(pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct MemoryLoader(Vec<u8>);

    impl AssetLoader for MemoryLoader {
        fn load_bytes(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn decodes_and_premultiplies() {
        let pixmap = decode_pixmap(&png(2, 1, [255, 0, 0, 128])).expect("decode");
        assert_eq!((pixmap.width(), pixmap.height()), (2, 1));
        let px = pixmap.pixels()[0];
        assert_eq!((px.red(), px.alpha()), (128, 128));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_pixmap(b"not an image").is_err());
    }

    #[test]
    fn loads_through_the_loader() {
        let loader = MemoryLoader(png(3, 3, [0, 0, 255, 255]));
        let pixmap = load_pixmap(&loader, "file://anything.png").expect("load");
        assert_eq!(pixmap.width(), 3);
    }
}
