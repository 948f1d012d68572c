use std::io::{self, BufReader, Cursor, Read, Seek};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageReader};

use crate::format::{compression_for, ImageFormat};
use crate::{Error, Result};

/// Quality handed to lossy encoders, uploads are never degraded.
pub const MAX_QUALITY: u8 = 100;

/// Encodes `img` with the codec resolved for `format`.
pub fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Bytes> {
    let mut buff = Cursor::new(Vec::new());

    // Always resolves for a concrete format.
    match compression_for(Some(format)).unwrap_or(image::ImageFormat::Jpeg) {
        image::ImageFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buff))?;
        },
        image::ImageFormat::WebP => {
            // The lossless encoder only accepts 8-bit RGB(A).
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buff))?;
        },
        _ => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buff, MAX_QUALITY))?;
        },
    }

    Ok(Bytes::from(buff.into_inner()))
}

/// Runs `work` on the rayon pool and waits for it without blocking the executor.
pub async fn offload<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    rayon::spawn(move || {
        // The receiver is only gone if the caller was cancelled.
        let _ = tx.send(work());
    });

    rx.await.map_err(|_| {
        Error::Io(io::Error::new(io::ErrorKind::Other, "Image worker exited without a result"))
    })?
}

/// Decodes an image, guessing the format from its leading bytes.
pub fn decode<R: Read + Seek>(reader: R) -> Result<DynamicImage> {
    let img = ImageReader::new(BufReader::new(reader))
        .with_guessed_format()?
        .decode()?;

    Ok(img)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    fn checkerboard() -> DynamicImage {
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 128])
            }
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_png_is_lossless() {
        let original = checkerboard();
        let buff = encode(&original, ImageFormat::Png).unwrap();

        let decoded = decode(Cursor::new(buff)).unwrap();
        assert_eq!(decoded.to_rgba8(), original.to_rgba8());
    }

    #[test]
    fn test_payload_signatures() {
        let img = checkerboard();

        let png = encode(&img, ImageFormat::Png).unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), image::ImageFormat::Png);

        let jpg = encode(&img, ImageFormat::Jpg).unwrap();
        assert_eq!(image::guess_format(&jpg).unwrap(), image::ImageFormat::Jpeg);

        let webp = encode(&img, ImageFormat::Webp).unwrap();
        assert_eq!(image::guess_format(&webp).unwrap(), image::ImageFormat::WebP);
    }

    #[tokio::test]
    async fn test_offloaded_encode_matches_inline() {
        let img = checkerboard();
        let inline = encode(&img, ImageFormat::Webp).unwrap();

        let owned = img.clone();
        let offloaded = offload(move || encode(&owned, ImageFormat::Webp)).await.unwrap();
        assert_eq!(inline, offloaded);

        let err = offload(|| decode(Cursor::new(Vec::new()))).await.unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let res = decode(Cursor::new(b"definitely not an image".to_vec()));
        assert!(res.is_err());
    }
}
