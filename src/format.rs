use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// The image formats objects can be stored as.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[derive(Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Webp,
}

impl ImageFormat {
    pub fn variants() -> &'static [Self] {
        &[Self::Png, Self::Jpg, Self::Webp]
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// The content type stored alongside the object.
    ///
    /// This is the literal format name appended to `image/`, so `jpg`
    /// produces `image/jpg` rather than `image/jpeg`.
    pub fn content_type(&self) -> String {
        format!("image/{}", self.name())
    }
}

impl From<ImageFormat> for image::ImageFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Webp => image::ImageFormat::WebP,
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
        }
    }
}

/// Resolves the codec used to compress an image of the given format.
///
/// Returns `None` only when no format was given at all.
pub fn compression_for(format: Option<ImageFormat>) -> Option<image::ImageFormat> {
    format.map(Into::into)
}

/// Resolves the codec for a textual format name.
///
/// Names that are not `png` or `webp` fall back to JPEG, unknown names
/// included. A missing name resolves to nothing.
pub fn compression_for_name(name: Option<&str>) -> Option<image::ImageFormat> {
    let name = name?;
    let format = name.parse::<ImageFormat>().unwrap_or(ImageFormat::Jpg);
    compression_for(Some(format))
}
