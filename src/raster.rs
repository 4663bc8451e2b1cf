use std::fmt::Debug;

use image::DynamicImage;

use crate::error::ConversionError;

/// Turns a decoded image into device-native print data.
pub trait RasterConverter: Debug + Send + Sync {
    /// Converts an image for a label of `label_width` millimetres.
    ///
    /// # Errors
    ///
    /// Returns an error when the image cannot be rendered for the label.
    fn convert(
        &self,
        image: &DynamicImage,
        label_width: u8,
        dither: bool,
        red: bool,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Converter used when the host has no raster encoder installed.
///
/// Every conversion fails, so jobs end as `ConversionFailed` before any bytes
/// reach the printer.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRaster;

impl RasterConverter for UnavailableRaster {
    fn convert(
        &self,
        _image: &DynamicImage,
        _label_width: u8,
        _dither: bool,
        _red: bool,
    ) -> Result<Vec<u8>, ConversionError> {
        Err(ConversionError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn unavailable_raster_always_fails() {
        let image = DynamicImage::new_luma8(4, 4);
        assert_matches!(
            UnavailableRaster.convert(&image, 62, true, false),
            Err(ConversionError::Unavailable)
        );
    }
}
