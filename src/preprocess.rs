use image::{imageops::FilterType, ImageReader};
use ndarray::{Array, Ix4};
use std::io::Cursor;
use thiserror::Error;

pub const INPUT_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error reading image: {0}")]
    Read(#[from] std::io::Error),
    #[error("Error decoding image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decodes `image_data` and turns it into a `(1, 224, 224, 3)` tensor with
/// values scaled to `[0, 1]`.
pub fn transform_image(image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
    let original_img = ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()?
        .decode()?;

    let img = original_img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Nearest)
        .to_rgb8();

    let size = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, size, size, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }

    Ok(input)
}

#[cfg(test)]
pub(crate) fn encode_test_image(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    use image::{ImageBuffer, Rgb};

    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb(color));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}
