use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::{MlErr, Result};

/// Extensions tried, in order, when looking up the image of a sample id.
pub const IMAGE_EXTENSIONS: [&str; 9] = ["png", "jpg", "jpeg", "pgm", "pbm", "ppm", "bmp", "tif", "tiff"];

/// Finds the image file of sample `id` inside `dir`.
pub fn find_image(dir: &Path, id: &str) -> Option<PathBuf> {
    let bare = dir.join(id);
    if bare.extension().is_some() && bare.is_file() {
        return Some(bare);
    }

    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{id}.{ext}")))
        .find(|path| path.is_file())
}

/// Decodes an image as a `(height, width)` matrix of grayscale values in `[0, 1]`, inverted so
/// that ink is close to 1 and background close to 0.
pub fn load_image(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path)
        .map_err(|source| MlErr::Image {
            path: path.to_path_buf(),
            source,
        })?
        .into_luma8();

    let (w, h) = img.dimensions();
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
        1. - f32::from(img.get_pixel(c as u32, r as u32).0[0]) / 255.
    }))
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    #[test]
    fn decodes_inverted_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w-01.png");
        let mut img = GrayImage::from_pixel(3, 2, Luma([255]));
        img.put_pixel(1, 0, Luma([0]));
        img.save(&path).unwrap();

        let found = find_image(dir.path(), "w-01").unwrap();
        assert_eq!(found, path);

        let x = load_image(&found).unwrap();
        assert_eq!(x.dim(), (2, 3));
        assert_eq!(x[[0, 1]], 1.);
        assert_eq!(x[[1, 2]], 0.);
    }

    #[test]
    fn missing_images_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_image(dir.path(), "nope").is_none());
        assert!(load_image(&dir.path().join("nope.png")).is_err());
    }
}
