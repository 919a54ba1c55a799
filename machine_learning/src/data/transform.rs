use ndarray::Array2;
use rand::Rng;

/// Random affine distortion of training images: independent scaling of both axes, a
/// horizontal shear and a small translation, all around the image center.
///
/// Pixels that fall outside the source image are background (0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distortion {
    pub max_scale: f32,
    pub max_shear: f32,
    pub max_translate: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            max_scale: 0.1,
            max_shear: 0.3,
            max_translate: 0.02,
        }
    }
}

impl Distortion {
    /// Returns a distorted copy of `img`, same shape.
    pub fn apply<R: Rng + ?Sized>(&self, img: &Array2<f32>, rng: &mut R) -> Array2<f32> {
        let (h, w) = img.dim();
        if h == 0 || w == 0 {
            return img.clone();
        }

        let sx = 1. + rng.random_range(-self.max_scale..=self.max_scale);
        let sy = 1. + rng.random_range(-self.max_scale..=self.max_scale);
        let shear = rng.random_range(-self.max_shear..=self.max_shear);
        let tx = rng.random_range(-self.max_translate..=self.max_translate) * w as f32;
        let ty = rng.random_range(-self.max_translate..=self.max_translate) * h as f32;

        let cx = (w as f32 - 1.) / 2.;
        let cy = (h as f32 - 1.) / 2.;

        // inverse map: destination pixel -> source coordinates
        Array2::from_shape_fn((h, w), |(r, c)| {
            let yd = r as f32 - cy - ty;
            let y = yd / sy;
            let x = (c as f32 - cx - tx - shear * y) / sx;
            bilinear(img, y + cy, x + cx)
        })
    }
}

fn bilinear(img: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = img.dim();
    let y0 = y.floor();
    let x0 = x.floor();
    let (fy, fx) = (y - y0, x - x0);

    let at = |r: f32, c: f32| -> f32 {
        if r < 0. || c < 0. || r >= h as f32 || c >= w as f32 {
            0.
        } else {
            img[[r as usize, c as usize]]
        }
    };

    at(y0, x0) * (1. - fy) * (1. - fx)
        + at(y0, x0 + 1.) * (1. - fy) * fx
        + at(y0 + 1., x0) * fy * (1. - fx)
        + at(y0 + 1., x0 + 1.) * fy * fx
}
