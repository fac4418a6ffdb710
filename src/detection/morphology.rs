//! Binary morphology over 8-bit masks
//!
//! Masks are `GrayImage`s holding 0 or 255. All structuring elements are
//! squares anchored at their centre. Pixels outside the image never constrain
//! an erosion and never contribute to a dilation.

use image::{GrayImage, Rgb, RgbImage};

pub const MASK_ON: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    Min,
    Max,
}

/// Force a kernel size odd so it has a centre pixel. Sizes 0 and 1 are left
/// alone; both mean "no morphology".
pub fn normalize_kernel(size: usize) -> usize {
    if size > 0 && size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

pub fn erode(mask: &GrayImage, kernel: usize, iterations: usize) -> GrayImage {
    repeat(mask, kernel, iterations, Extremum::Min)
}

pub fn dilate(mask: &GrayImage, kernel: usize, iterations: usize) -> GrayImage {
    repeat(mask, kernel, iterations, Extremum::Max)
}

/// Morphological closing: `iterations` dilations followed by as many erosions.
pub fn close(mask: &GrayImage, kernel: usize, iterations: usize) -> GrayImage {
    let dilated = dilate(mask, kernel, iterations);
    erode(&dilated, kernel, iterations)
}

fn repeat(mask: &GrayImage, kernel: usize, iterations: usize, op: Extremum) -> GrayImage {
    let kernel = normalize_kernel(kernel);
    let mut out = mask.clone();
    if kernel <= 1 {
        return out;
    }
    for _ in 0..iterations {
        out = square_filter(&out, kernel / 2, op);
    }
    out
}

/// Min/max over a (2r+1)² window, done as a row pass then a column pass.
fn square_filter(src: &GrayImage, radius: usize, op: Extremum) -> GrayImage {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let pick = |a: u8, b: u8| match op {
        Extremum::Min => a.min(b),
        Extremum::Max => a.max(b),
    };
    let identity = match op {
        Extremum::Min => u8::MAX,
        Extremum::Max => u8::MIN,
    };

    let data = src.as_raw();
    let mut rows = vec![0u8; w * h];
    for y in 0..h {
        let line = &data[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            rows[y * w + x] = line[lo..=hi].iter().fold(identity, |acc, &v| pick(acc, v));
        }
    }

    let mut out = vec![0u8; w * h];
    for x in 0..w {
        for y in 0..h {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(h - 1);
            out[y * w + x] = (lo..=hi).fold(identity, |acc, yy| pick(acc, rows[yy * w + x]));
        }
    }

    GrayImage::from_raw(w as u32, h as u32, out).expect("buffer sized from source image")
}

/// Binary threshold: strictly above `level` becomes `MASK_ON`.
pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.iter_mut() {
        *p = if *p > level { MASK_ON } else { 0 };
    }
    out
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Count of pixels set in both masks, without allocating the intersection.
pub fn count_overlap(a: &GrayImage, b: &GrayImage) -> usize {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    a.as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .filter(|&(&x, &y)| x & y != 0)
        .count()
}

/// Expand a mask into a three-channel image (set pixels white).
pub fn to_rgb(mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Paint every pixel set in `mask` with `color`.
pub fn paint(canvas: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    debug_assert_eq!(canvas.dimensions(), mask.dimensions());
    for (pixel, &m) in canvas.pixels_mut().zip(mask.as_raw().iter()) {
        if m != 0 {
            *pixel = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn square(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = x >= x0 && x < x0 + size && y >= y0 && y < y0 + size;
            image::Luma([if inside { MASK_ON } else { 0 }])
        })
    }

    #[test]
    fn kernel_sizes_are_forced_odd() {
        assert_eq!(normalize_kernel(0), 0);
        assert_eq!(normalize_kernel(1), 1);
        assert_eq!(normalize_kernel(4), 5);
        assert_eq!(normalize_kernel(5), 5);
        assert_eq!(normalize_kernel(10), 11);
    }

    #[test]
    fn erosion_removes_thin_lines() {
        let mut mask = square(20, 20, 4, 4, 10);
        // one-pixel line, as a painted kerb would leave
        for x in 0..20 {
            mask.put_pixel(x, 17, image::Luma([MASK_ON]));
        }
        let eroded = erode(&mask, 3, 1);
        assert_eq!(count_nonzero(&eroded), 8 * 8);
        assert!((0..20).all(|x| eroded.get_pixel(x, 17)[0] == 0));
    }

    #[test]
    fn dilation_grows_by_radius() {
        let mask = square(20, 20, 8, 8, 2);
        let dilated = dilate(&mask, 5, 1);
        assert_eq!(count_nonzero(&dilated), 6 * 6);
    }

    #[test]
    fn image_border_does_not_erode() {
        let full = GrayImage::from_pixel(8, 8, image::Luma([MASK_ON]));
        assert_eq!(erode(&full, 5, 1), full);
    }

    #[test]
    fn closing_fills_small_holes() {
        let mut mask = square(30, 30, 5, 5, 20);
        mask.put_pixel(14, 14, image::Luma([0]));
        mask.put_pixel(15, 14, image::Luma([0]));
        let closed = close(&mask, 5, 1);
        assert_eq!(closed, square(30, 30, 5, 5, 20));
    }

    #[test]
    fn threshold_is_strict() {
        let gray = GrayImage::from_raw(3, 1, vec![29, 30, 31]).unwrap();
        assert_eq!(threshold(&gray, 30).as_raw(), &vec![0, 0, MASK_ON]);
    }

    #[test]
    fn overlap_counts_shared_pixels() {
        let a = square(10, 10, 0, 0, 6);
        let b = square(10, 10, 3, 3, 6);
        assert_eq!(count_overlap(&a, &b), 9);
        assert_eq!(count_overlap(&a, &a), count_nonzero(&a));
    }

    #[test]
    fn paint_only_touches_mask() {
        let mask = square(4, 4, 0, 0, 2);
        let mut canvas = RgbImage::new(4, 4);
        paint(&mut canvas, &mask, Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(1, 1), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(3, 3), Rgb([0, 0, 0]));
    }

    fn arb_mask() -> impl Strategy<Value = GrayImage> {
        (1u32..16, 1u32..16).prop_flat_map(|(w, h)| {
            prop::collection::vec(prop::bool::ANY, (w * h) as usize).prop_map(move |bits| {
                let raw = bits.into_iter().map(|b| if b { MASK_ON } else { 0 }).collect();
                GrayImage::from_raw(w, h, raw).unwrap()
            })
        })
    }

    proptest! {
        #[test]
        fn normalized_kernel_is_smallest_odd_at_least_k(k in 1usize..200) {
            let n = normalize_kernel(k);
            prop_assert!(n % 2 == 1);
            prop_assert!(n >= k);
            prop_assert!(n - k <= 1);
        }

        #[test]
        fn tiny_kernels_are_identity(mask in arb_mask(), k in 0usize..=1, iters in 0usize..3) {
            prop_assert_eq!(&erode(&mask, k, iters), &mask);
            prop_assert_eq!(&dilate(&mask, k, iters), &mask);
            prop_assert_eq!(&close(&mask, k, iters), &mask);
        }

        #[test]
        fn even_kernel_behaves_as_next_odd(mask in arb_mask(), half in 1usize..4) {
            let even = half * 2;
            prop_assert_eq!(erode(&mask, even, 1), erode(&mask, even + 1, 1));
            prop_assert_eq!(close(&mask, even, 1), close(&mask, even + 1, 1));
        }

        #[test]
        fn erosion_shrinks_and_dilation_grows(mask in arb_mask(), k in 2usize..6) {
            let eroded = count_nonzero(&erode(&mask, k, 1));
            let dilated = count_nonzero(&dilate(&mask, k, 1));
            prop_assert!(eroded <= count_nonzero(&mask));
            prop_assert!(dilated >= count_nonzero(&mask));
        }
    }
}
