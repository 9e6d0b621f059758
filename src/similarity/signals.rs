//! The individual partial-similarity signals.
//!
//! Each signal is an isolated, named function producing a value in `[0, 1]`
//! (higher = more similar). The four color/tone signals always produce a
//! value; the structural signals return `None` when a pair carries no usable
//! information for them (e.g. contours on two flat canvases), and the
//! combiner renormalizes weights over what remains.
//!
//! Everything here is deliberately heuristic. Thresholds and bin counts were
//! tuned by eye against studio photos, not validated statistically, and no
//! amount of per-signal rigor would change that character.

use std::f64::consts::PI;

use super::raster::Raster;

/// Gradient magnitude above which a pixel counts as an edge.
const EDGE_THRESHOLD: f64 = 40.0;
/// Minimum edge points for a contour to mean anything.
const MIN_CONTOUR_POINTS: usize = 16;
/// Angular sectors in the contour's radial signature.
const CONTOUR_SECTORS: usize = 32;
/// Fourier harmonics kept from the radial signature (beyond DC).
const CONTOUR_HARMONICS: usize = 7;
/// Brightness offsets swept when comparing color histograms; tolerates the
/// overall shift a kiln firing puts on glaze colors.
const SWEEP_OFFSETS: [i16; 5] = [-30, -15, 0, 15, 30];

// ============ Always-informative signals ============

/// Grayscale 256-bin histogram intersection. Captures tonal distribution,
/// robust to translation.
pub fn histogram(a: &Raster, b: &Raster) -> f64 {
    let ha = gray_histogram(a);
    let hb = gray_histogram(b);
    ha.iter().zip(hb.iter()).map(|(x, y)| x.min(*y)).sum()
}

fn gray_histogram(r: &Raster) -> [f64; 256] {
    let mut bins = [0.0f64; 256];
    for &v in &r.gray {
        bins[(v.round() as usize).min(255)] += 1.0;
    }
    let n = r.len() as f64;
    for bin in bins.iter_mut() {
        *bin /= n;
    }
    bins
}

/// Single-window SSIM-style score over the whole resampled image: mean,
/// variance, and covariance of grayscale intensities with the standard
/// stabilizing constants. Not per-patch SSIM.
pub fn structure(a: &Raster, b: &Raster) -> f64 {
    let c1 = (0.01f64 * 255.0).powi(2);
    let c2 = (0.03f64 * 255.0).powi(2);

    let n = a.len().min(b.len()) as f64;
    let mean_a = a.gray.iter().sum::<f64>() / n;
    let mean_b = b.gray.iter().sum::<f64>() / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for (&x, &y) in a.gray.iter().zip(b.gray.iter()) {
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
        cov += (x - mean_a) * (y - mean_b);
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    let ssim = ((2.0 * mean_a * mean_b + c1) * (2.0 * cov + c2))
        / ((mean_a.powi(2) + mean_b.powi(2) + c1) * (var_a + var_b + c2));

    ssim.clamp(0.0, 1.0)
}

/// Inverted normalized Euclidean distance between the mean RGB of the two
/// images. `0` for pure black vs. pure white.
pub fn mean_color(a: &Raster, b: &Raster) -> f64 {
    let ma = mean_rgb(a);
    let mb = mean_rgb(b);
    let dist = ((ma[0] - mb[0]).powi(2) + (ma[1] - mb[1]).powi(2) + (ma[2] - mb[2]).powi(2)).sqrt();
    let max_dist = (3.0f64).sqrt() * 255.0;
    (1.0 - dist / max_dist).clamp(0.0, 1.0)
}

fn mean_rgb(r: &Raster) -> [f64; 3] {
    let mut sums = [0.0f64; 3];
    for px in &r.rgb {
        sums[0] += f64::from(px[0]);
        sums[1] += f64::from(px[1]);
        sums[2] += f64::from(px[2]);
    }
    let n = r.len() as f64;
    [sums[0] / n, sums[1] / n, sums[2] / n]
}

/// Coarse RGB histogram intersection, taking the best overlap across a
/// sweep of brightness offsets applied to the candidate.
pub fn color_sweep(query: &Raster, candidate: &Raster) -> f64 {
    let hq = rgb_histogram(query, 0);
    SWEEP_OFFSETS
        .iter()
        .map(|&offset| {
            let hc = rgb_histogram(candidate, offset);
            hq.iter().zip(hc.iter()).map(|(x, y)| x.min(*y)).sum::<f64>()
        })
        .fold(0.0, f64::max)
}

/// 8 bins per channel (512 total), with all channels shifted by `offset`
/// before binning.
fn rgb_histogram(r: &Raster, offset: i16) -> Vec<f64> {
    let mut bins = vec![0.0f64; 512];
    for px in &r.rgb {
        let shifted = |v: u8| -> usize {
            let s = (i16::from(v) + offset).clamp(0, 255) as usize;
            s >> 5
        };
        bins[shifted(px[0]) * 64 + shifted(px[1]) * 8 + shifted(px[2])] += 1.0;
    }
    let n = r.len() as f64;
    for bin in bins.iter_mut() {
        *bin /= n;
    }
    bins
}

// ============ Gated structural signals ============

/// Shape-contour signal: thresholded gradient edges reduced to a radial
/// signature around the edge centroid, compared through the magnitudes of
/// its first few Fourier coefficients. `None` when either image has too few
/// edges to carry a shape.
pub fn contour(a: &Raster, b: &Raster) -> Option<f64> {
    let da = contour_descriptor(a)?;
    let db = contour_descriptor(b)?;

    let dist: f64 = da
        .iter()
        .zip(db.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt();
    let norm_a: f64 = da.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = db.iter().map(|v| v * v).sum::<f64>().sqrt();

    Some((1.0 - dist / (norm_a + norm_b + 1e-9)).clamp(0.0, 1.0))
}

fn contour_descriptor(r: &Raster) -> Option<Vec<f64>> {
    let points = edge_points(r);
    if points.len() < MIN_CONTOUR_POINTS {
        return None;
    }

    // Centroid of the edge cloud
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;

    // Mean radius per angular sector; empty sectors take the global mean
    let mut sums = vec![0.0f64; CONTOUR_SECTORS];
    let mut counts = vec![0usize; CONTOUR_SECTORS];
    let mut total_radius = 0.0;
    for &(x, y) in &points {
        let dx = x - cx;
        let dy = y - cy;
        let radius = (dx * dx + dy * dy).sqrt();
        let angle = dy.atan2(dx) + PI; // [0, 2π)
        let sector =
            ((angle / (2.0 * PI) * CONTOUR_SECTORS as f64) as usize).min(CONTOUR_SECTORS - 1);
        sums[sector] += radius;
        counts[sector] += 1;
        total_radius += radius;
    }
    let mean_radius = total_radius / n;
    let signature: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(&s, &c)| if c > 0 { s / c as f64 } else { mean_radius })
        .collect();

    // DFT magnitudes, normalized by the DC component for scale invariance
    let dc: f64 = signature.iter().sum();
    if dc < 1e-9 {
        return None;
    }
    let mut descriptor = Vec::with_capacity(CONTOUR_HARMONICS);
    for k in 1..=CONTOUR_HARMONICS {
        let mut re = 0.0;
        let mut im = 0.0;
        for (j, &v) in signature.iter().enumerate() {
            let phase = -2.0 * PI * (k * j) as f64 / CONTOUR_SECTORS as f64;
            re += v * phase.cos();
            im += v * phase.sin();
        }
        descriptor.push((re * re + im * im).sqrt() / dc);
    }
    Some(descriptor)
}

fn edge_points(r: &Raster) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    for y in 1..r.size - 1 {
        for x in 1..r.size - 1 {
            let gx = r.gray[r.idx(x + 1, y)] - r.gray[r.idx(x - 1, y)];
            let gy = r.gray[r.idx(x, y + 1)] - r.gray[r.idx(x, y - 1)];
            if (gx * gx + gy * gy).sqrt() > EDGE_THRESHOLD {
                points.push((f64::from(x), f64::from(y)));
            }
        }
    }
    points
}

/// Blocked-variance "pattern" signal over an 8×8 grid: compares where the
/// busy and calm regions of the two images sit. `None` when both images are
/// essentially flat everywhere.
pub fn pattern(a: &Raster, b: &Raster) -> Option<f64> {
    let va = block_variances(a);
    let vb = block_variances(b);

    let max_var = va.iter().chain(vb.iter()).fold(0.0f64, |m, &v| m.max(v));
    if max_var < 1.0 {
        return None;
    }

    let l1: f64 = va.iter().zip(vb.iter()).map(|(x, y)| (x - y).abs()).sum();
    let scale: f64 = va.iter().zip(vb.iter()).map(|(x, y)| x + y).sum();
    Some((1.0 - l1 / (scale + 1e-9)).clamp(0.0, 1.0))
}

fn block_variances(r: &Raster) -> Vec<f64> {
    const GRID: u32 = 8;
    let block = (r.size / GRID).max(1);
    let mut out = Vec::with_capacity((GRID * GRID) as usize);
    for by in 0..GRID {
        for bx in 0..GRID {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            let mut count = 0.0;
            for y in by * block..((by + 1) * block).min(r.size) {
                for x in bx * block..((bx + 1) * block).min(r.size) {
                    let v = r.gray[r.idx(x, y)];
                    sum += v;
                    sum_sq += v * v;
                    count += 1.0;
                }
            }
            if count > 0.0 {
                let mean = sum / count;
                out.push((sum_sq / count - mean * mean).max(0.0));
            } else {
                out.push(0.0);
            }
        }
    }
    out
}

/// Coarse texture/grain signal: mean absolute difference between
/// horizontally adjacent pixels. `None` when both images are grainless.
pub fn texture(a: &Raster, b: &Raster) -> Option<f64> {
    let ta = grain(a);
    let tb = grain(b);
    let max = ta.max(tb);
    if max < 0.5 {
        return None;
    }
    Some((1.0 - (ta - tb).abs() / max).clamp(0.0, 1.0))
}

fn grain(r: &Raster) -> f64 {
    let mut sum = 0.0;
    let mut count = 0.0;
    for y in 0..r.size {
        for x in 0..r.size - 1 {
            sum += (r.gray[r.idx(x + 1, y)] - r.gray[r.idx(x, y)]).abs();
            count += 1.0;
        }
    }
    if count > 0.0 {
        sum / count
    } else {
        0.0
    }
}

/// Left-right symmetry signal: how similarly symmetric the two images are.
/// Thrown pots photographed straight-on are strongly symmetric, handbuilt
/// pieces much less so. `None` when either image is flat.
pub fn symmetry(a: &Raster, b: &Raster) -> Option<f64> {
    let sa = mirror_correlation(a)?;
    let sb = mirror_correlation(b)?;
    Some((1.0 - (sa - sb).abs()).clamp(0.0, 1.0))
}

/// Pearson correlation between the left half and the mirrored right half,
/// mapped to `[0, 1]`. `None` when there is no variance to correlate.
fn mirror_correlation(r: &Raster) -> Option<f64> {
    let half = r.size / 2;
    let mut left = Vec::with_capacity((half * r.size) as usize);
    let mut right = Vec::with_capacity((half * r.size) as usize);
    for y in 0..r.size {
        for x in 0..half {
            left.push(r.gray[r.idx(x, y)]);
            right.push(r.gray[r.idx(r.size - 1 - x, y)]);
        }
    }

    let n = left.len() as f64;
    let mean_l = left.iter().sum::<f64>() / n;
    let mean_r = right.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_l = 0.0;
    let mut var_r = 0.0;
    for (&l, &x) in left.iter().zip(right.iter()) {
        cov += (l - mean_l) * (x - mean_r);
        var_l += (l - mean_l).powi(2);
        var_r += (x - mean_r).powi(2);
    }

    let denom = (var_l * var_r).sqrt();
    if denom < 1e-9 {
        return None;
    }
    Some(((cov / denom) + 1.0) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn raster_from(img: &RgbaImage) -> Raster {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        Raster::decode(buf.get_ref(), 96).unwrap()
    }

    fn flat(r: u8, g: u8, b: u8) -> Raster {
        raster_from(&RgbaImage::from_pixel(96, 96, Rgba([r, g, b, 255])))
    }

    /// White canvas with a centered dark disc of the given radius.
    fn disc(radius: i32) -> Raster {
        let img = RgbaImage::from_fn(96, 96, |x, y| {
            let dx = x as i32 - 48;
            let dy = y as i32 - 48;
            if dx * dx + dy * dy <= radius * radius {
                Rgba([40, 40, 40, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        });
        raster_from(&img)
    }

    /// White canvas with a centered dark square.
    fn square(half_side: i32) -> Raster {
        let img = RgbaImage::from_fn(96, 96, |x, y| {
            let dx = (x as i32 - 48).abs();
            let dy = (y as i32 - 48).abs();
            if dx <= half_side && dy <= half_side {
                Rgba([40, 40, 40, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        });
        raster_from(&img)
    }

    #[test]
    fn test_histogram_identical_is_one() {
        let a = flat(120, 60, 200);
        assert!((histogram(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_disjoint_is_zero() {
        let black = flat(0, 0, 0);
        let white = flat(255, 255, 255);
        assert!(histogram(&black, &white) < 1e-9);
    }

    #[test]
    fn test_structure_identical_is_one() {
        let a = disc(30);
        assert!(structure(&a, &a) > 0.999);
    }

    #[test]
    fn test_structure_black_vs_white_near_zero() {
        let black = flat(0, 0, 0);
        let white = flat(255, 255, 255);
        assert!(structure(&black, &white) < 0.01);
    }

    #[test]
    fn test_mean_color_black_white_is_zero() {
        let black = flat(0, 0, 0);
        let white = flat(255, 255, 255);
        assert!(mean_color(&black, &white) < 1e-6);
    }

    #[test]
    fn test_mean_color_identical_is_one() {
        let a = flat(90, 140, 30);
        assert!((mean_color(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_color_sweep_tolerates_brightness_shift() {
        let base = flat(120, 90, 60);
        let brighter = flat(135, 105, 75); // +15 on every channel
        let shifted = color_sweep(&base, &brighter);
        let unrelated = color_sweep(&base, &flat(10, 10, 200));
        assert!(shifted > 0.9, "shifted overlap was {}", shifted);
        assert!(unrelated < 0.1, "unrelated overlap was {}", unrelated);
    }

    #[test]
    fn test_contour_flat_is_uninformative() {
        let a = flat(200, 30, 30);
        let b = flat(30, 30, 200);
        assert!(contour(&a, &b).is_none());
    }

    #[test]
    fn test_contour_same_shape_beats_different_shape() {
        let a = disc(30);
        let b = disc(30);
        let c = square(26);
        let same = contour(&a, &b).unwrap();
        let diff = contour(&a, &c).unwrap();
        assert!(same > 0.999);
        assert!(same >= diff);
    }

    #[test]
    fn test_pattern_flat_is_uninformative() {
        assert!(pattern(&flat(0, 0, 0), &flat(255, 255, 255)).is_none());
    }

    #[test]
    fn test_pattern_identical_is_one() {
        let a = disc(25);
        assert!((pattern(&a, &a).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_texture_flat_is_uninformative() {
        assert!(texture(&flat(10, 10, 10), &flat(200, 200, 200)).is_none());
    }

    #[test]
    fn test_symmetry_flat_is_uninformative() {
        assert!(symmetry(&flat(10, 10, 10), &flat(10, 10, 10)).is_none());
    }

    #[test]
    fn test_symmetry_identical_is_one() {
        let a = disc(30);
        assert!((symmetry(&a, &a).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_signals_in_unit_interval() {
        let pairs = [
            (flat(0, 0, 0), flat(255, 255, 255)),
            (disc(30), square(26)),
            (disc(10), flat(200, 30, 30)),
        ];
        for (a, b) in &pairs {
            for value in [
                Some(histogram(a, b)),
                Some(structure(a, b)),
                Some(mean_color(a, b)),
                Some(color_sweep(a, b)),
                contour(a, b),
                pattern(a, b),
                texture(a, b),
                symmetry(a, b),
            ]
            .into_iter()
            .flatten()
            {
                assert!((0.0..=1.0).contains(&value), "signal out of range: {}", value);
            }
        }
    }
}
