//! Depth stepping and seam overlap

use crate::geometry::{distance, Coord};

/// Depths for successive passes down to `z_cut`.
///
/// Each step is at most `depth_per_cut`, the depths strictly decrease and
/// the last one is exactly `z_cut`. A non-positive `depth_per_cut` means a
/// single pass.
pub fn depth_passes(z_cut: f64, depth_per_cut: f64) -> Vec<f64> {
    let total = z_cut.abs();
    if depth_per_cut <= 0.0 || depth_per_cut >= total {
        return vec![z_cut];
    }
    let sign = if z_cut < 0.0 { -1.0 } else { 1.0 };
    let count = (total / depth_per_cut - 1e-9).ceil() as usize;
    (1..count)
        .map(|k| sign * k as f64 * depth_per_cut)
        .chain(std::iter::once(z_cut))
        .collect()
}

/// Walk `length` along `points` starting from `from`; returns the visited
/// vertices and the final interpolated point
fn walk(
    from: Coord<f64>,
    points: impl Iterator<Item = Coord<f64>>,
    length: f64,
) -> Vec<Coord<f64>> {
    let mut out = Vec::new();
    let mut cursor = from;
    let mut left = length;
    for next in points {
        let step = distance(cursor, next);
        if step >= left {
            let t = if step > 0.0 { left / step } else { 0.0 };
            out.push(Coord {
                x: cursor.x + (next.x - cursor.x) * t,
                y: cursor.y + (next.y - cursor.y) * t,
            });
            return out;
        }
        out.push(next);
        left -= step;
        cursor = next;
    }
    out
}

/// Extra moves that re-cut the seam of a closed path.
///
/// The tool sits at the start point after the loop. It backs up
/// `length / 2` along the closing edges, returns through the start and
/// continues `length / 2` along the first edges. With `length` zero it
/// re-cuts from the start through the next vertex. Open paths get nothing.
pub fn extracut_path(path: &[Coord<f64>], length: f64) -> Vec<Coord<f64>> {
    let n = path.len();
    if n < 3 || path[0] != path[n - 1] {
        return Vec::new();
    }
    let start = path[0];
    if length <= 0.0 {
        return vec![path[1]];
    }
    let half = length / 2.0;
    let behind = walk(start, path[..n - 1].iter().rev().copied(), half);
    let ahead = walk(start, path[1..].iter().copied(), half);

    let mut moves = behind.clone();
    moves.extend(behind.iter().rev().skip(1).copied());
    moves.push(start);
    moves.extend(ahead);
    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_depth_passes() {
        let passes = depth_passes(-0.25, 0.1);
        assert_eq!(passes.len(), 3);
        assert!((passes[0] + 0.1).abs() < 1e-12);
        assert!((passes[1] + 0.2).abs() < 1e-12);
        assert_eq!(passes[2], -0.25);
    }

    #[test]
    fn test_depth_passes_exact_multiple() {
        let passes = depth_passes(-0.3, 0.1);
        assert_eq!(passes.len(), 3);
        assert_eq!(*passes.last().unwrap(), -0.3);
        assert!(passes.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_single_pass() {
        assert_eq!(depth_passes(-0.1, 0.0), vec![-0.1]);
        assert_eq!(depth_passes(-0.1, 0.5), vec![-0.1]);
    }

    #[test]
    fn test_extracut_square() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let moves = extracut_path(&ring, 1.0);
        assert_eq!(moves, vec![c(0.0, 0.5), c(0.0, 0.0), c(0.5, 0.0)]);
    }

    #[test]
    fn test_extracut_spans_vertices() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        let moves = extracut_path(&ring, 3.0);
        assert_eq!(
            moves,
            vec![
                c(0.0, 1.0),
                c(0.5, 1.0),
                c(0.0, 1.0),
                c(0.0, 0.0),
                c(1.0, 0.0),
                c(1.0, 0.5)
            ]
        );
    }

    #[test]
    fn test_extracut_zero_length() {
        let ring = vec![c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 0.0)];
        assert_eq!(extracut_path(&ring, 0.0), vec![c(2.0, 0.0)]);
    }

    #[test]
    fn test_extracut_open_path() {
        assert!(extracut_path(&[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)], 1.0).is_empty());
    }
}
