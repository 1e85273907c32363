//! Matching utilities for associating detections with live tracks.

use nalgebra::Point2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Cost used for padding and for pairs outside the distance gate.
const GATED_COST: f64 = 1e6;

/// Strategy used to assign detections to live tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationMethod {
    /// Confidence-ordered greedy nearest neighbour.
    #[default]
    Greedy,
    /// Globally minimal total center distance (Jonker-Volgenant).
    Optimal,
}

/// Euclidean distance matrix of shape (tracks, detections) between centers.
pub fn center_distance(track_centers: &[Point2<f32>], det_centers: &[Point2<f32>]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_centers.len(), det_centers.len()));
    for (i, t) in track_centers.iter().enumerate() {
        for (j, d) in det_centers.iter().enumerate() {
            dists[[i, j]] = nalgebra::distance(t, d);
        }
    }
    dists
}

/// Detection indices ordered by descending confidence. Equal confidences
/// keep their original order.
pub fn confidence_order(confidences: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..confidences.len()).collect();
    order.sort_by(|&a, &b| confidences[b].total_cmp(&confidences[a]));
    order
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// (track row, detection column) pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_rows: usize, num_cols: usize) -> Self {
        let mut track_used = vec![false; num_rows];
        let mut det_used = vec![false; num_cols];
        for &(row, col) in &matches {
            track_used[row] = true;
            det_used[col] = true;
        }
        let unmatched = |used: Vec<bool>| {
            used.iter()
                .enumerate()
                .filter_map(|(i, &u)| if u { None } else { Some(i) })
                .collect()
        };
        Self {
            matches,
            unmatched_tracks: unmatched(track_used),
            unmatched_detections: unmatched(det_used),
        }
    }
}

/// Greedy nearest-neighbour assignment.
///
/// Detections are visited in `det_order`; each takes the closest track not
/// yet taken whose distance is within `max_distance`. Rows are expected in
/// ascending track id order, so equal distances go to the lower id.
pub fn greedy_assignment(
    dists: &Array2<f32>,
    det_order: &[usize],
    max_distance: f32,
) -> AssignmentResult {
    let (num_rows, num_cols) = dists.dim();
    let mut taken = vec![false; num_rows];
    let mut matches = Vec::new();

    for &col in det_order {
        let mut best: Option<(usize, f32)> = None;
        for row in 0..num_rows {
            if taken[row] {
                continue;
            }
            let dist = dists[[row, col]];
            // NaN never passes the gate
            if dist.is_nan() || dist > max_distance {
                continue;
            }
            if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((row, dist));
            }
        }
        if let Some((row, _)) = best {
            taken[row] = true;
            matches.push((row, col));
        }
    }

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

/// Globally optimal assignment over a gated distance matrix.
pub fn linear_assignment(dists: &Array2<f32>, max_distance: f32) -> AssignmentResult {
    let (num_rows, num_cols) = dists.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult::from_matches(Vec::new(), num_rows, num_cols);
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), GATED_COST);

    for i in 0..num_rows {
        for j in 0..num_cols {
            let dist = dists[[i, j]];
            if dist <= max_distance {
                padded[[i, j]] = dist as f64;
            }
        }
    }

    let mut matches = Vec::new();
    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
                if col < num_cols && dists[[row, col]] <= max_distance {
                    matches.push((row, col));
                }
            }
        }
        Err(_) => {
            tracing::warn!("linear assignment failed, treating all pairs as unmatched");
        }
    }

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point2<f32> {
        Point2::new(x, y)
    }

    #[test]
    fn test_center_distance() {
        let d = center_distance(&[p(0.0, 0.0)], &[p(3.0, 4.0), p(0.0, 1.0)]);
        assert_eq!(d.dim(), (1, 2));
        assert!((d[[0, 0]] - 5.0).abs() < 1e-6);
        assert!((d[[0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_order_is_stable() {
        assert_eq!(confidence_order(&[0.5, 0.9, 0.5, 0.7]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_greedy_confident_detection_chooses_first() {
        // one track at x=0; detection 0 (low conf) is closer, detection 1 wins anyway
        let dists = center_distance(&[p(0.0, 0.0)], &[p(1.0, 0.0), p(5.0, 0.0)]);
        let order = confidence_order(&[0.6, 0.9]);
        let result = greedy_assignment(&dists, &order, 50.0);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0]);
        assert!(result.unmatched_tracks.is_empty());
    }

    #[test]
    fn test_greedy_tie_goes_to_lower_row() {
        let dists = center_distance(&[p(-5.0, 0.0), p(5.0, 0.0)], &[p(0.0, 0.0)]);
        let result = greedy_assignment(&dists, &[0], 50.0);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
    }

    #[test]
    fn test_greedy_respects_gate() {
        let dists = center_distance(&[p(0.0, 0.0)], &[p(100.0, 0.0)]);
        let result = greedy_assignment(&dists, &[0], 50.0);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_greedy_gate_rejects_nan_distance() {
        let dists = center_distance(&[p(0.0, 0.0)], &[p(f32::NAN, 0.0), p(3.0, 4.0)]);
        let result = greedy_assignment(&dists, &[0, 1], 50.0);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_linear_assignment_minimises_total_distance() {
        // greedy would give det 0 -> track 1 (dist 1) and leave det 1 outside
        // the gate of track 0; the optimal pairing keeps both matched
        let tracks = [p(0.0, 0.0), p(10.0, 0.0)];
        let dets = [p(9.0, 0.0), p(19.0, 0.0)];
        let dists = center_distance(&tracks, &dets);
        let mut result = linear_assignment(&dists, 12.0);
        result.matches.sort();
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_linear_assignment_empty() {
        let dists = Array2::<f32>::zeros((0, 2));
        let result = linear_assignment(&dists, 10.0);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![0, 1]);
    }
}
