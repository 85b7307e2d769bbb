//! Polyline geometry over raw WGS84 coordinates. Route geometries come from
//! the same routing backend, so two routes covering the same road segment
//! carry the same vertices and overlap detection reduces to vertex identity
//! after quantization.

use std::collections::HashSet;

use liane_types::models::LatLng;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Vertex quantization tolerance in degrees, about 11 m at the equator.
const VERTEX_TOLERANCE_DEG: f64 = 1e-4;

/// Spatial pre-filter cell size in degrees, about 5.5 km.
const CELL_SIZE_DEG: f64 = 0.05;

/// Great-circle distance in meters.
pub fn haversine(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

pub fn polyline_length(line: &[LatLng]) -> f64 {
    line.windows(2).map(|w| haversine(w[0], w[1])).sum()
}

fn vertex_key(p: LatLng) -> (i64, i64) {
    (
        (p.lat / VERTEX_TOLERANCE_DEG).round() as i64,
        (p.lng / VERTEX_TOLERANCE_DEG).round() as i64,
    )
}

/// Longest contiguous run of vertices of `a` that also appear in `b`,
/// compared after quantization. A shared section needs at least two
/// vertices; anything shorter is treated as a crossing, not an overlap.
pub fn shared_subline(a: &[LatLng], b: &[LatLng]) -> Option<Vec<LatLng>> {
    let b_keys: HashSet<(i64, i64)> = b.iter().map(|p| vertex_key(*p)).collect();

    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;
    for (i, p) in a.iter().enumerate() {
        if b_keys.contains(&vertex_key(*p)) {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            let len = i - start;
            if best.is_none_or(|(_, l)| len > l) {
                best = Some((start, len));
            }
        }
    }
    if let Some(start) = run_start {
        let len = a.len() - start;
        if best.is_none_or(|(_, l)| len > l) {
            best = Some((start, len));
        }
    }

    let (start, len) = best?;
    if len < 2 {
        return None;
    }
    Some(a[start..start + len].to_vec())
}

/// Fraction of `line` covered by `shared`, in [0, 1].
pub fn overlap_score(line: &[LatLng], shared: &[LatLng]) -> f64 {
    let total = polyline_length(line);
    if total == 0.0 {
        return 0.0;
    }
    polyline_length(shared) / total
}

/// Coarse grid over one polyline's vertices. Candidate routes sharing no
/// cell neighborhood with it cannot share any quantized vertex, so they
/// are skipped before the per-vertex comparison.
pub struct GridIndex {
    cells: HashSet<(i64, i64)>,
}

impl GridIndex {
    pub fn from_polyline(line: &[LatLng]) -> Self {
        Self {
            cells: line.iter().map(|p| cell_of(*p)).collect(),
        }
    }

    pub fn may_overlap(&self, line: &[LatLng]) -> bool {
        // The 3x3 neighborhood covers vertices sitting on a cell boundary.
        line.iter().any(|p| {
            let (row, col) = cell_of(*p);
            (-1..=1).any(|dr| (-1..=1).any(|dc| self.cells.contains(&(row + dr, col + dc))))
        })
    }
}

fn cell_of(p: LatLng) -> (i64, i64) {
    (
        (p.lat / CELL_SIZE_DEG).floor() as i64,
        (p.lng / CELL_SIZE_DEG).floor() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equator_line(from_lng: f64, to_lng: f64) -> Vec<LatLng> {
        let steps = ((to_lng - from_lng) / 0.05).round() as usize;
        (0..=steps)
            .map(|i| LatLng::new(0.0, from_lng + i as f64 * 0.05))
            .collect()
    }

    #[test]
    fn haversine_one_degree_at_equator() {
        let d = haversine(LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn shared_subline_finds_common_section() {
        let a = equator_line(0.0, 1.0);
        let b = equator_line(0.6, 1.5);

        let shared = shared_subline(&a, &b).unwrap();
        assert!((shared[0].lng - 0.6).abs() < 1e-9);
        assert!((shared.last().unwrap().lng - 1.0).abs() < 1e-9);

        let score = overlap_score(&a, &shared);
        assert!((score - 0.4).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn shared_subline_is_asymmetric() {
        let a = equator_line(0.0, 1.0);
        let b = equator_line(0.6, 1.5);

        // b is the shorter route, so the shared section weighs more for it.
        let from_a = overlap_score(&a, &shared_subline(&a, &b).unwrap());
        let from_b = overlap_score(&b, &shared_subline(&b, &a).unwrap());
        assert!(from_b > from_a, "got {from_a} vs {from_b}");
    }

    #[test]
    fn disjoint_lines_do_not_overlap() {
        let a = equator_line(0.0, 1.0);
        let b = equator_line(2.0, 3.0);
        assert!(shared_subline(&a, &b).is_none());
    }

    #[test]
    fn single_shared_vertex_is_not_an_overlap() {
        let a = equator_line(0.0, 1.0);
        let b: Vec<LatLng> = (0..=10).map(|i| LatLng::new(i as f64 * 0.05, 0.5)).collect();
        assert!(shared_subline(&a, &b).is_none());
    }

    #[test]
    fn grid_index_prefilter() {
        let a = equator_line(0.0, 1.0);
        let index = GridIndex::from_polyline(&a);
        assert!(index.may_overlap(&equator_line(0.9, 2.0)));
        assert!(!index.may_overlap(&equator_line(5.0, 6.0)));
    }
}
