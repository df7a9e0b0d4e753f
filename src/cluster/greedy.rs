//! Greedy distance-threshold grouping. Used when the density pass is
//! unavailable; shapes differ but the same weight floor applies.

use super::ClusterPoint;
use crate::location::haversine_km;

pub fn greedy(points: &[ClusterPoint], eps_km: f64, min_samples: usize) -> Vec<Vec<usize>> {
    // Heaviest seeds first; ties by id for determinism.
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[b]
            .weight
            .cmp(&points[a].weight)
            .then_with(|| points[a].id.cmp(&points[b].id))
    });

    let mut taken = vec![false; points.len()];
    let mut clusters = Vec::new();

    for &seed in &order {
        if taken[seed] {
            continue;
        }
        let mut group: Vec<usize> = (0..points.len())
            .filter(|&j| !taken[j] && haversine_km(points[seed].point, points[j].point) <= eps_km)
            .collect();
        let weight: usize = group.iter().map(|&j| points[j].weight).sum();
        if weight < min_samples {
            continue;
        }
        for &j in &group {
            taken[j] = true;
        }
        group.sort_unstable();
        clusters.push(group);
    }

    clusters.sort_by_key(|g| g[0]);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeoPoint;

    fn pt(id: &str, lat: f64, lon: f64, weight: usize) -> ClusterPoint {
        ClusterPoint {
            id: id.into(),
            point: GeoPoint::new(lat, lon),
            weight,
        }
    }

    #[test]
    fn respects_floor() {
        let pts = vec![
            pt("a", 39.78, -89.65, 2),
            pt("b", 39.80, -89.60, 2),
            pt("c", 40.69, -89.59, 4),
        ];
        assert!(greedy(&pts, 10.0, 5).is_empty());
        assert_eq!(greedy(&pts, 10.0, 4), vec![vec![0, 1], vec![2]]);
    }
}
