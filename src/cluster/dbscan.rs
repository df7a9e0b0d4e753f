//! Weighted DBSCAN over location centroids.
//!
//! A location's weight is its record count. A point is core when the total
//! weight inside its `eps_km` neighbourhood (itself included) reaches
//! `min_samples`. Clusters whose final weight falls short are dropped, so
//! the floor holds even when border points were claimed elsewhere.

use std::collections::VecDeque;

use super::ClusterPoint;
use crate::error::PipelineError;
use crate::location::haversine_km;

pub fn dbscan(
    points: &[ClusterPoint],
    eps_km: f64,
    min_samples: usize,
    max_points: usize,
) -> Result<Vec<Vec<usize>>, PipelineError> {
    if points.len() > max_points {
        return Err(PipelineError::ClusteringUnavailable(format!(
            "{} locations exceed density limit {}",
            points.len(),
            max_points
        )));
    }

    let n = points.len();
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| haversine_km(points[i].point, points[j].point) <= eps_km)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours
        .iter()
        .map(|nb| nb.iter().map(|&j| points[j].weight).sum::<usize>() >= min_samples)
        .collect();

    let mut label: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for seed in 0..n {
        if label[seed].is_some() || !is_core[seed] {
            continue;
        }
        let cid = clusters.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([seed]);
        label[seed] = Some(cid);

        while let Some(p) = queue.pop_front() {
            members.push(p);
            if !is_core[p] {
                continue;
            }
            for &q in &neighbours[p] {
                if label[q].is_none() {
                    label[q] = Some(cid);
                    queue.push_back(q);
                }
            }
        }
        members.sort_unstable();
        clusters.push(members);
    }

    clusters.retain(|c| c.iter().map(|&i| points[i].weight).sum::<usize>() >= min_samples);
    Ok(clusters)
}
