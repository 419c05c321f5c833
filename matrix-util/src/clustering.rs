//! K-means clustering of matrix rows
//!
//! Lloyd iterations from a k-means++ initialization; every random
//! choice comes from a generator seeded by `KmeansArgs::seed`.

use log::debug;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Random seed for the k-means++ initialization
    pub seed: u64,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 100,
            seed: 42,
        }
    }
}

impl KmeansArgs {
    /// Create args with specified number of clusters
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }
}

pub struct KmeansOut {
    /// cluster assignment of each row
    pub membership: Vec<usize>,
    /// cluster centroids (k x d)
    pub centroids: DMatrix<f32>,
}

/// Trait for k-means clustering on matrices
pub trait Kmeans {
    /// Cluster rows
    ///
    /// # Arguments
    /// * `args` - Clustering parameters
    ///
    /// # Returns
    /// Cluster assignments, one per row, and the centroids
    fn kmeans_rows(&self, args: &KmeansArgs) -> anyhow::Result<KmeansOut>;
}

fn squared_distance(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

fn nearest(x: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(k, c)| (k, squared_distance(x, c)))
        .fold((0, f32::INFINITY), |best, cur| {
            if cur.1 < best.1 {
                cur
            } else {
                best
            }
        })
}

fn kmeans_plus_plus(points: &[Vec<f32>], kk: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let nn = points.len();
    let mut centroids = Vec::with_capacity(kk);
    centroids.push(points[rng.random_range(0..nn)].clone());

    while centroids.len() < kk {
        let d2 = points
            .par_iter()
            .map(|x| nearest(x, &centroids).1 as f64)
            .collect::<Vec<_>>();
        let tot: f64 = d2.iter().sum();

        let next = if tot > 0. {
            let u = rng.random::<f64>() * tot;
            let mut acc = 0.;
            let mut chosen = nn - 1;
            for (i, &d) in d2.iter().enumerate() {
                acc += d;
                if acc >= u && d > 0. {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.random_range(0..nn)
        };
        centroids.push(points[next].clone());
    }
    centroids
}

impl Kmeans for DMatrix<f32> {
    fn kmeans_rows(&self, args: &KmeansArgs) -> anyhow::Result<KmeansOut> {
        let (nn, dd) = self.shape();
        let kk = args.num_clusters;

        if kk == 0 {
            return Err(anyhow::anyhow!("number of clusters must be positive"));
        }

        if nn < kk {
            return Err(anyhow::anyhow!(
                "cannot make {} clusters out of {} rows",
                kk,
                nn
            ));
        }

        let points: Vec<Vec<f32>> = self
            .row_iter()
            .map(|x| x.iter().copied().collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(args.seed);
        let mut centroids = kmeans_plus_plus(&points, kk, &mut rng);
        let mut membership = vec![usize::MAX; nn];

        for iter in 0..args.max_iter.max(1) {
            let assigned = points
                .par_iter()
                .map(|x| nearest(x, &centroids))
                .collect::<Vec<_>>();

            let changed = assigned
                .iter()
                .zip(membership.iter())
                .filter(|(a, m)| a.0 != **m)
                .count();

            membership = assigned.iter().map(|&(k, _)| k).collect();

            let mut sums = vec![vec![0_f32; dd]; kk];
            let mut counts = vec![0_usize; kk];
            for (x, &k) in points.iter().zip(membership.iter()) {
                counts[k] += 1;
                for (s, v) in sums[k].iter_mut().zip(x.iter()) {
                    *s += v;
                }
            }

            for k in 0..kk {
                if counts[k] > 0 {
                    centroids[k] = sums[k].iter().map(|s| s / counts[k] as f32).collect();
                } else {
                    // re-seed an empty cluster with the worst-fitted row
                    let (far, _) = assigned.iter().enumerate().fold(
                        (0, f32::NEG_INFINITY),
                        |best, (i, &(_, d))| if d > best.1 { (i, d) } else { best },
                    );
                    centroids[k] = points[far].clone();
                }
            }

            if changed == 0 {
                debug!("k-means converged after {} iterations", iter + 1);
                break;
            }
        }

        let centroids =
            DMatrix::<f32>::from_row_iterator(kk, dd, centroids.into_iter().flatten());

        Ok(KmeansOut {
            membership,
            centroids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_rows_single_cluster() -> anyhow::Result<()> {
        let mat = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        let out = mat.kmeans_rows(&KmeansArgs::with_clusters(1))?;

        assert_eq!(out.membership.len(), 4);
        assert!(out.membership.iter().all(|&x| x == 0));
        approx::assert_abs_diff_eq!(out.centroids[(0, 0)], 4.0, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(out.centroids[(0, 1)], 5.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_kmeans_rows() -> anyhow::Result<()> {
        // Create data with 2 clear row clusters
        let mat = DMatrix::from_row_slice(
            4,
            2,
            &[
                0.0, 0.0, // row 0 - cluster A
                0.1, 0.1, // row 1 - cluster A
                10.0, 10.0, // row 2 - cluster B
                10.1, 10.1, // row 3 - cluster B
            ],
        );

        let out = mat.kmeans_rows(&KmeansArgs::with_clusters(2))?;
        let membership = out.membership;

        assert_eq!(membership.len(), 4);

        // First 2 rows should be in same cluster
        assert_eq!(membership[0], membership[1]);

        // Last 2 rows should be in same cluster
        assert_eq!(membership[2], membership[3]);

        // Two groups should be different
        assert_ne!(membership[0], membership[2]);
        Ok(())
    }

    #[test]
    fn test_kmeans_is_seeded() -> anyhow::Result<()> {
        let mat = DMatrix::<f32>::from_fn(30, 3, |i, j| ((i * 7 + j * 3) % 11) as f32);
        let args = KmeansArgs {
            num_clusters: 3,
            max_iter: 50,
            seed: 18,
        };
        let a = mat.kmeans_rows(&args)?;
        let b = mat.kmeans_rows(&args)?;
        assert_eq!(a.membership, b.membership);
        Ok(())
    }

    #[test]
    fn test_kmeans_too_many_clusters() {
        let mat: DMatrix<f32> = DMatrix::zeros(2, 2);
        assert!(mat.kmeans_rows(&KmeansArgs::with_clusters(3)).is_err());
        assert!(mat.kmeans_rows(&KmeansArgs::with_clusters(0)).is_err());
    }
}
