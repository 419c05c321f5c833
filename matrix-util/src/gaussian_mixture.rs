//! Gaussian mixture with diagonal covariances fitted by EM
//!
//! The EM starts from the hard assignments of a seeded k-means run,
//! so a fixed seed gives a fixed fit.

use crate::clustering::{Kmeans, KmeansArgs};
use log::info;
use nalgebra::DMatrix;
use rayon::prelude::*;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Options for the mixture fit
#[derive(Debug, Clone)]
pub struct GmmArgs {
    /// Number of mixture components
    pub num_components: usize,
    /// Maximum number of EM iterations. Default: 100
    pub max_iter: usize,
    /// Stop when the mean log-likelihood improves less than this. Default: 1e-3
    pub tol: f64,
    /// Added to every variance. Default: 1e-6
    pub reg_covar: f64,
    /// Seed of the k-means initialization. Default: 42
    pub seed: u64,
}

impl Default for GmmArgs {
    fn default() -> Self {
        GmmArgs {
            num_components: 1,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: 42,
        }
    }
}

/// A fitted mixture
#[derive(Debug, Clone)]
pub struct DiagGaussianMixture {
    /// mixture weights (k)
    pub weights: Vec<f64>,
    /// component means (k x d)
    pub means: DMatrix<f64>,
    /// component variances (k x d)
    pub variances: DMatrix<f64>,
    /// mean log-likelihood per row at the last E-step
    pub log_likelihood: f64,
    pub converged: bool,
}

impl DiagGaussianMixture {
    /// Fit a `args.num_components` mixture to the rows of `xx`
    pub fn fit(xx: &DMatrix<f32>, args: &GmmArgs) -> anyhow::Result<Self> {
        let (nn, dd) = xx.shape();
        let kk = args.num_components;

        let km = xx.kmeans_rows(&KmeansArgs {
            num_clusters: kk,
            max_iter: 100,
            seed: args.seed,
        })?;

        let xx = xx.map(|x| x as f64);

        let mut resp = DMatrix::<f64>::zeros(nn, kk);
        for (i, &k) in km.membership.iter().enumerate() {
            resp[(i, k)] = 1.;
        }

        let mut gmm = DiagGaussianMixture {
            weights: vec![1. / kk as f64; kk],
            means: DMatrix::<f64>::zeros(kk, dd),
            variances: DMatrix::<f64>::from_element(kk, dd, 1.),
            log_likelihood: f64::NEG_INFINITY,
            converged: false,
        };

        gmm.maximization(&xx, &resp, args.reg_covar);

        for iter in 0..args.max_iter {
            let (log_resp, llik) = gmm.log_responsibility(&xx);
            resp = log_resp.map(f64::exp);
            gmm.maximization(&xx, &resp, args.reg_covar);

            let delta = llik - gmm.log_likelihood;
            gmm.log_likelihood = llik;

            if delta.abs() < args.tol {
                gmm.converged = true;
                info!("GMM converged after {} iterations, llik = {:.4}", iter + 1, llik);
                break;
            }
        }

        if !gmm.converged {
            info!(
                "GMM did not converge in {} iterations, llik = {:.4}",
                args.max_iter, gmm.log_likelihood
            );
        }

        Ok(gmm)
    }

    pub fn num_components(&self) -> usize {
        self.weights.len()
    }

    /// Most likely component of each row
    pub fn predict(&self, xx: &DMatrix<f32>) -> Vec<usize> {
        let (log_resp, _) = self.log_responsibility(&xx.map(|x| x as f64));
        log_resp
            .row_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &v)| {
                        if v > best.1 {
                            (k, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }

    /// E-step: log responsibilities (n x k) and mean log-likelihood
    fn log_responsibility(&self, xx: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
        let (nn, dd) = xx.shape();
        let kk = self.num_components();

        let log_weights = self.weights.iter().map(|w| w.ln()).collect::<Vec<_>>();

        let rows = (0..nn)
            .into_par_iter()
            .map(|i| {
                let log_joint = (0..kk)
                    .map(|k| {
                        let mut quad = 0.;
                        for j in 0..dd {
                            let v = self.variances[(k, j)];
                            let d = xx[(i, j)] - self.means[(k, j)];
                            quad += LN_2PI + v.ln() + d * d / v;
                        }
                        log_weights[k] - 0.5 * quad
                    })
                    .collect::<Vec<_>>();

                let max_val = log_joint.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let log_norm =
                    max_val + log_joint.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();

                (
                    log_joint.into_iter().map(|v| v - log_norm).collect::<Vec<_>>(),
                    log_norm,
                )
            })
            .collect::<Vec<_>>();

        let llik = rows.iter().map(|(_, l)| l).sum::<f64>() / nn.max(1) as f64;
        let log_resp =
            DMatrix::<f64>::from_row_iterator(nn, kk, rows.into_iter().flat_map(|(r, _)| r));
        (log_resp, llik)
    }

    /// M-step given responsibilities (n x k)
    fn maximization(&mut self, xx: &DMatrix<f64>, resp: &DMatrix<f64>, reg_covar: f64) {
        let (nn, dd) = xx.shape();
        let kk = self.num_components();

        for k in 0..kk {
            let r_k = resp.column(k);
            let n_k = r_k.sum() + 10. * f64::EPSILON;

            self.weights[k] = n_k / nn as f64;

            for j in 0..dd {
                let x_j = xx.column(j);
                let mean = r_k.dot(&x_j) / n_k;
                let mean_sq = r_k.dot(&x_j.component_mul(&x_j)) / n_k;
                self.means[(k, j)] = mean;
                self.variances[(k, j)] = (mean_sq - mean * mean).max(0.) + reg_covar;
            }
        }

        let tot: f64 = self.weights.iter().sum();
        self.weights.iter_mut().for_each(|w| *w /= tot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_blobs() -> DMatrix<f32> {
        // 20 rows around (0,0) and 10 rows around (8,8)
        DMatrix::<f32>::from_fn(30, 2, |i, j| {
            let jitter = ((i * 13 + j * 5) % 7) as f32 * 0.1 - 0.3;
            if i < 20 {
                jitter
            } else {
                8. + jitter
            }
        })
    }

    #[test]
    fn recovers_two_components() -> anyhow::Result<()> {
        let xx = two_blobs();
        let gmm = DiagGaussianMixture::fit(
            &xx,
            &GmmArgs {
                num_components: 2,
                seed: 18,
                ..Default::default()
            },
        )?;

        let labels = gmm.predict(&xx);
        assert!(labels[..20].iter().all(|&k| k == labels[0]));
        assert!(labels[20..].iter().all(|&k| k == labels[20]));
        assert_ne!(labels[0], labels[20]);

        let big = labels[0];
        assert_abs_diff_eq!(gmm.weights[big], 2. / 3., epsilon = 1e-3);
        assert_abs_diff_eq!(gmm.weights.iter().sum::<f64>(), 1., epsilon = 1e-9);
        assert!(gmm.variances.iter().all(|&v| v > 0.));
        Ok(())
    }

    #[test]
    fn same_seed_same_fit() -> anyhow::Result<()> {
        let xx = two_blobs();
        let args = GmmArgs {
            num_components: 3,
            seed: 7,
            ..Default::default()
        };
        let a = DiagGaussianMixture::fit(&xx, &args)?;
        let b = DiagGaussianMixture::fit(&xx, &args)?;
        assert_eq!(a.means, b.means);
        assert_eq!(a.predict(&xx), b.predict(&xx));
        Ok(())
    }
}
