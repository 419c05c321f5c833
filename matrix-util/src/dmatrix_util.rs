use crate::traits::ConvertMatOps;
use candle_util::candle_core::{Device, Tensor};
pub use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

impl ConvertMatOps for DMatrix<f32> {
    type Mat = Self;
    type Scalar = f32;

    /// 2d tensor (n x d) -> n x d matrix
    fn from_tensor(data: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrows, ncols) = data.dims2()?;
        let rows = data
            .to_device(&Device::Cpu)?
            .to_dtype(candle_util::candle_core::DType::F32)?
            .to_vec2::<f32>()?;
        Ok(DMatrix::<f32>::from_row_iterator(
            nrows,
            ncols,
            rows.into_iter().flatten(),
        ))
    }

    /// n x d matrix -> 2d tensor (n x d), row-major
    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor> {
        let (nrows, ncols) = self.shape();
        let rows = (0..nrows)
            .into_par_iter()
            .map(|i| self.row(i).iter().copied().collect::<Vec<f32>>())
            .collect::<Vec<_>>();
        let data = rows.into_iter().flatten().collect::<Vec<f32>>();
        Ok(Tensor::from_vec(data, (nrows, ncols), dev)?)
    }
}

/// Take a subset of rows in the given order
pub fn select_rows(xx: &DMatrix<f32>, rows: &[usize]) -> DMatrix<f32> {
    DMatrix::<f32>::from_fn(rows.len(), xx.ncols(), |i, j| xx[(rows[i], j)])
}

/// Index of the maximum of each row (ties broken by the first)
pub fn argmax_rows(xx: &DMatrix<f32>) -> Vec<usize> {
    xx.row_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_val), (j, &x)| {
                    if x > best_val {
                        (j, x)
                    } else {
                        (best, best_val)
                    }
                })
                .0
        })
        .collect()
}
