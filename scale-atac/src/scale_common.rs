pub use log::{debug, info};

pub type Mat = nalgebra::DMatrix<f32>;

pub use candle_util::{candle_core, candle_nn};
pub use matrix_util::common_io::Delimiter;
pub use matrix_util::traits::{ConvertMatOps, IoOps, MatWithNames};
