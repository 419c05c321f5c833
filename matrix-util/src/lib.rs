pub mod clustering;
pub mod common_io;
pub mod dmatrix_io;
pub mod dmatrix_util;
pub mod gaussian_mixture;
pub mod traits;
pub mod utils;
