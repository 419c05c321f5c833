use crate::common_io::Delimiter;
use candle_util::candle_core::{Device, Tensor};

/// A matrix with row and column names
pub struct MatWithNames<Mat> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: Mat,
}

/// Reading off from `Tensor`
pub trait ConvertMatOps {
    type Mat;
    type Scalar;

    fn from_tensor(_: &Tensor) -> anyhow::Result<Self::Mat>;
    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor>;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a delimited matrix with a header line of column names
    /// and the row names in the first column. The header may or may
    /// not carry a label for the row-name column.
    fn read_data_with_names(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    /// Write with row names in the first column and, if given, a
    /// header line of column names
    fn write_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()>;
}
