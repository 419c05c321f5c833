use crate::common_io::{read_delimited_with_header, write_lines, DelimitedLines, Delimiter};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use std::fmt::Display;
use std::str::FromStr;

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Send + Sync + FromStr + Display + Copy,
    <T as FromStr>::Err: Display,
{
    type Scalar = T;
    type Mat = Self;

    fn read_data_with_names(
        file_path: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let DelimitedLines { header, rows: lines } = read_delimited_with_header(file_path, delim)?;

        let first = lines
            .first()
            .ok_or(anyhow::anyhow!("no data rows in {}", file_path))?;

        if first.len() < 2 {
            return Err(anyhow::anyhow!(
                "{}: need a row name and at least one value per line",
                file_path
            ));
        }

        let ncols = first.len() - 1;

        // the header may or may not label the row-name column
        let cols: Vec<Box<str>> = if header.len() == ncols {
            header
        } else if header.len() == ncols + 1 {
            header[1..].to_vec()
        } else {
            return Err(anyhow::anyhow!(
                "{}: header has {} fields but rows have {} values",
                file_path,
                header.len(),
                ncols
            ));
        };

        let parsed = lines
            .par_iter()
            .enumerate()
            .map(|(i, words)| -> anyhow::Result<(Box<str>, Vec<T>)> {
                if words.len() != ncols + 1 {
                    return Err(anyhow::anyhow!(
                        "{}: data row {} has {} fields, expected {}",
                        file_path,
                        i + 1,
                        words.len(),
                        ncols + 1
                    ));
                }
                let values = words[1..]
                    .iter()
                    .map(|w| {
                        w.parse::<T>().map_err(|e| {
                            anyhow::anyhow!(
                                "{}: data row {}: cannot parse `{}`: {}",
                                file_path,
                                i + 1,
                                w,
                                e
                            )
                        })
                    })
                    .collect::<anyhow::Result<Vec<T>>>()?;
                Ok((words[0].clone(), values))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let nrows = parsed.len();
        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);
        for (name, values) in parsed {
            rows.push(name);
            data.extend(values);
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()> {
        if row_names.len() != self.nrows() {
            return Err(anyhow::anyhow!(
                "{} row names for {} rows",
                row_names.len(),
                self.nrows()
            ));
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);

        if let Some(cols) = column_names {
            if cols.len() != self.ncols() {
                return Err(anyhow::anyhow!(
                    "{} column names for {} columns",
                    cols.len(),
                    self.ncols()
                ));
            }
            lines.push(cols.join(delim).into_boxed_str());
        }

        for (name, row) in row_names.iter().zip(self.row_iter()) {
            let mut line = name.to_string();
            for x in row.iter() {
                line.push_str(delim);
                line.push_str(&format!("{}", *x));
            }
            lines.push(line.into_boxed_str());
        }

        write_lines(&lines, file)?;
        Ok(())
    }
}
