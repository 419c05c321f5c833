use crate::scale_common::*;
use candle_core::Device;
use candle_util::candle_data_loader::InMemoryData;
use rayon::prelude::*;

pub struct ScaleInputArgs<'a> {
    /// peaks x cells, plain or gzipped
    pub file: &'a str,
    pub delim: Delimiter,
    /// keep this many of the most frequently open peaks
    pub input_dim: Option<usize>,
    pub gene_filter: bool,
    /// percentile `X` of the gene filter
    pub pct: f32,
    pub log_transform: bool,
}

/// Accessibility of cells (rows) over peaks (columns), each peak
/// scaled into [0, 1]
pub struct ScaleData {
    pub data: Mat,
    pub cells: Vec<Box<str>>,
    pub peaks: Vec<Box<str>>,
}

impl ScaleData {
    pub fn num_cells(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_peaks(&self) -> usize {
        self.data.ncols()
    }

    /// A minibatch loader over the cells
    pub fn to_loader(&self) -> anyhow::Result<InMemoryData> {
        InMemoryData::new(&self.data.to_tensor(&Device::Cpu)?)
    }
}

/// Read a peak-by-cell matrix and prepare it for the model:
///
/// 1. SC3-style gene filter (optional)
/// 2. `log2(x + 1)` (optional)
/// 3. keep the `input_dim` peaks open in the most cells (optional)
/// 4. scale each peak by its maximum absolute value
///
/// The result is transposed to cells x peaks.
pub fn read_scale_input(args: &ScaleInputArgs) -> anyhow::Result<ScaleData> {
    info!("Reading data file: {}", args.file);

    let MatWithNames {
        rows: mut peaks,
        cols: cells,
        mat: mut peak_cell,
    } = Mat::read_data_with_names(args.file, args.delim.clone())?;

    info!(
        "Read {} peaks x {} cells",
        peak_cell.nrows(),
        peak_cell.ncols()
    );

    if peak_cell.ncols() == 0 {
        return Err(anyhow::anyhow!("no cells in {}", args.file));
    }

    if args.gene_filter {
        let keep = sc3_gene_filter(&peak_cell, args.pct);
        info!(
            "Gene filter (X = {}): kept {} of {} peaks",
            args.pct,
            keep.len(),
            peaks.len()
        );
        (peak_cell, peaks) = subset_peaks(&peak_cell, &peaks, &keep);
    }

    if peak_cell.nrows() == 0 {
        return Err(anyhow::anyhow!("no peaks left in {}", args.file));
    }

    if args.log_transform {
        peak_cell.apply(|x| *x = (*x + 1.).log2());
    }

    if let Some(input_dim) = args.input_dim {
        let keep = most_open_peaks(&peak_cell, input_dim)?;
        (peak_cell, peaks) = subset_peaks(&peak_cell, &peaks, &keep);
    }

    scale_rows_by_max_abs(&mut peak_cell);

    Ok(ScaleData {
        data: peak_cell.transpose(),
        cells,
        peaks,
    })
}

/// Peaks passing the SC3 filter with percentile `pct`: open with a
/// value above one in more than `pct`% of the cells and open at all in
/// fewer than `(100 - pct)`% of them.
pub fn sc3_gene_filter(peak_cell: &Mat, pct: f32) -> Vec<usize> {
    let ncells = peak_cell.ncols() as f64;
    let pct = pct as f64;

    // compare 100 * count against pct * n to keep the bounds exact
    (0..peak_cell.nrows())
        .into_par_iter()
        .filter(|&i| {
            let row = peak_cell.row(i);
            let n_high = row.iter().filter(|&&x| x > 1.).count() as f64;
            let n_open = row.iter().filter(|&&x| x > 0.).count() as f64;
            100. * n_high > pct * ncells && 100. * n_open < (100. - pct) * ncells
        })
        .collect()
}

/// The `input_dim` peaks with the most non-zero cells, kept in file
/// order
pub fn most_open_peaks(peak_cell: &Mat, input_dim: usize) -> anyhow::Result<Vec<usize>> {
    let npeaks = peak_cell.nrows();

    if input_dim == 0 || input_dim > npeaks {
        return Err(anyhow::anyhow!(
            "input_dim {} is not in [1, {}]",
            input_dim,
            npeaks
        ));
    }

    let nnz: Vec<usize> = peak_cell
        .row_iter()
        .map(|row| row.iter().filter(|&&x| x != 0.).count())
        .collect();

    let mut order: Vec<usize> = (0..npeaks).collect();
    // stable: ties keep the file order
    order.sort_by(|&a, &b| nnz[b].cmp(&nnz[a]));
    order.truncate(input_dim);
    order.sort_unstable();
    Ok(order)
}

fn subset_peaks(peak_cell: &Mat, peaks: &[Box<str>], keep: &[usize]) -> (Mat, Vec<Box<str>>) {
    (
        matrix_util::dmatrix_util::select_rows(peak_cell, keep),
        keep.iter().map(|&i| peaks[i].clone()).collect(),
    )
}

fn scale_rows_by_max_abs(xx: &mut Mat) {
    for mut row in xx.row_iter_mut() {
        let max_abs = row.iter().fold(0_f32, |m, x| m.max(x.abs()));
        if max_abs > 0. {
            row /= max_abs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gene_filter_follows_sc3_rule() {
        // 10 cells; X = 20: need > 2 cells above one and < 8 cells open
        let peak_cell = Mat::from_row_slice(
            3,
            10,
            &[
                2., 2., 2., 0., 0., 0., 0., 0., 0., 0., // kept
                2., 2., 0., 0., 0., 0., 0., 0., 0., 0., // only 2 high
                2., 2., 2., 1., 1., 1., 1., 1., 0., 0., // open in 8 cells
            ],
        );
        assert_eq!(sc3_gene_filter(&peak_cell, 20.), vec![0]);
    }

    #[test]
    fn most_open_peaks_keeps_file_order() -> anyhow::Result<()> {
        let peak_cell = Mat::from_row_slice(
            4,
            3,
            &[
                1., 0., 0., //
                1., 1., 1., //
                0., 1., 0., //
                1., 1., 0., //
            ],
        );
        assert_eq!(most_open_peaks(&peak_cell, 2)?, vec![1, 3]);
        assert_eq!(most_open_peaks(&peak_cell, 3)?, vec![0, 1, 3]);
        assert!(most_open_peaks(&peak_cell, 0).is_err());
        assert!(most_open_peaks(&peak_cell, 5).is_err());
        Ok(())
    }

    #[test]
    fn rows_scale_into_unit_interval() {
        let mut xx = Mat::from_row_slice(2, 3, &[0., 2., 4., 0., 0., 0.]);
        scale_rows_by_max_abs(&mut xx);
        assert_eq!(xx, Mat::from_row_slice(2, 3, &[0., 0.5, 1., 0., 0., 0.]));
    }

    fn write_peak_cell(dir: &std::path::Path, lines: &[&str]) -> anyhow::Result<String> {
        let file = dir.join("peaks.txt");
        std::fs::write(&file, lines.join("\n"))?;
        file.to_str()
            .map(|s| s.to_string())
            .ok_or(anyhow::anyhow!("bad path"))
    }

    fn input_args(file: &str) -> ScaleInputArgs<'_> {
        ScaleInputArgs {
            file,
            delim: Delimiter::from("\t"),
            input_dim: None,
            gene_filter: false,
            pct: 6.,
            log_transform: false,
        }
    }

    #[test]
    fn log_transform_then_scale() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = write_peak_cell(dir.path(), &["c0\tc1\tc2", "p0\t0\t1\t3", "p1\t2\t0\t2"])?;

        let data = read_scale_input(&ScaleInputArgs {
            log_transform: true,
            ..input_args(&file)
        })?;

        assert_eq!(data.num_cells(), 3);
        assert_eq!(data.num_peaks(), 2);
        let p0: Vec<f32> = data.data.column(0).iter().copied().collect();
        assert_eq!(p0, vec![0., 0.5, 1.]);
        let p1: Vec<f32> = data.data.column(1).iter().copied().collect();
        assert_eq!(p1, vec![1., 0., 1.]);
        Ok(())
    }

    #[test]
    fn input_dim_keeps_most_open_peaks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = write_peak_cell(
            dir.path(),
            &[
                "c0\tc1\tc2",
                "p0\t1\t0\t0",
                "p1\t1\t1\t1",
                "p2\t0\t2\t0",
                "p3\t4\t2\t0",
            ],
        )?;

        let data = read_scale_input(&ScaleInputArgs {
            input_dim: Some(2),
            ..input_args(&file)
        })?;

        let peaks: Vec<&str> = data.peaks.iter().map(|p| &**p).collect();
        assert_eq!(peaks, vec!["p1", "p3"]);
        assert_eq!(data.data, Mat::from_row_slice(3, 2, &[1., 1., 1., 0.5, 1., 0.]));
        assert_eq!(data.to_loader()?.num_features(), 2);

        assert!(read_scale_input(&ScaleInputArgs {
            input_dim: Some(5),
            ..input_args(&file)
        })
        .is_err());
        Ok(())
    }

    #[test]
    fn no_peaks_left_after_gene_filter() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // every peak is open in every cell
        let file = write_peak_cell(dir.path(), &["c0\tc1", "p0\t2\t2", "p1\t1\t1"])?;

        let res = read_scale_input(&ScaleInputArgs {
            gene_filter: true,
            ..input_args(&file)
        });
        assert!(res.is_err());
        Ok(())
    }
}
