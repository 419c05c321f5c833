//! Agreement between predicted clusters and reference labels
//!
//! Scores are computed from the classes x clusters contingency table:
//! adjusted Rand index, normalized mutual information, and accuracy
//! with macro F1 after the best one-to-one matching of clusters to
//! classes.

use crate::scale_common::*;
use matrix_util::common_io::read_lines;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Reference label of each cell as an index into `classes`
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLabels {
    pub labels: Vec<usize>,
    pub classes: Vec<Box<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterScores {
    pub ari: f64,
    pub nmi: f64,
    pub accuracy: f64,
    pub macro_f1: f64,
    /// matched class of each cluster, if any
    pub cluster_to_class: Vec<Option<usize>>,
}

fn split_name_label(line: &str) -> Option<(&str, &str)> {
    line.split_once('\t')
        .or_else(|| line.split_once(','))
        .or_else(|| line.split_once(char::is_whitespace))
        .map(|(name, label)| (name.trim(), label.trim()))
}

/// Read reference labels, one line per cell: either `label` or
/// `cell<sep>label` with a tab, comma or space. Classes are the sorted
/// unique labels.
///
/// When every line names a cell and the names cover all of `cells`,
/// the labels follow the order of `cells`. Otherwise lines are taken
/// in order and their number must match the number of cells.
pub fn read_labels(file: &str, cells: &[Box<str>]) -> anyhow::Result<ReferenceLabels> {
    let lines: Vec<Box<str>> = read_lines(file)?
        .into_iter()
        .map(|s| s.trim().to_string().into_boxed_str())
        .filter(|s| !s.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(anyhow::anyhow!("no labels in {}", file));
    }

    let named: Option<HashMap<&str, &str>> = lines
        .iter()
        .map(|line| split_name_label(line))
        .collect::<Option<Vec<_>>>()
        .map(|pairs| pairs.into_iter().collect());

    let by_cell: Option<Vec<&str>> = named.and_then(|name2label| {
        cells
            .iter()
            .map(|c| name2label.get(&**c).copied())
            .collect()
    });

    let raw: Vec<&str> = match by_cell {
        Some(raw) => {
            info!("Matched {} reference labels by cell name", raw.len());
            raw
        }
        None => {
            if lines.len() != cells.len() {
                return Err(anyhow::anyhow!(
                    "{} has {} labels for {} cells",
                    file,
                    lines.len(),
                    cells.len()
                ));
            }
            // two columns only when every line has a tab or comma;
            // spaces may belong to the label itself
            let two_columns = lines.iter().all(|l| l.contains(['\t', ',']));
            lines
                .iter()
                .map(|line| match line.split_once(['\t', ',']) {
                    Some((_, label)) if two_columns => label.trim(),
                    _ => &**line,
                })
                .collect()
        }
    };

    let classes: Vec<Box<str>> = raw
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(Box::from)
        .collect();

    let index: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(k, c)| (&**c, k))
        .collect();

    let labels = raw
        .iter()
        .map(|l| {
            index
                .get(l)
                .copied()
                .ok_or(anyhow::anyhow!("unknown label {}", l))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ReferenceLabels { labels, classes })
}

fn check_lengths(truth: &[usize], pred: &[usize]) -> anyhow::Result<usize> {
    if truth.len() != pred.len() {
        return Err(anyhow::anyhow!(
            "{} reference labels vs. {} predictions",
            truth.len(),
            pred.len()
        ));
    }
    Ok(truth.len())
}

/// Counts of (truth, pred) pairs, `n_truth x n_pred`
pub fn contingency_table(truth: &[usize], pred: &[usize]) -> Vec<Vec<usize>> {
    let nrow = truth.iter().max().map_or(0, |&m| m + 1);
    let ncol = pred.iter().max().map_or(0, |&m| m + 1);
    let mut table = vec![vec![0_usize; ncol]; nrow];
    for (&t, &p) in truth.iter().zip(pred.iter()) {
        table[t][p] += 1;
    }
    table
}

fn comb2(n: usize) -> f64 {
    let n = n as f64;
    n * (n - 1.) / 2.
}

fn margins(table: &[Vec<usize>]) -> (Vec<usize>, Vec<usize>) {
    let ncol = table.first().map_or(0, |r| r.len());
    let rows = table.iter().map(|r| r.iter().sum()).collect();
    let cols = (0..ncol).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    (rows, cols)
}

pub fn adjusted_rand_index(truth: &[usize], pred: &[usize]) -> anyhow::Result<f64> {
    let ntot = check_lengths(truth, pred)?;
    if ntot < 2 {
        return Ok(1.);
    }

    let table = contingency_table(truth, pred);
    let (rows, cols) = margins(&table);

    let sum_pairs: f64 = table.iter().flatten().map(|&n| comb2(n)).sum();
    let sum_rows: f64 = rows.iter().map(|&n| comb2(n)).sum();
    let sum_cols: f64 = cols.iter().map(|&n| comb2(n)).sum();

    let expected = sum_rows * sum_cols / comb2(ntot);
    let max_index = 0.5 * (sum_rows + sum_cols);
    let denom = max_index - expected;

    if denom == 0. {
        // both partitions trivial (all singletons or one block)
        Ok(if sum_pairs == max_index { 1. } else { 0. })
    } else {
        Ok((sum_pairs - expected) / denom)
    }
}

/// Mutual information normalized by the geometric mean of entropies
pub fn normalized_mutual_information(truth: &[usize], pred: &[usize]) -> anyhow::Result<f64> {
    let ntot = check_lengths(truth, pred)?;
    if ntot == 0 {
        return Ok(1.);
    }

    let nn = ntot as f64;
    let table = contingency_table(truth, pred);
    let (rows, cols) = margins(&table);

    let mut mi = 0.;
    for (i, row) in table.iter().enumerate() {
        for (j, &n_ij) in row.iter().enumerate() {
            if n_ij > 0 {
                let n_ij = n_ij as f64;
                mi += n_ij / nn * (n_ij * nn / (rows[i] as f64 * cols[j] as f64)).ln();
            }
        }
    }

    let entropy = |counts: &[usize]| -> f64 {
        counts
            .iter()
            .filter(|&&n| n > 0)
            .map(|&n| {
                let p = n as f64 / nn;
                -p * p.ln()
            })
            .sum()
    };

    let (h_truth, h_pred) = (entropy(&rows), entropy(&cols));

    if h_truth == 0. && h_pred == 0. {
        Ok(1.)
    } else if h_truth == 0. || h_pred == 0. {
        Ok(0.)
    } else {
        Ok((mi / (h_truth * h_pred).sqrt()).clamp(0., 1.))
    }
}

/// Maximum-weight assignment of rows to columns (Hungarian method
/// with potentials). The matrix is padded to a square with zeros;
/// returns the matched column of each row, `None` for padding.
pub fn max_weight_matching(weights: &[Vec<f64>]) -> Vec<Option<usize>> {
    let nrow = weights.len();
    let ncol = weights.first().map_or(0, |r| r.len());
    let n = nrow.max(ncol);
    if n == 0 {
        return vec![];
    }

    let max_w = weights
        .iter()
        .flatten()
        .cloned()
        .fold(0_f64, f64::max);

    // minimize cost = max_w - w, 1-based with a dummy row/column 0
    let cost = |i: usize, j: usize| -> f64 {
        let w = if i <= nrow && j <= ncol {
            weights[i - 1][j - 1]
        } else {
            0.
        };
        max_w - w
    };

    let mut u = vec![0_f64; n + 1];
    let mut v = vec![0_f64; n + 1];
    let mut row_of_col = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        row_of_col[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = row_of_col[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;

            for j in 1..=n {
                if !used[j] {
                    let cur = cost(i0, j) - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[row_of_col[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if row_of_col[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            row_of_col[j0] = row_of_col[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut col_of_row = vec![None; nrow];
    for j in 1..=n {
        let i = row_of_col[j];
        if i >= 1 && i <= nrow && j <= ncol {
            col_of_row[i - 1] = Some(j - 1);
        }
    }
    col_of_row
}

/// Print the confusion table and agreement scores of `pred` against
/// `truth`. Clusters are matched one-to-one to classes before
/// accuracy and F1 are computed.
pub fn cluster_report<W: Write>(
    truth: &[usize],
    pred: &[usize],
    classes: &[Box<str>],
    out: &mut W,
) -> anyhow::Result<ClusterScores> {
    let ntot = check_lengths(truth, pred)?;

    if let Some(&t) = truth.iter().find(|&&t| t >= classes.len()) {
        return Err(anyhow::anyhow!(
            "reference label {} but only {} classes",
            t,
            classes.len()
        ));
    }

    let mut table = contingency_table(truth, pred);
    table.resize(classes.len(), vec![]);
    let n_clusters = pred.iter().max().map_or(0, |&m| m + 1);
    for row in table.iter_mut() {
        row.resize(n_clusters, 0);
    }

    let (class_size, cluster_size) = margins(&table);

    let weights: Vec<Vec<f64>> = table
        .iter()
        .map(|r| r.iter().map(|&n| n as f64).collect())
        .collect();

    let class_to_cluster = max_weight_matching(&weights);

    let mut cluster_to_class = vec![None; n_clusters];
    let mut matched = 0;
    let mut f1_sum = 0.;

    for (i, assigned) in class_to_cluster.iter().enumerate() {
        if let Some(j) = *assigned {
            cluster_to_class[j] = Some(i);
            let tp = table[i][j];
            matched += tp;
            if tp > 0 {
                let precision = tp as f64 / cluster_size[j] as f64;
                let recall = tp as f64 / class_size[i] as f64;
                f1_sum += 2. * precision * recall / (precision + recall);
            }
        }
    }

    let scores = ClusterScores {
        ari: adjusted_rand_index(truth, pred)?,
        nmi: normalized_mutual_information(truth, pred)?,
        accuracy: matched as f64 / ntot.max(1) as f64,
        macro_f1: f1_sum / classes.len().max(1) as f64,
        cluster_to_class,
    };

    writeln!(out, "\n======== Cluster Report ========")?;
    let header = (0..n_clusters)
        .map(|j| j.to_string())
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(out, "class\t{}", header)?;
    for (name, row) in classes.iter().zip(table.iter()) {
        let counts = row
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(out, "{}\t{}", name, counts)?;
    }
    writeln!(out)?;
    writeln!(out, "ARI: {:.4}", scores.ari)?;
    writeln!(out, "NMI: {:.4}", scores.nmi)?;
    writeln!(out, "Accuracy: {:.4}", scores.accuracy)?;
    writeln!(out, "F1: {:.4}", scores.macro_f1)?;
    writeln!(out, "================================")?;

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::common_io::{create_temp_dir_file, write_lines};

    #[test]
    fn relabelled_partition_scores_one() -> anyhow::Result<()> {
        let truth = [0, 0, 1, 1, 2, 2];
        let pred = [2, 2, 0, 0, 1, 1];
        assert_abs_diff_eq!(adjusted_rand_index(&truth, &pred)?, 1., epsilon = 1e-12);
        assert_abs_diff_eq!(
            normalized_mutual_information(&truth, &pred)?,
            1.,
            epsilon = 1e-12
        );
        Ok(())
    }

    #[test]
    fn ari_matches_hand_computation() -> anyhow::Result<()> {
        // contingency [[2,1],[0,3]]: index 4, expected 6 * 7 / 15, max 6.5
        let truth = [0, 0, 0, 1, 1, 1];
        let pred = [0, 0, 1, 1, 1, 1];
        let ari = adjusted_rand_index(&truth, &pred)?;
        assert_abs_diff_eq!(ari, (4. - 2.8) / (6.5 - 2.8), epsilon = 1e-12);
        assert!(adjusted_rand_index(&truth, &pred[..5]).is_err());
        Ok(())
    }

    #[test]
    fn matching_picks_the_optimal_permutation() {
        let weights = vec![
            vec![1., 9., 0.],
            vec![8., 7., 0.],
            vec![0., 6., 5.],
        ];
        assert_eq!(
            max_weight_matching(&weights),
            vec![Some(1), Some(0), Some(2)]
        );

        // more classes than clusters
        let weights = vec![vec![3.], vec![5.]];
        assert_eq!(max_weight_matching(&weights), vec![None, Some(0)]);
    }

    #[test]
    fn report_prints_scores() -> anyhow::Result<()> {
        let classes: Vec<Box<str>> = vec!["A".into(), "B".into()];
        let truth = [0, 0, 0, 1, 1, 1];
        let pred = [1, 1, 0, 0, 0, 0];

        let mut buf = Vec::new();
        let scores = cluster_report(&truth, &pred, &classes, &mut buf)?;
        let text = String::from_utf8(buf)?;

        assert_eq!(scores.cluster_to_class, vec![Some(1), Some(0)]);
        assert_abs_diff_eq!(scores.accuracy, 5. / 6., epsilon = 1e-12);
        assert!(text.contains("class\t0\t1"));
        assert!(text.contains("A\t1\t2"));
        assert!(text.contains("ARI: "));
        assert!(text.contains("Accuracy: 0.8333"));
        Ok(())
    }

    #[test]
    fn labels_follow_cell_names() -> anyhow::Result<()> {
        let file = create_temp_dir_file("txt")?;
        let file = file.to_str().ok_or(anyhow::anyhow!("temp path"))?;
        let lines: Vec<Box<str>> = vec!["c2\tT".into(), "c1\tB".into(), "c3\tB".into()];
        write_lines(&lines, file)?;

        let cells: Vec<Box<str>> = vec!["c1".into(), "c2".into(), "c3".into()];
        let out = read_labels(file, &cells)?;
        let classes: Vec<Box<str>> = vec!["B".into(), "T".into()];
        assert_eq!(out.classes, classes);
        assert_eq!(out.labels, vec![0, 1, 0]);
        Ok(())
    }

    #[test]
    fn plain_labels_are_positional() -> anyhow::Result<()> {
        let file = create_temp_dir_file("txt")?;
        let file = file.to_str().ok_or(anyhow::anyhow!("temp path"))?;
        let lines: Vec<Box<str>> = vec!["T cell".into(), "B cell".into()];
        write_lines(&lines, file)?;

        let cells: Vec<Box<str>> = vec!["c1".into(), "c2".into()];
        let out = read_labels(file, &cells)?;
        assert_eq!(out.labels, vec![1, 0]);

        let three: Vec<Box<str>> = vec!["c1".into(), "c2".into(), "c3".into()];
        assert!(read_labels(file, &three).is_err());
        Ok(())
    }
}
