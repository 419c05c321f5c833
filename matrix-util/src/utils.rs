/// Generate minibatch intervals
/// * `ntot` - number of total samples
/// * `batch_size` - the size of each batch
pub fn generate_minibatch_intervals(ntot: usize, batch_size: usize) -> Vec<(usize, usize)> {
    let batch_size = batch_size.max(1);
    let num_batches = ntot.div_ceil(batch_size);
    (0..num_batches)
        .map(|b| {
            let lb: usize = b * batch_size;
            let ub: usize = ((b + 1) * batch_size).min(ntot);
            (lb, ub)
        })
        .collect::<Vec<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_cover_everything() {
        assert_eq!(
            generate_minibatch_intervals(10, 4),
            vec![(0, 4), (4, 8), (8, 10)]
        );
        assert_eq!(generate_minibatch_intervals(8, 4), vec![(0, 4), (4, 8)]);
        assert!(generate_minibatch_intervals(0, 4).is_empty());
    }
}
