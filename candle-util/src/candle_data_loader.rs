use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;

pub struct MinibatchData {
    pub input: Tensor,
    pub samples: Vec<usize>,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData>;

    fn num_minibatch(&self) -> usize;

    fn num_samples(&self) -> usize;

    /// Reshuffle samples and partition them into minibatches of
    /// `batch_size` (the last one may be smaller)
    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()>;
}

///
/// A simple data loader for in-memory 2d matrix.  Each row will be
/// considered as a feature vector. The number of samples is the
/// number of rows.
///
pub struct InMemoryData {
    input_data: Tensor,
    shuffled_input_data: Option<Vec<Tensor>>,
    minibatches: Minibatches,
}

impl InMemoryData {
    ///
    /// Create a data loader with the main data tensor `data` (n x d)
    ///
    pub fn new(data: &Tensor) -> anyhow::Result<Self> {
        let dims = data.dims();
        if dims.len() != 2 {
            return Err(anyhow::anyhow!("expected 2 dimensions, got {}", dims.len()));
        }

        let rows = (0..dims[0]).collect();

        Ok(InMemoryData {
            input_data: data.to_device(&Device::Cpu)?,
            shuffled_input_data: None,
            minibatches: Minibatches {
                samples: rows,
                chunks: vec![],
            },
        })
    }

    pub fn num_features(&self) -> usize {
        self.input_data.dims()[1]
    }

    pub fn chunks(&self) -> &[Vec<usize>] {
        &self.minibatches.chunks
    }
}

impl DataLoader for InMemoryData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData> {
        let shuffled = self
            .shuffled_input_data
            .as_ref()
            .ok_or(anyhow::anyhow!("need to shuffle data"))?;

        match (shuffled.get(batch_idx), self.minibatches.chunks.get(batch_idx)) {
            (Some(x), Some(samples)) => Ok(MinibatchData {
                input: x.to_device(target_device)?,
                samples: samples.clone(),
            }),
            _ => Err(anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            )),
        }
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn num_samples(&self) -> usize {
        self.minibatches.size()
    }

    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }

        /////////////////////
        // shuffle indexes //
        /////////////////////

        self.minibatches.shuffle_minibatch(batch_size, rng);

        ///////////////////////////////////
        // preload all the shuffled data //
        ///////////////////////////////////

        let mut shuffled = Vec::with_capacity(self.num_minibatch());
        for samples in self.minibatches.chunks.iter() {
            let idx = samples.iter().map(|&i| i as u32).collect::<Vec<_>>();
            let idx = Tensor::from_vec(idx, samples.len(), &Device::Cpu)?;
            shuffled.push(self.input_data.index_select(&idx, 0)?);
        }
        self.shuffled_input_data = Some(shuffled);

        Ok(())
    }
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn shuffle_minibatch<R: Rng + ?Sized>(&mut self, batch_size: usize, rng: &mut R) {
        self.samples.shuffle(rng);
        self.chunks = self
            .samples
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}
