//! Conversion of sampled batches into burn tensors
//!
//! Images are stored channel-last; burn convolution layers expect NCHW, so
//! the image tensor is built as `[B, H, W, 3]` and its axes are swapped.

use burn::prelude::*;

use crate::sampler::Batch;

/// Tensor form of a [`Batch`]
#[derive(Debug, Clone)]
pub struct TensorBatch<B: Backend> {
    /// Shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size, label_width]`
    pub targets: Tensor<B, 2>,
}

impl Batch {
    /// Copy this batch onto `device`
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> TensorBatch<B> {
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(self.images().to_vec(), self.images_shape()),
            device,
        )
        .swap_dims(1, 3)
        .swap_dims(2, 3);

        let targets = Tensor::<B, 2>::from_floats(
            TensorData::new(self.labels().to_vec(), self.labels_shape()),
            device,
        );

        TensorBatch { images, targets }
    }
}
