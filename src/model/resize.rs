//! Bilinear resizing built from matrix products.
//!
//! Every backend differentiates `matmul`, including `Autodiff<NdArray>` whose
//! bilinear `interpolate` has no backward pass.

use burn::prelude::*;

/// Interpolation weights from `input` samples to `output` samples, row-major
/// `[input, output]`.
///
/// Samples are pixel centers (`align_corners = false`): output `d` reads the
/// input at `(d + 0.5) * input / output - 0.5`, clamped to the valid range.
fn interpolation_matrix(input: usize, output: usize) -> Vec<f32> {
    let scale = input as f32 / output as f32;
    let mut weights = vec![0.0; input * output];

    for dst in 0..output {
        let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
        let lower = (src.floor() as usize).min(input - 1);
        let upper = (lower + 1).min(input - 1);
        let frac = (src - lower as f32).clamp(0.0, 1.0);

        weights[lower * output + dst] += 1.0 - frac;
        weights[upper * output + dst] += frac;
    }

    weights
}

/// Resize `[batch_size, channels, height, width]` maps to `[height, width] = size`.
pub fn resize_bilinear<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [batch_size, channels, height, width] = x.dims();
    let [out_height, out_width] = size;

    if [height, width] == size {
        return x;
    }

    let device = x.device();
    let columns = Tensor::<B, 1>::from_floats(
        interpolation_matrix(width, out_width).as_slice(),
        &device,
    )
    .reshape([width, out_width]);
    let rows = Tensor::<B, 1>::from_floats(
        interpolation_matrix(height, out_height).as_slice(),
        &device,
    )
    .reshape([height, out_height]);

    let maps = batch_size * channels;

    let x = x.reshape([maps * height, width]).matmul(columns);
    let x = x
        .reshape([maps, height, out_width])
        .swap_dims(1, 2)
        .reshape([maps * out_width, height])
        .matmul(rows);

    x.reshape([maps, out_width, out_height])
        .swap_dims(1, 2)
        .reshape([batch_size, channels, out_height, out_width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;

    fn assert_close(tensor: Tensor<TestBackend, 4>, expected: &[f32]) {
        let values = tensor.into_data().to_vec::<f32>().unwrap();

        assert_eq!(values.len(), expected.len());
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-4, "{values:?} != {expected:?}");
        }
    }

    fn row(values: &[f32]) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default())
            .reshape([1, 1, 1, values.len()])
    }

    #[test]
    fn upsampling_uses_pixel_centers() {
        let resized = resize_bilinear(row(&[0.0, 1.0]), [1, 4]);

        assert_close(resized, &[0.0, 0.25, 0.75, 1.0]);
    }

    #[test]
    fn halving_averages_neighbours() {
        let resized = resize_bilinear(row(&[0.0, 1.0, 2.0, 3.0]), [1, 2]);

        assert_close(resized, &[0.5, 2.5]);
    }

    #[test]
    fn downscaling_stays_in_bounds() {
        // Every output sample only reads valid inputs with weights summing to one.
        for (input, output) in [(32, 16), (520, 333), (7, 3), (1, 5)] {
            let weights = interpolation_matrix(input, output);

            assert_eq!(weights.len(), input * output);
            for dst in 0..output {
                let total: f32 = (0..input).map(|src| weights[src * output + dst]).sum();
                assert!((total - 1.0).abs() < 1e-5, "{input} -> {output}");
            }
        }
    }

    #[test]
    fn resizes_both_axes_of_every_map() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);

        let resized = resize_bilinear(x, [16, 20]);

        assert_eq!(resized.dims(), [2, 3, 16, 20]);
        assert_close(resized, &[1.0; 2 * 3 * 16 * 20]);
    }

    #[test]
    fn gradients_flow_on_ndarray_autodiff() {
        let device = Default::default();
        let x = Tensor::<Autodiff<TestBackend>, 4>::ones([1, 2, 4, 4], &device).require_grad();

        let grads = resize_bilinear(x.clone(), [8, 6]).sum().backward();
        let grad = x.grad(&grads).unwrap();

        // Each output pixel spreads a total weight of one over the input.
        let total = grad.sum().into_scalar();
        assert!((total - 2.0 * 8.0 * 6.0).abs() < 1e-3, "{total}");
    }
}
