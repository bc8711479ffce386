use candle_core::Tensor;

/// Mean absolute error over every element, as a scalar tensor.
pub fn mean_abs_error(pred: &Tensor, target: &Tensor) -> candle_core::Result<Tensor> {
    (pred - target)?.abs()?.mean_all()
}
