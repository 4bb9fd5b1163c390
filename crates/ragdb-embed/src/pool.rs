use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens followed by L2 normalization.
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (_batch, _time, hidden_dim) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => bail!("hidden shape must be [B,T,H], got {other:?}"),
    };

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    // all-padding rows would divide by zero
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?.clamp(1e-9f32, f32::MAX)?;
    let mean = sum.broadcast_div(&lengths)?;
    l2_normalize(&mean)
}

pub fn l2_normalize(rows: &Tensor) -> Result<Tensor> {
    let eps_val = match rows.dtype() { DType::F16 | DType::BF16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], rows.device())?.to_dtype(rows.dtype())?.unsqueeze(0)?;
    let norm = rows.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(rows.broadcast_div(&norm)?)
}
