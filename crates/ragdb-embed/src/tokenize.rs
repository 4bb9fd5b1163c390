use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Encoding, Tokenizer, TruncationParams};

/// Model inputs for one padded batch, each `[B, T]`.
pub struct BatchInputs {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Load `tokenizer.json` with longest-first truncation at `max_len` tokens.
pub fn load_tokenizer(path: &std::path::Path, max_len: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    Ok(tokenizer)
}

/// Encode a batch (single texts or `(query, passage)` pairs) and pad every row
/// to the longest encoding in the batch.
pub fn encode_batch_on_device<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>, device: &Device) -> Result<BatchInputs>
where
    E: Into<EncodeInput<'s>> + Send,
{
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let pad_id = tokenizer.get_padding().map_or(0, |p| p.pad_id);
    let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0).max(1);
    let batch = encodings.len();

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut type_ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    for enc in &encodings {
        let pad = seq_len - enc.len();
        ids.extend_from_slice(enc.get_ids());
        ids.extend(std::iter::repeat(pad_id).take(pad));
        type_ids.extend_from_slice(enc.get_type_ids());
        type_ids.extend(std::iter::repeat(0).take(pad));
        mask.extend_from_slice(enc.get_attention_mask());
        mask.extend(std::iter::repeat(0).take(pad));
    }

    Ok(BatchInputs {
        input_ids: Tensor::from_vec(ids, (batch, seq_len), device)?,
        token_type_ids: Tensor::from_vec(type_ids, (batch, seq_len), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, seq_len), device)?,
    })
}
