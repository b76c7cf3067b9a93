use atelier_common::{Error, Result};

/// Dimension of every stored embedding vector.
pub const EMBEDDING_DIM: usize = 1536;

/// Encode an f32 vector as the little-endian blob sqlite-vec operates on.
pub fn to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend(v.to_le_bytes());
    }
    bytes
}

pub fn from_blob(blob: &[u8]) -> Result<Vec<f32>> {
    if !blob.len().is_multiple_of(4) {
        return Err(Error::Database("invalid embedding blob length".into()));
    }

    let mut out = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

/// Reject vectors that do not match the stored dimension.
pub fn ensure_dimension(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(Error::Validation(format!(
            "embedding must have {EMBEDDING_DIM} dimensions, got {}",
            embedding.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ensure_dimension, from_blob, to_blob, EMBEDDING_DIM};

    #[test]
    fn blob_round_trip_is_exact() {
        let original = vec![0.0f32, 1.0, -1.5, f32::MIN_POSITIVE, 1234.5678];
        let decoded = from_blob(&to_blob(&original)).expect("decode should succeed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(from_blob(&[0u8, 0, 0]).is_err());
    }

    #[test]
    fn dimension_check() {
        assert!(ensure_dimension(&vec![0.0; EMBEDDING_DIM]).is_ok());
        assert!(ensure_dimension(&[0.0; 3]).is_err());
        assert!(ensure_dimension(&[]).is_err());
    }
}
