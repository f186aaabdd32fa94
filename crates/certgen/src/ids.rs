//! Identifier issuance for certificates, batch jobs and access tokens.

use crate::error::EntropyUnavailable;

const ID_BYTES: usize = 8;
const TOKEN_BYTES: usize = 16;

/// Issues collision-resistant identifiers from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdIssuer;

impl IdIssuer {
    pub fn new() -> Self {
        Self
    }

    /// `CERT-` followed by 16 upper-case hex digits.
    pub fn new_certificate_id(&self) -> Result<String, EntropyUnavailable> {
        Ok(format!("CERT-{}", hex::encode_upper(rand_bytes::<ID_BYTES>()?)))
    }

    /// `BATCH-` followed by 16 upper-case hex digits.
    pub fn new_batch_job_id(&self) -> Result<String, EntropyUnavailable> {
        Ok(format!("BATCH-{}", hex::encode_upper(rand_bytes::<ID_BYTES>()?)))
    }

    /// 32 lower-case hex digits. Used in view/download/verify URLs in place
    /// of the enumerable certificate ID.
    pub fn new_access_token(&self) -> Result<String, EntropyUnavailable> {
        Ok(hex::encode(rand_bytes::<TOKEN_BYTES>()?))
    }
}

fn rand_bytes<const N: usize>() -> Result<[u8; N], EntropyUnavailable> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| EntropyUnavailable(e.to_string()))?;
    Ok(bytes)
}
