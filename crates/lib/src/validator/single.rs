use std::sync::Arc;

use tracing::debug;

use super::ValidatorConfig;
use crate::Result;
use crate::auth::{Digest, Signer};

/// One signer, full authority.
#[derive(Debug, Clone)]
pub struct SingleSignerValidator {
    signer: Arc<dyn Signer>,
}

impl SingleSignerValidator {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn config(&self) -> ValidatorConfig {
        ValidatorConfig::SingleSigner {
            signer: self.signer.signer_id(),
        }
    }

    /// Sign `digest` directly with the signer.
    pub fn authorize(&self, digest: &Digest) -> Result<Vec<u8>> {
        debug!(signer = %self.signer.signer_id(), digest = %digest, "Authorizing with single signer");
        Ok(self.signer.sign_digest(digest)?)
    }
}
