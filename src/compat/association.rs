//! Association mode with legacy return shapes

use crate::error::{Error, Result};
use crate::models::ModelDest;
use crate::session;

/// One relationship of the model value passed to `DB::model`
pub struct Association {
    inner: session::Association,
}

impl Association {
    pub(crate) fn new(inner: session::Association) -> Self {
        Self { inner }
    }

    /// Error recorded when the association was resolved
    pub fn error(&self) -> Option<&Error> {
        self.inner.error()
    }

    /// The engine association
    pub fn inner(&self) -> &session::Association {
        &self.inner
    }

    pub async fn find<T: ModelDest>(&self, dest: &mut T) -> Result<()> {
        self.inner.find(dest).await.map(|_| ())
    }

    /// Number of associated records; 0 when the count fails
    pub async fn count(&self) -> isize {
        match self.inner.count().await {
            Ok(n) => isize::try_from(n).unwrap_or(isize::MAX),
            Err(err) => {
                log::warn!("Association count failed: {}", err);
                0
            }
        }
    }

    pub async fn append<T: ModelDest>(&self, values: &mut T) -> Result<()> {
        self.inner.append(values).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.inner.clear().await.map(|_| ())
    }
}
