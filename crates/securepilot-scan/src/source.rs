//! The seam between the scan pipeline and the version-control host.

use async_trait::async_trait;
use securepilot_core::{ChangedFile, ScanError, ScanRequest};

use crate::context::ScanContext;

/// Lists the files changed by a pull request.
///
/// Implementations must return files in the order the host reports them and
/// must give up with [`ScanError::DeadlineExceeded`] once `ctx` is done.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Fetch every changed file of the request, following pagination.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, `RateLimited`, `HostUnavailable`,
    /// or `DeadlineExceeded`.
    async fn changed_files(
        &self,
        request: &ScanRequest,
        ctx: &ScanContext,
    ) -> Result<Vec<ChangedFile>, ScanError>;
}
