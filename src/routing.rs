//! File routing between node ports

use crate::error::{PumpError, Result};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// How a produced file reaches a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Destructive rename; the source file is gone afterwards
    Move,
    /// The output feeds further edges, keep the source file
    Copy,
}

/// Route `from` to `to`.
///
/// `node` names the producer for the missing-file error.
pub async fn route_file(node: &str, from: &Path, to: &Path, mode: RouteMode) -> Result<()> {
    let exists = fs::try_exists(from)
        .await
        .map_err(|source| PumpError::Routing {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })?;
    if !exists {
        return Err(PumpError::MissingOutput {
            node: node.to_string(),
            path: from.to_path_buf(),
        });
    }

    let routed = match mode {
        RouteMode::Move => fs::rename(from, to).await,
        RouteMode::Copy => fs::copy(from, to).await.map(|_| ()),
    };

    routed.map_err(|source| PumpError::Routing {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;

    debug!("Routed {:?} -> {:?} ({:?})", from, to, mode);
    Ok(())
}
