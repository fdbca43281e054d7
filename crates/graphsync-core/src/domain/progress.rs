//! Transfer progress events

use serde::{Deserialize, Serialize};

use super::newtypes::{GraphId, OperationId, RelativePath};
use super::operation::TransferDirection;

/// Bytes completed out of total for one transfer
///
/// Serialized in the shape binding hosts already consume: camelCase keys
/// and `graphUUID` for the graph identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "graphUUID")]
    pub graph_id: GraphId,
    pub operation_id: OperationId,
    pub file: RelativePath,
    #[serde(rename = "type")]
    pub direction: TransferDirection,
    pub progress: u64,
    pub total: u64,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(
        graph_id: GraphId,
        operation_id: OperationId,
        file: RelativePath,
        direction: TransferDirection,
        progress: u64,
        total: u64,
    ) -> Self {
        Self {
            graph_id,
            operation_id,
            file,
            direction,
            progress,
            total,
            percent: percent_of(progress, total),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= self.total
    }
}

/// Integer percentage, 100 for empty totals
#[must_use]
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(done.min(total)) * 100) / u128::from(total);
    pct as u8
}
