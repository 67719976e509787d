use crate::model::WorkspaceSnapshot;
use crate::patch::Patch;

/// One published evolution step of a stream.
///
/// Carries the new snapshot, its version, and the patch against the
/// previous published value. The patch is `None` only on the initial item
/// (version 0); for every accepted write, applying `patch` to the previous
/// published value reproduces `snapshot` exactly.
#[derive(Clone, Debug)]
pub struct ChangeItem {
    pub version: u64,
    pub snapshot: WorkspaceSnapshot,
    pub patch: Option<Patch>,
}

impl ChangeItem {
    pub(crate) fn initial(snapshot: WorkspaceSnapshot) -> Self {
        ChangeItem {
            version: 0,
            snapshot,
            patch: None,
        }
    }
}
