//! Deciding which artifacts to download.
//!
//! Dumps are walked newest to oldest. Every table in the latest dump is
//! always fetched. A partial artifact needs the partials before it and the
//! full snapshot underneath, so the walk keeps collecting artifacts for a
//! table until that full snapshot is reached and then ignores anything older.

use crate::api::ExportApi;
use crate::error::Result;
use crate::types::{Artifact, ArtifactInfo, Dump};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info};

/// Per-table artifacts to download, oldest first.
pub type ArtifactGroups = BTreeMap<String, Vec<ArtifactInfo>>;

/// Where the backward walk stands for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Collecting increments; still looking for the full snapshot below them.
    Partial,
    /// The base snapshot has been selected; nothing older is needed.
    FoundFull,
}

/// Accumulator threaded through the fold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    chains: HashMap<String, ChainState>,
    groups: BTreeMap<String, VecDeque<ArtifactInfo>>,
}

impl Reconciliation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain_state(&self, table: &str) -> Option<ChainState> {
        self.chains.get(table).copied()
    }

    /// Folds one dump's artifacts into the accumulator.
    ///
    /// Dumps must arrive newest first, with `latest` set only for the first.
    pub fn fold_dump(
        mut self,
        sequence: u64,
        artifacts: &BTreeMap<String, Artifact>,
        latest: bool,
    ) -> Self {
        for (table, artifact) in artifacts {
            let next = match (latest, artifact.partial, self.chain_state(table)) {
                (true, true, _) => Some(ChainState::Partial),
                (true, false, _) => Some(ChainState::FoundFull),
                (false, true, state) if state != Some(ChainState::FoundFull) => {
                    Some(ChainState::Partial)
                }
                (false, false, Some(ChainState::Partial)) => Some(ChainState::FoundFull),
                _ => None,
            };

            let Some(next) = next else {
                debug!(table = %table, sequence, "skipping artifact");
                continue;
            };
            debug!(
                table = %table,
                sequence,
                partial = artifact.partial,
                "selecting artifact"
            );
            self.chains.insert(table.clone(), next);
            // walking backwards, so older artifacts go in front
            self.groups
                .entry(table.clone())
                .or_default()
                .push_front(ArtifactInfo {
                    sequence,
                    table_name: table.clone(),
                    artifact: artifact.clone(),
                });
        }
        self
    }

    pub fn into_groups(self) -> ArtifactGroups {
        self.groups
            .into_iter()
            .map(|(table, group)| (table, group.into()))
            .collect()
    }
}

/// Fetches each dump's artifacts, newest first, and folds them.
///
/// A failed request aborts the walk and nothing accumulated is returned.
pub async fn reconcile<A: ExportApi>(api: &A, dumps: &[Dump]) -> Result<ArtifactGroups> {
    let mut state = Reconciliation::new();
    for (index, dump) in dumps.iter().enumerate() {
        debug!(dump_id = %dump.dump_id, sequence = dump.sequence, "fetching artifacts for dump");
        let files = api.artifacts_for_dump(&dump.dump_id).await?;
        state = state.fold_dump(dump.sequence, &files.artifacts_by_table, index == 0);
    }

    let groups = state.into_groups();
    info!(
        "selected {} artifacts across {} tables from {} dumps",
        groups.values().map(Vec::len).sum::<usize>(),
        groups.len(),
        dumps.len()
    );
    Ok(groups)
}
