//! Block dispatch: turns a scoped block set into a [`ResultModel`].
//!
//! Every block is handled in isolation. Unknown headers, unimplemented
//! parsers and failing blocks are logged and counted, never propagated.

use crate::models::{DispatchStats, Scope, ScopedBlockSet};
use crate::result_model::ResultModel;
use crate::schema::{BlockOutcome, SchemaTable};
use tracing::{debug, warn};

pub struct BlockDispatcher<'a> {
    schema: &'a SchemaTable,
}

impl<'a> BlockDispatcher<'a> {
    pub fn new(schema: &'a SchemaTable) -> Self {
        Self { schema }
    }

    /// Parse every block and collect the tables into a fresh result model
    pub fn dispatch(&self, blocks: &ScopedBlockSet) -> (ResultModel, DispatchStats) {
        let mut model = ResultModel::new(self.schema.version());
        let stats = self.dispatch_into(blocks, &mut model);
        (model, stats)
    }

    pub fn dispatch_into(&self, blocks: &ScopedBlockSet, model: &mut ResultModel) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for (scope, header, text) in blocks.iter() {
            let Some(outcome) = self.schema.parse(scope, header, text) else {
                warn!("No parser found for block \"{}\" ({})", header, scope);
                stats.unknown += 1;
                continue;
            };

            match outcome {
                BlockOutcome::Parsed { slot, table } => {
                    debug!(
                        "{}: parsed \"{}\" into {} ({} rows x {} columns)",
                        scope,
                        header,
                        slot.name(),
                        table.height(),
                        table.width()
                    );
                    match scope {
                        Scope::Global => model.set_table(slot, table),
                        Scope::Unit(unit) => model.unit_entry(unit).set_table(slot, table),
                    }
                    stats.parsed += 1;
                }
                BlockOutcome::Skipped { reason } => {
                    debug!("{}: skipping \"{}\": {}", scope, header, reason);
                    stats.skipped += 1;
                }
                BlockOutcome::Failed { error } => {
                    warn!("{}: failed to parse block \"{}\": {}", scope, header, error);
                    stats.failed += 1;
                }
            }
        }

        debug!(
            "Dispatched {} blocks: {} parsed, {} skipped, {} failed, {} unknown",
            stats.total(),
            stats.parsed,
            stats.skipped,
            stats.failed,
            stats.unknown
        );
        stats
    }
}
