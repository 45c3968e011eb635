use std::collections::HashMap;

use crate::operator::AccessPath;
use crate::optimizable::PlanType;
use crate::optimizer::ContextId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PlanAction {
    /// Save the current truly-the-best path under a context.
    Add,
    /// Restore the path saved under a context.
    Load,
    /// Forget the path saved under a context.
    Remove,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoEntry {
    pub access_path: AccessPath,
    pub plan_type: Option<PlanType>,
}

/// Best access paths of one optimizable, saved per enclosing optimization context.
#[derive(Clone, Debug, Default)]
pub struct BestPlanMemo {
    entries: HashMap<ContextId, MemoEntry>,
}

impl BestPlanMemo {
    pub fn insert(&mut self, context: ContextId, entry: MemoEntry) {
        self.entries.insert(context, entry);
    }

    pub fn get(&self, context: ContextId) -> Option<&MemoEntry> {
        self.entries.get(&context)
    }

    pub fn remove(&mut self, context: ContextId) -> Option<MemoEntry> {
        self.entries.remove(&context)
    }

    pub fn contains(&self, context: ContextId) -> bool {
        self.entries.contains_key(&context)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
