//! Leader assignment
//!
//! The leader of a label is the learner with the highest per-class score for
//! it. Exact ties go to the earliest learner in the preference order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::learner::LearnerSlot;
use super::scoring::PerClassScoreTable;
use crate::dataset::{Label, LabelSet};

/// label -> leading learner, total over the label set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderTable {
    leaders: Vec<LearnerSlot>,
}

impl LeaderTable {
    /// Build directly from one slot per label
    pub fn from_leaders(leaders: Vec<LearnerSlot>) -> Self {
        Self { leaders }
    }

    pub fn leader(&self, label: Label) -> LearnerSlot {
        self.leaders[label]
    }

    /// Leader for `label`, `None` when outside the table
    pub fn get(&self, label: Label) -> Option<LearnerSlot> {
        self.leaders.get(label).copied()
    }

    pub fn is_leader(&self, slot: LearnerSlot, label: Label) -> bool {
        self.get(label) == Some(slot)
    }

    pub fn len(&self) -> usize {
        self.leaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, LearnerSlot)> + '_ {
        self.leaders.iter().copied().enumerate()
    }

    /// Labels led by each slot
    pub fn labels_led_by(&self, slot: LearnerSlot) -> Vec<Label> {
        self.iter().filter(|&(_, s)| s == slot).map(|(l, _)| l).collect()
    }

    /// Label name -> learner display name, for reports
    pub fn named(&self, label_set: &LabelSet, learner_names: &[String; 3]) -> BTreeMap<String, String> {
        self.iter()
            .map(|(label, slot)| (label_set.name(label), learner_names[slot.index()].clone()))
            .collect()
    }
}

/// Derives a [`LeaderTable`] from a score table
pub struct LeaderAssigner;

impl LeaderAssigner {
    /// Assign with the default A, B, C preference
    pub fn assign(table: &PerClassScoreTable) -> LeaderTable {
        Self::assign_with_preference(table, &LearnerSlot::PREFERENCE)
    }

    pub fn assign_with_preference(table: &PerClassScoreTable, preference: &[LearnerSlot; 3]) -> LeaderTable {
        let leaders = (0..table.n_classes())
            .map(|label| {
                let mut best = preference[0];
                for &slot in &preference[1..] {
                    // strictly greater, so earlier slots keep ties
                    if table.score(slot, label) > table.score(best, label) {
                        best = slot;
                    }
                }
                best
            })
            .collect();
        LeaderTable { leaders }
    }
}
