//! Reconciliation passes run after sync and during a full reset.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::repeat::RepeatClass;
use crate::store::WorkingSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub duplicates_removed: Vec<String>,
    pub orphans_pruned: Vec<String>,
    /// Occurrences whose parent record is gone, now standalone.
    pub detached: Vec<String>,
    pub categories_removed: Vec<String>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.duplicates_removed.is_empty()
            && self.orphans_pruned.is_empty()
            && self.detached.is_empty()
            && self.categories_removed.is_empty()
    }
}

/// Dedupe, prune orphans, and optionally drop empty categories, in that order.
pub fn cleanup(set: &mut WorkingSet, clean_categories: bool) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    remove_duplicates(set, &mut report);
    prune_orphans(set, &mut report)?;
    if clean_categories {
        collect_categories(set, &mut report)?;
    }
    if !report.is_empty() {
        tracing::info!(
            duplicates = report.duplicates_removed.len(),
            orphans = report.orphans_pruned.len(),
            detached = report.detached.len(),
            categories = report.categories_removed.len(),
            "cleanup pass changed the store"
        );
    }
    Ok(report)
}

/// Keep the most recently modified record per id; ties keep the first stored.
fn remove_duplicates(set: &mut WorkingSet, report: &mut CleanupReport) {
    let mut keep: HashMap<&str, usize> = HashMap::new();
    for (index, task) in set.tasks().iter().enumerate() {
        match keep.get(task.id.as_str()) {
            Some(&kept) if set.tasks()[kept].modified_at >= task.modified_at => {}
            _ => {
                keep.insert(task.id.as_str(), index);
            }
        }
    }

    let mut doomed: Vec<usize> = set
        .tasks()
        .iter()
        .enumerate()
        .filter(|(index, task)| keep.get(task.id.as_str()) != Some(index))
        .map(|(index, _)| index)
        .collect();
    doomed.sort_unstable_by(|a, b| b.cmp(a));

    for index in doomed {
        let removed = set.remove_at(index);
        tracing::debug!(task = %removed.id, "removed duplicate record");
        report.duplicates_removed.push(removed.id);
    }
}

/// Drop occurrences their series rule no longer produces.
fn prune_orphans(set: &mut WorkingSet, report: &mut CleanupReport) -> Result<()> {
    enum Verdict {
        Prune(String),
        Detach(String),
    }

    let verdicts: Vec<Verdict> = set
        .tasks()
        .iter()
        .filter_map(|task| {
            let parent_id = task.parent.as_deref()?;
            match set.get(parent_id) {
                None => Some(Verdict::Detach(task.id.clone())),
                Some(parent) if !parent.rule.fires_on(task.start_day()) => {
                    Some(Verdict::Prune(task.id.clone()))
                }
                Some(_) => None,
            }
        })
        .collect();

    for verdict in verdicts {
        match verdict {
            Verdict::Prune(id) => {
                set.delete(&id)?;
                tracing::debug!(task = %id, "pruned orphaned occurrence");
                report.orphans_pruned.push(id);
            }
            Verdict::Detach(id) => {
                set.detach(&id)?;
                set.update(&id, |task| {
                    task.parent = None;
                    let mut rule = task.rule.rewritten();
                    rule.class = RepeatClass::None;
                    task.rule = rule;
                })?;
                tracing::warn!(task = %id, "occurrence lost its series root; kept as standalone");
                report.detached.push(id);
            }
        }
    }
    Ok(())
}

fn collect_categories(set: &mut WorkingSet, report: &mut CleanupReport) -> Result<()> {
    let empty: Vec<_> = set
        .categories()
        .iter()
        .filter(|category| category.title.trim().is_empty())
        .map(|category| category.id)
        .collect();
    for id in empty {
        set.remove_category(id)?;
        report.categories_removed.push(id.to_string());
    }
    Ok(())
}
