//! In-memory working set and the persistence seam.
//!
//! All engine mutation happens against a [`WorkingSet`]: a flat arena of task
//! records linked by id. A [`Store`] owns the working set for one logical
//! writer and commits it through a [`Persist`] backend in one step, so a
//! partially applied pass is never written out.

use std::collections::HashSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::repeat::RepeatClass;
use crate::task::{Category, Task};

/// Upper bound on chain walks; a longer walk means the links loop.
const MAX_CHAIN_LEN: usize = 100_000;

#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    tasks: Vec<Task>,
    categories: Vec<Category>,
    changed: bool,
}

impl WorkingSet {
    pub fn new(mut tasks: Vec<Task>, categories: Vec<Category>) -> Self {
        for task in &mut tasks {
            task.normalize();
        }
        Self {
            tasks,
            categories,
            changed: false,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub(crate) fn mark_committed(&mut self) {
        self.changed = false;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&Task> {
        self.get(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Mutable access; marks the set as changed.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        self.changed = true;
        Some(task)
    }

    pub fn update<F>(&mut self, id: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut Task),
    {
        let task = self
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        mutator(task);
        Ok(())
    }

    pub fn fetch<P>(&self, predicate: P) -> Vec<&Task>
    where
        P: Fn(&Task) -> bool,
    {
        self.tasks.iter().filter(|task| predicate(task)).collect()
    }

    pub fn insert(&mut self, mut task: Task) {
        task.normalize();
        self.tasks.push(task);
        self.changed = true;
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Task {
        self.changed = true;
        self.tasks.remove(index)
    }

    /// Insert `task` into the chain directly after `anchor_id`.
    pub fn insert_after(&mut self, anchor_id: &str, mut task: Task) -> Result<()> {
        let old_next = self
            .require(anchor_id)?
            .next
            .clone()
            .filter(|next_id| self.contains(next_id));
        task.prev = Some(anchor_id.to_string());
        task.next = old_next.clone();
        let new_id = task.id.clone();

        if let Some(next_id) = old_next.as_deref() {
            if let Some(next) = self.get_mut(next_id) {
                next.prev = Some(new_id.clone());
            }
        }
        self.update(anchor_id, |anchor| anchor.next = Some(new_id))?;
        self.insert(task);
        Ok(())
    }

    /// Splice `id` out of its chain: neighbours are linked to each other and
    /// the record's own links are cleared.
    pub fn detach(&mut self, id: &str) -> Result<()> {
        let (prev, next) = {
            let task = self.require(id)?;
            (task.prev.clone(), task.next.clone())
        };

        if let Some(prev_id) = prev.as_deref() {
            if let Some(prev_task) = self.get_mut(prev_id) {
                if prev_task.next.as_deref() == Some(id) {
                    prev_task.next = next.clone();
                }
            }
        }
        if let Some(next_id) = next.as_deref() {
            if let Some(next_task) = self.get_mut(next_id) {
                if next_task.prev.as_deref() == Some(id) {
                    next_task.prev = prev.clone();
                }
            }
        }

        self.update(id, |task| {
            task.prev = None;
            task.next = None;
        })
    }

    /// Detach and drop every record with this id.
    pub fn delete(&mut self, id: &str) -> Result<Task> {
        self.detach(id)?;
        let index = self
            .position(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let removed = self.remove_at(index);
        while let Some(index) = self.position(id) {
            self.remove_at(index);
        }
        Ok(removed)
    }

    /// Turn an occurrence into a standalone record.
    ///
    /// The parent's rule excludes the occurrence's day from then on, so the
    /// series never re-materializes it.
    pub fn unlink(&mut self, id: &str) -> Result<()> {
        self.detach(id)?;
        let (parent, day) = {
            let task = self.require(id)?;
            (task.parent.clone(), task.start_day())
        };

        if let Some(parent_id) = parent.as_deref() {
            if let Some(parent) = self.get_mut(parent_id) {
                let mut rule = parent.rule.rewritten();
                rule.exclude(day);
                parent.rule = rule;
            }
        }

        self.update(id, |task| {
            task.parent = None;
            let mut rule = task.rule.rewritten();
            rule.class = RepeatClass::None;
            task.rule = rule;
        })
    }

    pub fn children_of(&self, root_id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.parent.as_deref() == Some(root_id))
            .collect()
    }

    pub fn has_children(&self, root_id: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.parent.as_deref() == Some(root_id))
    }

    /// Ids reachable via `next` from `id`, excluding `id` itself.
    ///
    /// Stops at a missing record or when a link revisits an earlier member.
    pub fn forward_chain(&self, id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        seen.insert(id.to_string());
        let mut chain = Vec::new();
        let mut cursor = self.get(id).and_then(|task| task.next.clone());

        while let Some(next_id) = cursor {
            if chain.len() >= MAX_CHAIN_LEN || !seen.insert(next_id.clone()) {
                tracing::warn!(task = %id, at = %next_id, "chain loops back on itself");
                break;
            }
            let Some(next) = self.get(&next_id) else {
                tracing::warn!(task = %id, missing = %next_id, "chain link points at a missing record");
                break;
            };
            cursor = next.next.clone();
            chain.push(next_id);
        }
        chain
    }

    /// Last reachable member of the chain starting at `id`.
    pub fn chain_tail(&self, id: &str) -> String {
        self.forward_chain(id)
            .pop()
            .unwrap_or_else(|| id.to_string())
    }

    /// Occurrence of `root_id` whose start falls on `day`, newest first.
    pub fn children_on(&self, root_id: &str, day: NaiveDate) -> Vec<&Task> {
        let mut found: Vec<&Task> = self
            .children_of(root_id)
            .into_iter()
            .filter(|task| task.start_day() == day)
            .collect();
        found.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        found
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn category_by_title(&self, title: &str) -> Option<&Category> {
        let title = title.trim();
        self.categories
            .iter()
            .find(|category| category.title.trim().eq_ignore_ascii_case(title))
    }

    pub fn add_category(&mut self, category: Category) {
        self.categories.push(category);
        self.changed = true;
    }

    /// Remove a category and every task reference to it.
    pub fn remove_category(&mut self, id: Uuid) -> Result<Category> {
        let index = self
            .categories
            .iter()
            .position(|category| category.id == id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        let removed = self.categories.remove(index);
        for task in &mut self.tasks {
            task.categories.retain(|category| *category != id);
        }
        self.changed = true;
        Ok(removed)
    }
}

/// Where a [`Store`] loads from and commits to.
pub trait Persist: Send {
    fn load(&self) -> Result<(Vec<Task>, Vec<Category>)>;
    fn commit(&self, tasks: &[Task], categories: &[Category]) -> Result<()>;
}

/// Working set plus backend for a single logical writer.
pub struct Store {
    backend: Box<dyn Persist>,
    working: WorkingSet,
}

impl Store {
    pub fn open(backend: Box<dyn Persist>) -> Result<Self> {
        let (tasks, categories) = backend.load()?;
        tracing::debug!(tasks = tasks.len(), categories = categories.len(), "store loaded");
        Ok(Self {
            backend,
            working: WorkingSet::new(tasks, categories),
        })
    }

    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut WorkingSet {
        &mut self.working
    }

    pub fn fetch_occurrences<P>(&self, predicate: P) -> Vec<&Task>
    where
        P: Fn(&Task) -> bool,
    {
        self.working.fetch(predicate)
    }

    pub fn fetch_categories<P>(&self, predicate: P) -> Vec<&Category>
    where
        P: Fn(&Category) -> bool,
    {
        self.working
            .categories()
            .iter()
            .filter(|category| predicate(category))
            .collect()
    }

    /// Commit the working set. Returns `false` when there was nothing to write.
    ///
    /// On failure the working set keeps its changes, so calling `save` again
    /// retries without recomputing the pass.
    pub fn save(&mut self) -> Result<bool> {
        if !self.working.is_changed() {
            return Ok(false);
        }
        self.backend
            .commit(self.working.tasks(), self.working.categories())?;
        self.working.mark_committed();
        tracing::debug!(tasks = self.working.tasks().len(), "store committed");
        Ok(true)
    }

    /// Replace the working set with the backend's current contents.
    ///
    /// Uncommitted changes are kept rather than discarded.
    pub fn reload(&mut self) -> Result<bool> {
        if self.working.is_changed() {
            tracing::warn!("skipping reload: working set has uncommitted changes");
            return Ok(false);
        }
        let (tasks, categories) = self.backend.load()?;
        self.working = WorkingSet::new(tasks, categories);
        Ok(true)
    }
}

#[cfg(test)]
pub use memory::MemoryBackend;

#[cfg(test)]
mod memory {
    use std::sync::{Arc, Mutex};

    use super::Persist;
    use crate::error::{Error, Result};
    use crate::task::{Category, Task};

    /// In-process backend, shared between clones. Can be told to fail commits.
    #[derive(Clone, Default)]
    pub struct MemoryBackend {
        state: Arc<Mutex<MemoryState>>,
    }

    #[derive(Default)]
    struct MemoryState {
        tasks: Vec<Task>,
        categories: Vec<Category>,
        fail_commits: bool,
        commits: usize,
    }

    impl MemoryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_tasks(tasks: Vec<Task>) -> Self {
            let backend = Self::default();
            if let Ok(mut state) = backend.state.lock() {
                state.tasks = tasks;
            }
            backend
        }

        pub fn set_fail_commits(&self, fail: bool) {
            if let Ok(mut state) = self.state.lock() {
                state.fail_commits = fail;
            }
        }

        pub fn commits(&self) -> usize {
            self.state.lock().map(|state| state.commits).unwrap_or(0)
        }

        pub fn tasks(&self) -> Vec<Task> {
            self.state
                .lock()
                .map(|state| state.tasks.clone())
                .unwrap_or_default()
        }

        fn locked(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
            self.state
                .lock()
                .map_err(|_| Error::OperationFailed("memory backend poisoned".to_string()))
        }
    }

    impl Persist for MemoryBackend {
        fn load(&self) -> Result<(Vec<Task>, Vec<Category>)> {
            let state = self.locked()?;
            Ok((state.tasks.clone(), state.categories.clone()))
        }

        fn commit(&self, tasks: &[Task], categories: &[Category]) -> Result<()> {
            let mut state = self.locked()?;
            if state.fail_commits {
                return Err(Error::OperationFailed("store unavailable".to_string()));
            }
            state.tasks = tasks.to_vec();
            state.categories = categories.to_vec();
            state.commits += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates;
    use crate::repeat::RepeatRule;

    fn task(id: &str, start: &str) -> Task {
        let start = dates::parse_datetime(start).expect("datetime");
        Task::new(id, id, start, start, start)
    }

    fn chain() -> WorkingSet {
        let mut root = task("root", "2024-01-01 09:00");
        root.rule = RepeatRule::daily(root.start_day(), 1);
        let mut set = WorkingSet::new(vec![root], Vec::new());
        for (id, start) in [("a", "2024-01-02 09:00"), ("b", "2024-01-03 09:00")] {
            let tail = set.chain_tail("root");
            let mut child = task(id, start);
            child.parent = Some("root".to_string());
            child.is_child = true;
            set.insert_after(&tail, child).expect("insert");
        }
        set
    }

    #[test]
    fn insert_after_links_both_directions() {
        let set = chain();
        assert_eq!(set.forward_chain("root"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(set.get("b").and_then(|t| t.prev.as_deref()), Some("a"));
        assert_eq!(set.chain_tail("root"), "b");
    }

    #[test]
    fn unlink_excludes_day_and_relinks() {
        let mut set = chain();
        set.unlink("a").expect("unlink");

        let root = set.get("root").expect("root");
        assert_eq!(root.next.as_deref(), Some("b"));
        assert!(root.rule.is_excluded(dates::parse_date("2024-01-02").expect("date")));

        let a = set.get("a").expect("a");
        assert!(a.parent.is_none() && a.prev.is_none() && a.next.is_none());
        assert_eq!(a.rule.class, RepeatClass::None);
        assert_eq!(set.get("b").and_then(|t| t.prev.as_deref()), Some("root"));
    }

    #[test]
    fn forward_chain_stops_on_cycle_and_missing_links() {
        let mut set = chain();
        set.update("b", |t| t.next = Some("root".to_string())).expect("loop");
        assert_eq!(set.forward_chain("root").len(), 2);

        set.update("a", |t| t.next = Some("ghost".to_string())).expect("break");
        assert_eq!(set.forward_chain("root"), vec!["a".to_string()]);
        assert_eq!(set.chain_tail("root"), "a");
    }

    #[test]
    fn delete_removes_duplicates_too() {
        let mut set = chain();
        set.insert(task("dup", "2024-01-05 09:00"));
        set.insert(task("dup", "2024-01-05 09:00"));
        set.delete("dup").expect("delete");
        assert!(!set.contains("dup"));
    }

    #[test]
    fn save_is_noop_when_unchanged_and_retains_on_failure() {
        let backend = MemoryBackend::new();
        let mut store = Store::open(Box::new(backend.clone())).expect("open");
        assert!(!store.save().expect("noop save"));
        assert_eq!(backend.commits(), 0);

        store.working_mut().insert(task("t", "2024-01-01 09:00"));
        backend.set_fail_commits(true);
        assert!(store.save().is_err());
        assert!(store.working().is_changed());
        assert!(store.working().contains("t"));

        backend.set_fail_commits(false);
        assert!(store.save().expect("retry"));
        assert_eq!(backend.tasks().len(), 1);
        assert!(!store.working().is_changed());
    }

    #[test]
    fn remove_category_strips_references() {
        let mut set = chain();
        let category = Category::new("work");
        let id = category.id;
        set.add_category(category);
        set.update("a", |t| t.categories.push(id)).expect("tag");
        set.remove_category(id).expect("remove");
        assert!(set.get("a").expect("a").categories.is_empty());
    }
}
