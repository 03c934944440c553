//! Speculative schedule states.
//!
//! Each node is a schedule snapshot and each edge a swap request that would
//! lead from one to the other. The root is the schedule the portal last
//! reported. Children are where we'd be if a pending swap were approved.
//! Approvals, denials and schedule refreshes prune the tree.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::error::BidError;
use crate::model::{PairingKey, Schedule, Trip};
use crate::transition::Transition;

/// A schedule snapshot, equal to another iff the schedules are equal.
#[derive(Debug, Clone)]
pub struct ScheduleWrapper {
    schedule: Arc<Schedule>,
}

impl ScheduleWrapper {
    pub fn new(schedule: Arc<Schedule>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    /// The state we'd be in after dropping `drops` and adding `adds`.
    pub fn mutate(&self, adds: &[Trip], drops: &[PairingKey]) -> Result<ScheduleWrapper, BidError> {
        let schedule = self.schedule.copy_and_modify(adds, drops)?;
        Ok(ScheduleWrapper::new(Arc::new(schedule)))
    }
}

impl From<Schedule> for ScheduleWrapper {
    fn from(schedule: Schedule) -> Self {
        ScheduleWrapper::new(Arc::new(schedule))
    }
}

impl PartialEq for ScheduleWrapper {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schedule, &other.schedule) || *self.schedule == *other.schedule
    }
}

impl Eq for ScheduleWrapper {}

impl Hash for ScheduleWrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schedule.hash(state);
    }
}

impl fmt::Display for ScheduleWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.schedule.fmt(f)
    }
}

type Adjacency = HashMap<ScheduleWrapper, HashSet<ScheduleWrapper>>;

/// `start` and everything reachable from it, breadth first.
pub fn reachable_from(nodes: &Adjacency, start: &ScheduleWrapper) -> HashSet<ScheduleWrapper> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start.clone());
    queue.push_back(start.clone());
    while let Some(next) = queue.pop_front() {
        for child in nodes.get(&next).into_iter().flatten() {
            if seen.insert(child.clone()) {
                queue.push_back(child.clone());
            }
        }
    }
    seen
}

fn contains_node(nodes: &Adjacency, wrapper: &ScheduleWrapper) -> bool {
    nodes.contains_key(wrapper) || nodes.values().any(|children| children.contains(wrapper))
}

/// What `set_root` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reroot {
    /// The tree was empty.
    Planted,
    Unchanged,
    /// The new root was one of our speculative states.
    Pruned,
    /// The new root was unknown; everything was discarded.
    Replaced,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Adjacency,
    transitions: HashMap<Transition, ScheduleWrapper>,
    root: Option<ScheduleWrapper>,
    processed: HashSet<PairingKey>,
}

impl TreeState {
    fn set_root(&mut self, wrapper: ScheduleWrapper) -> Reroot {
        let Some(root) = &self.root else {
            info!(root = %wrapper, "rooting empty tree");
            self.root = Some(wrapper);
            self.transitions.clear();
            self.processed.clear();
            return Reroot::Planted;
        };
        if *root == wrapper {
            return Reroot::Unchanged;
        }
        if !contains_node(&self.nodes, &wrapper) {
            warn!(root = %wrapper, "tree does not contain schedule, rerooting");
            self.nodes.clear();
            self.transitions.clear();
            self.processed.clear();
            self.root = Some(wrapper);
            return Reroot::Replaced;
        }
        let keep = reachable_from(&self.nodes, &wrapper);
        self.transitions.retain(|_, node| keep.contains(node));
        self.nodes.retain(|node, children| {
            children.retain(|c| keep.contains(c));
            keep.contains(node) && !children.is_empty()
        });
        info!(root = %wrapper, nodes = keep.len(), "rerooted to speculative state");
        self.root = Some(wrapper);
        self.processed.clear();
        Reroot::Pruned
    }

    fn remove_subtree(&mut self, wrapper: &ScheduleWrapper) {
        let remove = reachable_from(&self.nodes, wrapper);
        self.transitions.retain(|_, node| !remove.contains(node));
        self.nodes.retain(|node, children| {
            children.retain(|c| !remove.contains(c));
            !remove.contains(node) && !children.is_empty()
        });
    }
}

/// Thread-safe; every operation takes the one lock.
#[derive(Debug)]
pub struct ScheduleWrapperTree {
    state: Mutex<TreeState>,
    reroot_on_approval: bool,
}

impl ScheduleWrapperTree {
    pub fn new(reroot_on_approval: bool) -> Self {
        Self {
            state: Mutex::new(TreeState::default()),
            reroot_on_approval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adopts a schedule freshly reported by the portal.
    pub fn set_root(&self, wrapper: ScheduleWrapper) -> Reroot {
        self.lock().set_root(wrapper)
    }

    /// Returns false if the transition is unknown, e.g. already pruned.
    pub fn mark_approved(&self, transition: &Transition) -> bool {
        let mut state = self.lock();
        let Some(survivor) = state.transitions.get(transition).cloned() else {
            info!(%transition, "approved transition missing");
            return false;
        };
        info!(%transition, "transition approved");
        if self.reroot_on_approval {
            state.set_root(survivor);
            return true;
        }
        let siblings: Vec<ScheduleWrapper> = state
            .nodes
            .values()
            .find(|children| children.contains(&survivor))
            .map(|children| children.iter().filter(|c| **c != survivor).cloned().collect())
            .unwrap_or_default();
        if !siblings.is_empty() {
            info!(%transition, peers = siblings.len(), "removing peers");
        }
        for sibling in &siblings {
            state.remove_subtree(sibling);
        }
        true
    }

    /// Returns false if the transition is unknown.
    pub fn mark_denied(&self, transition: &Transition) -> bool {
        let mut state = self.lock();
        let Some(node) = state.transitions.get(transition).cloned() else {
            info!(%transition, "denied transition missing");
            return false;
        };
        info!(%transition, "transition denied");
        state.remove_subtree(&node);
        true
    }

    /// Records that `transition` leads from `parent` to `child`.
    pub fn add_transition(
        &self,
        parent: &ScheduleWrapper,
        transition: Transition,
        child: ScheduleWrapper,
    ) -> Result<(), BidError> {
        let mut state = self.lock();
        if state.transitions.contains_key(&transition) {
            return Err(BidError::Invariant(format!(
                "transition already in tree: {}",
                transition
            )));
        }
        if state.root.as_ref() != Some(parent) && !contains_node(&state.nodes, parent) {
            return Err(BidError::Invariant(format!(
                "parent of {} not in tree",
                transition
            )));
        }
        state
            .nodes
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        state.transitions.insert(transition, child);
        Ok(())
    }

    pub fn contains_transition(&self, transition: &Transition) -> bool {
        self.lock().transitions.contains_key(transition)
    }

    pub fn should_process(&self, key: &PairingKey) -> bool {
        !self.lock().processed.contains(key)
    }

    pub fn mark_processed(&self, key: PairingKey) {
        self.lock().processed.insert(key);
    }

    pub fn root(&self) -> Option<ScheduleWrapper> {
        self.lock().root.clone()
    }

    pub fn num_transitions(&self) -> usize {
        self.lock().transitions.len()
    }

    /// Nodes other than the root.
    pub fn num_children(&self) -> usize {
        let state = self.lock();
        state
            .nodes
            .values()
            .flatten()
            .collect::<HashSet<_>>()
            .len()
    }

    /// Every transition resolves to the root or a node present in the tree.
    pub fn is_consistent(&self) -> bool {
        let state = self.lock();
        state
            .transitions
            .values()
            .all(|node| state.root.as_ref() == Some(node) || contains_node(&state.nodes, node))
    }
}
