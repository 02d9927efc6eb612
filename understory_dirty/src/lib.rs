#![no_std]
extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Channel(u32);

impl Channel {
    pub const fn new(n: u32) -> Self {
        Self(n)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CycleHandling {
    #[default]
    DebugAssert,
    Error,
    Ignore,
    Allow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleError;

pub struct EagerPolicy;

#[derive(Debug, Default)]
pub struct DirtyTracker<K: Copy + Ord> {
    // (channel, dependency) -> dependents
    dependents: BTreeMap<(Channel, K), BTreeSet<K>>,
    // (channel, dependent) -> dependencies
    dependencies: BTreeMap<(Channel, K), BTreeSet<K>>,
    dirty: BTreeMap<Channel, BTreeSet<K>>,
    cycle_handling: CycleHandling,
}

impl<K: Copy + Ord> DirtyTracker<K> {
    pub fn new() -> Self {
        Self::with_cycle_handling(CycleHandling::DebugAssert)
    }

    pub fn with_cycle_handling(cycle_handling: CycleHandling) -> Self {
        Self {
            dependents: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            dirty: BTreeMap::new(),
            cycle_handling,
        }
    }

    fn reaches(&self, from: K, to: K, channel: Channel) -> bool {
        // true if `to` is a transitive dependent of `from`
        let mut stack = alloc::vec![from];
        let mut seen = BTreeSet::new();
        while let Some(k) = stack.pop() {
            if k == to {
                return true;
            }
            if !seen.insert(k) {
                continue;
            }
            if let Some(deps) = self.dependents.get(&(channel, k)) {
                stack.extend(deps.iter().copied());
            }
        }
        false
    }

    pub fn add_dependency(
        &mut self,
        dependent: K,
        dependency: K,
        channel: Channel,
    ) -> Result<(), CycleError> {
        if !matches!(self.cycle_handling, CycleHandling::Allow)
            && self.reaches(dependent, dependency, channel)
        {
            match self.cycle_handling {
                CycleHandling::Error => return Err(CycleError),
                CycleHandling::Ignore => return Ok(()),
                CycleHandling::DebugAssert => {
                    debug_assert!(false, "cycle");
                    return Ok(());
                }
                CycleHandling::Allow => unreachable!(),
            }
        }
        self.dependents
            .entry((channel, dependency))
            .or_default()
            .insert(dependent);
        self.dependencies
            .entry((channel, dependent))
            .or_default()
            .insert(dependency);
        Ok(())
    }

    pub fn remove_dependency(&mut self, dependent: K, dependency: K, channel: Channel) {
        if let Some(s) = self.dependents.get_mut(&(channel, dependency)) {
            s.remove(&dependent);
        }
        if let Some(s) = self.dependencies.get_mut(&(channel, dependent)) {
            s.remove(&dependency);
        }
    }

    pub fn remove_key(&mut self, key: K) {
        let channels: BTreeSet<Channel> = self
            .dependents
            .keys()
            .chain(self.dependencies.keys())
            .map(|(c, _)| *c)
            .chain(self.dirty.keys().copied())
            .collect();
        for c in channels {
            if let Some(deps) = self.dependencies.remove(&(c, key)) {
                for d in deps {
                    if let Some(s) = self.dependents.get_mut(&(c, d)) {
                        s.remove(&key);
                    }
                }
            }
            if let Some(deps) = self.dependents.remove(&(c, key)) {
                for d in deps {
                    if let Some(s) = self.dependencies.get_mut(&(c, d)) {
                        s.remove(&key);
                    }
                }
            }
            if let Some(s) = self.dirty.get_mut(&c) {
                s.remove(&key);
            }
        }
    }

    pub fn mark(&mut self, key: K, channel: Channel) {
        self.dirty.entry(channel).or_default().insert(key);
    }

    pub fn mark_with(&mut self, key: K, channel: Channel, _policy: &EagerPolicy) {
        let mut stack = alloc::vec![key];
        let set = self.dirty.entry(channel).or_default();
        let mut seen = BTreeSet::new();
        while let Some(k) = stack.pop() {
            if !seen.insert(k) {
                continue;
            }
            set.insert(k);
            if let Some(deps) = self.dependents.get(&(channel, k)) {
                stack.extend(deps.iter().copied());
            }
        }
    }

    pub fn drain(&mut self, channel: Channel) -> DrainBuilder<'_, K> {
        DrainBuilder {
            tracker: self,
            channel,
            affected: false,
        }
    }
}

pub struct DrainBuilder<'a, K: Copy + Ord> {
    tracker: &'a mut DirtyTracker<K>,
    channel: Channel,
    affected: bool,
}

impl<'a, K: Copy + Ord> DrainBuilder<'a, K> {
    pub fn affected(mut self) -> Self {
        self.affected = true;
        self
    }

    pub fn deterministic(self) -> Self {
        self
    }

    pub fn run(self) -> impl Iterator<Item = K> + 'a {
        let channel = self.channel;
        let mut set = self
            .tracker
            .dirty
            .remove(&channel)
            .unwrap_or_default();
        if self.affected {
            let mut stack: Vec<K> = set.iter().copied().collect();
            while let Some(k) = stack.pop() {
                if let Some(deps) = self.tracker.dependents.get(&(channel, k)) {
                    for &d in deps {
                        if set.insert(d) {
                            stack.push(d);
                        }
                    }
                }
            }
        }
        // Topological order: dependencies before dependents; ties by key order.
        let mut order: Vec<K> = Vec::with_capacity(set.len());
        let mut remaining: BTreeSet<K> = set.clone();
        while !remaining.is_empty() {
            let mut progressed = false;
            let ready: Vec<K> = remaining
                .iter()
                .copied()
                .filter(|&k| {
                    self.tracker
                        .dependencies
                        .get(&(channel, k))
                        .map_or(true, |deps| deps.iter().all(|d| !remaining.contains(d)))
                })
                .collect();
            for k in ready {
                remaining.remove(&k);
                order.push(k);
                progressed = true;
            }
            if !progressed {
                // Cycle fallback: emit in key order.
                order.extend(remaining.iter().copied());
                break;
            }
        }
        order.into_iter()
    }
}
