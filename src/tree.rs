//! The HTTP/2 priority tree (RFC 7540 Section 5.3).
//!
//! `PriorityTree` owns every stream node in a slab arena keyed by a
//! side-table of stream IDs. Parent and child links are slab keys, so the
//! conceptual parent/child cycle never turns into an ownership cycle, and
//! removing a stream genuinely frees it.
//!
//! Callers mutate the tree (insert, reprioritize, remove, block, unblock)
//! and poll [`PriorityTree::next_stream`] for the next stream to serve.

use std::collections::HashMap;

use slab::Slab;

use crate::error::Error;
use crate::scheduler::WfqScheduler;
use crate::stream::{Node, Priority, DEFAULT_WEIGHT};

/// Configuration for a [`PriorityTree`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Hard upper bound on the number of streams in the tree. Insertion at
    /// the bound fails with [`Error::TooManyStreams`]. Defaults to 1000, a
    /// safety ceiling against peers that open dependencies without bound;
    /// set it lower when the connection allows.
    pub maximum_streams: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maximum_streams: 1000,
        }
    }
}

/// A priority tree over HTTP/2 streams.
///
/// Streams are identified by positive IDs; ID 0 is the connection
/// pseudo-stream that roots the tree and is not mutable through this API.
/// Freshly inserted streams start blocked: declare priorities first, then
/// [`unblock`](Self::unblock) a stream once it has data and flow-control
/// clearance.
#[derive(Debug)]
pub struct PriorityTree {
    nodes: Slab<Node>,
    /// Stream ID to slab key, including 0 for the root.
    index: HashMap<u32, usize>,
    root: usize,
    /// User streams currently in the tree (the root is not counted).
    stream_count: usize,
    maximum_streams: usize,
}

impl PriorityTree {
    /// Create a tree. Fails with [`Error::BadTreeConfig`] when
    /// `maximum_streams` is zero.
    pub fn new(config: Config) -> Result<Self, Error> {
        if config.maximum_streams == 0 {
            return Err(Error::BadTreeConfig);
        }
        Ok(Self::with_cap(config.maximum_streams))
    }

    fn with_cap(maximum_streams: usize) -> Self {
        let mut nodes = Slab::new();
        // The root is permanently blocked, so its activeness is exactly
        // "some user stream is active".
        let root = nodes.insert(Node::new(0, DEFAULT_WEIGHT));
        let mut index = HashMap::new();
        index.insert(0, root);
        Self {
            nodes,
            index,
            root,
            stream_count: 0,
            maximum_streams,
        }
    }

    /// Insert a stream.
    ///
    /// An unknown `depends_on` resolves to the root: RFC 7540 permits
    /// depending on idle or closed streams. The new stream starts blocked,
    /// so insertion never changes which streams are schedulable.
    pub fn insert_stream(&mut self, stream_id: u32, priority: Priority) -> Result<(), Error> {
        if stream_id == 0 {
            return Err(Error::PseudoStream);
        }
        if self.index.contains_key(&stream_id) {
            return Err(Error::DuplicateStream(stream_id));
        }
        check_weight(priority.weight)?;
        if priority.depends_on == stream_id {
            return Err(Error::PriorityLoop(stream_id));
        }
        if self.stream_count == self.maximum_streams {
            return Err(Error::TooManyStreams(self.maximum_streams));
        }

        let parent = self
            .index
            .get(&priority.depends_on)
            .copied()
            .unwrap_or(self.root);
        let node = self.nodes.insert(Node::new(stream_id, priority.weight));
        if priority.exclusive {
            self.capture_children(parent, node);
        }
        self.link(parent, node);
        self.index.insert(stream_id, node);
        self.stream_count += 1;
        Ok(())
    }

    /// Change a stream's dependency, weight, or exclusivity.
    ///
    /// Unlike insertion, both the stream and a non-zero `depends_on` must
    /// exist. Moving a stream underneath one of its own descendants first
    /// splices the stream's children into its old position, so the move
    /// cannot create a cycle (RFC 7540 Section 5.3.3).
    pub fn reprioritize(&mut self, stream_id: u32, priority: Priority) -> Result<(), Error> {
        let key = self.user_stream(stream_id)?;
        check_weight(priority.weight)?;
        if priority.depends_on == stream_id {
            return Err(Error::PriorityLoop(stream_id));
        }
        let new_parent = self
            .index
            .get(&priority.depends_on)
            .copied()
            .ok_or(Error::MissingStream(priority.depends_on))?;
        let old_parent = self.nodes[key].parent.unwrap();

        if self.is_descendant(new_parent, key) {
            // Hand the stream's children to its current parent, in order,
            // at the stream's position. The new parent is above the stream
            // afterwards.
            let position = self.position_of(old_parent, key);
            let children = std::mem::take(&mut self.nodes[key].children);
            self.nodes[key].active_children = 0;
            self.nodes[key].scheduler = WfqScheduler::default();
            for (offset, child) in children.into_iter().enumerate() {
                self.insert_child(old_parent, position + 1 + offset, child);
            }
            self.bubble(key);
        }

        self.remove_child(old_parent, key);
        if priority.exclusive {
            self.capture_children(new_parent, key);
        }
        self.nodes[key].weight = priority.weight;
        self.link(new_parent, key);
        self.bubble(new_parent);
        self.bubble(old_parent);
        Ok(())
    }

    /// Remove a stream, splicing its children into its parent at its own
    /// position (the head of the child list takes the freed slot). Weights
    /// are preserved. Removing the same stream twice fails with
    /// [`Error::MissingStream`].
    pub fn remove_stream(&mut self, stream_id: u32) -> Result<(), Error> {
        let key = self.user_stream(stream_id)?;
        let parent = self.nodes[key].parent.unwrap();
        let position = self.remove_child(parent, key);
        let children = std::mem::take(&mut self.nodes[key].children);
        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(parent, position + offset, child);
        }
        self.bubble(parent);
        self.index.remove(&stream_id);
        self.nodes.remove(key);
        self.stream_count -= 1;
        Ok(())
    }

    /// Mark a stream as unable to transmit. Idempotent.
    pub fn block(&mut self, stream_id: u32) -> Result<(), Error> {
        let key = self.user_stream(stream_id)?;
        self.nodes[key].blocked = true;
        self.bubble(key);
        Ok(())
    }

    /// Mark a stream as ready to transmit. Idempotent.
    pub fn unblock(&mut self, stream_id: u32) -> Result<(), Error> {
        let key = self.user_stream(stream_id)?;
        self.nodes[key].blocked = false;
        self.bubble(key);
        Ok(())
    }

    /// Yield the next stream to serve.
    ///
    /// One weighted round-robin step: descend from the root to the
    /// highest-priority unblocked stream, then re-key every node popped
    /// along the way at its parent's advanced clock so the next call moves
    /// on. Fails with [`Error::Deadlock`] while no stream is active;
    /// unblocking a stream and calling again resumes scheduling.
    pub fn next_stream(&mut self) -> Result<u32, Error> {
        if self.nodes[self.root].scheduler.is_empty() {
            return Err(Error::Deadlock);
        }
        self.schedule(self.root).ok_or(Error::Deadlock)
    }

    /// Endless iterator over scheduled stream IDs.
    ///
    /// Ends only at deadlock; after further mutations a new call resumes
    /// where scheduling left off.
    pub fn ids(&mut self) -> Ids<'_> {
        Ids { tree: self }
    }

    /// Number of streams in the tree, excluding the root.
    pub fn stream_count(&self) -> usize {
        self.stream_count
    }

    /// The configured stream cap.
    pub fn maximum_streams(&self) -> usize {
        self.maximum_streams
    }

    /// Whether `stream_id` names a stream in the tree. The root does not
    /// count.
    pub fn contains(&self, stream_id: u32) -> bool {
        stream_id != 0 && self.index.contains_key(&stream_id)
    }

    /// Whether the stream is currently blocked.
    pub fn is_blocked(&self, stream_id: u32) -> Result<bool, Error> {
        Ok(self.nodes[self.user_stream(stream_id)?].blocked)
    }

    /// The stream's weight.
    pub fn weight_of(&self, stream_id: u32) -> Result<u16, Error> {
        Ok(self.nodes[self.user_stream(stream_id)?].weight)
    }

    /// The stream's parent ID; 0 for streams attached to the root.
    pub fn parent_of(&self, stream_id: u32) -> Result<u32, Error> {
        let key = self.user_stream(stream_id)?;
        let parent = self.nodes[key].parent.unwrap();
        Ok(self.nodes[parent].id)
    }

    /// The stream's children in dependency order. Accepts 0 for the root.
    pub fn children_of(&self, stream_id: u32) -> Result<Vec<u32>, Error> {
        let key = self
            .index
            .get(&stream_id)
            .copied()
            .ok_or(Error::MissingStream(stream_id))?;
        Ok(self.nodes[key]
            .children
            .iter()
            .map(|&child| self.nodes[child].id)
            .collect())
    }

    /// Look up a mutable, non-root stream.
    fn user_stream(&self, stream_id: u32) -> Result<usize, Error> {
        if stream_id == 0 {
            return Err(Error::PseudoStream);
        }
        self.index
            .get(&stream_id)
            .copied()
            .ok_or(Error::MissingStream(stream_id))
    }

    /// Pop the next active child of `key`, recursing while that child is
    /// blocked, and re-add it keyed at the advanced clock on the way out.
    fn schedule(&mut self, key: usize) -> Option<u32> {
        let child = self.nodes[key].scheduler.pop()?;
        let id = if self.nodes[child].blocked {
            self.schedule(child)
        } else {
            Some(self.nodes[child].id)
        };
        let weight = self.nodes[child].weight;
        self.nodes[key].scheduler.add(child, weight);
        id
    }

    /// Attach `child` at the end of `parent`'s child list.
    fn link(&mut self, parent: usize, child: usize) {
        self.insert_child(parent, self.nodes[parent].children.len(), child);
    }

    /// Attach `child` at `position` among `parent`'s children, registering
    /// it with the parent's scheduler if it is active.
    fn insert_child(&mut self, parent: usize, position: usize, child: usize) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(position, child);
        if self.nodes[child].active {
            let weight = self.nodes[child].weight;
            self.nodes[parent].active_children += 1;
            self.nodes[parent].scheduler.add(child, weight);
        }
    }

    /// Detach `child` from `parent`, returning the position it held.
    fn remove_child(&mut self, parent: usize, child: usize) -> usize {
        let position = self.position_of(parent, child);
        self.nodes[parent].children.remove(position);
        if self.nodes[child].active {
            self.nodes[parent].active_children -= 1;
            self.nodes[parent].scheduler.remove(child);
        }
        self.nodes[child].parent = None;
        position
    }

    fn position_of(&self, parent: usize, child: usize) -> usize {
        // A child is always on its parent's list.
        self.nodes[parent]
            .children
            .iter()
            .position(|&key| key == child)
            .unwrap()
    }

    /// Move every child of `parent` underneath `node` (exclusive
    /// attachment). `node` must be detached. The parent's scheduler
    /// restarts from a fresh clock; captured active children re-register
    /// under `node` in their previous order.
    fn capture_children(&mut self, parent: usize, node: usize) {
        let children = std::mem::take(&mut self.nodes[parent].children);
        self.nodes[parent].active_children = 0;
        self.nodes[parent].scheduler = WfqScheduler::default();
        for child in children {
            self.nodes[child].parent = Some(node);
            if self.nodes[child].active {
                let weight = self.nodes[child].weight;
                self.nodes[node].active_children += 1;
                self.nodes[node].scheduler.add(child, weight);
            }
            self.nodes[node].children.push(child);
        }
        let node = &mut self.nodes[node];
        node.active = node.is_active();
    }

    /// Recompute the cached activeness of `key` and walk upward while the
    /// flag keeps changing, keeping ancestor schedulers in sync.
    fn bubble(&mut self, key: usize) {
        let mut key = key;
        loop {
            let active = self.nodes[key].is_active();
            if active == self.nodes[key].active {
                return;
            }
            self.nodes[key].active = active;
            let Some(parent) = self.nodes[key].parent else {
                return;
            };
            if active {
                let weight = self.nodes[key].weight;
                self.nodes[parent].active_children += 1;
                self.nodes[parent].scheduler.add(key, weight);
            } else {
                self.nodes[parent].active_children -= 1;
                self.nodes[parent].scheduler.remove(key);
            }
            key = parent;
        }
    }

    /// Whether `key` lies strictly below `ancestor`.
    fn is_descendant(&self, key: usize, ancestor: usize) -> bool {
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }
}

impl Default for PriorityTree {
    fn default() -> Self {
        Self::with_cap(Config::default().maximum_streams)
    }
}

fn check_weight(weight: u16) -> Result<(), Error> {
    if (1..=256).contains(&weight) {
        Ok(())
    } else {
        Err(Error::BadWeight(weight))
    }
}

/// Endless scheduling sequence borrowed from a [`PriorityTree`].
///
/// Yields `None` once no stream is active; the tree can be mutated and a
/// fresh iterator created to resume.
#[derive(Debug)]
pub struct Ids<'a> {
    tree: &'a mut PriorityTree,
}

impl Iterator for Ids<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.tree.next_stream().ok()
    }
}
