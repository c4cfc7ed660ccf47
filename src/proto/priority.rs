use crate::codec::Codec;
use crate::frame::{StreamDependency, StreamId};
use crate::tracing::{debug, trace};

use bytes::BytesMut;

use std::collections::BTreeMap;

/// An abstract stream priority: the stream it depends on, whether the
/// dependency is exclusive and the wire weight (0 to 255, meaning 1 to 256).
///
/// Codecs that do not prioritize carry the value through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub dependency: StreamId,
    pub exclusive: bool,
    pub weight: u8,
}

/// The weight given to transactions that never asked for one.
pub const DEFAULT_WEIGHT: u8 = 15;

impl Priority {
    pub fn new(dependency: StreamId, exclusive: bool, weight: u8) -> Priority {
        Priority {
            dependency,
            exclusive,
            weight,
        }
    }
}

impl Default for Priority {
    fn default() -> Priority {
        Priority::new(StreamId::zero(), false, DEFAULT_WEIGHT)
    }
}

impl From<StreamDependency> for Priority {
    fn from(src: StreamDependency) -> Priority {
        Priority::new(src.dependency_id(), src.is_exclusive(), src.weight())
    }
}

impl From<Priority> for StreamDependency {
    fn from(src: Priority) -> StreamDependency {
        StreamDependency::new(src.dependency, src.weight, src.exclusive)
    }
}

/// A small tree of virtual priority nodes built once per connection.
///
/// The tree has one root node hanging off stream 0 and one child per
/// configured level. Transactions asking for a level depend on the root with
/// that level's weight; levels that were not configured fall back to the
/// last level added.
///
/// ```
/// use hsession::PriorityTree;
///
/// let tree = PriorityTree::new(1).level(0, 18).level(2, 2);
/// assert_eq!(tree.levels().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTree {
    root_weight: u8,
    levels: Vec<(u8, u8)>,
}

impl PriorityTree {
    pub fn new(root_weight: u8) -> PriorityTree {
        PriorityTree {
            root_weight,
            levels: Vec::new(),
        }
    }

    /// Adds a bucket for `level` with the given wire weight.
    pub fn level(mut self, level: u8, weight: u8) -> PriorityTree {
        self.levels.push((level, weight));
        self
    }

    pub fn levels(&self) -> &[(u8, u8)] {
        &self.levels
    }
}

/// Maps priority levels onto codec dependency ids.
#[derive(Debug)]
pub(super) struct Coordinator {
    tree: Option<PriorityTree>,

    /// Per level priorities once the tree was sent.
    built: BTreeMap<u8, Priority>,

    /// The priority of the last configured level.
    lowest: Option<Priority>,

    /// Legacy nodes, one per level, created on first use.
    fallback: BTreeMap<u8, StreamId>,

    /// Highest id allocated for a node.
    last_node: Option<StreamId>,
}

impl Coordinator {
    pub fn new(tree: Option<PriorityTree>) -> Coordinator {
        Coordinator {
            tree,
            built: BTreeMap::new(),
            lowest: None,
            fallback: BTreeMap::new(),
            last_node: None,
        }
    }

    /// Sends PRIORITY frames for every virtual node of the configured tree.
    ///
    /// The tree is kept until a codec that prioritizes builds it, so a
    /// session upgraded from HTTP/1.1 gets its nodes after the switch.
    /// Returns the number of bytes written.
    pub fn build(&mut self, codec: &mut dyn Codec, dst: &mut BytesMut) -> usize {
        if !codec.supports_priority() {
            return 0;
        }

        let tree = match self.tree.take() {
            Some(tree) => tree,
            None => return 0,
        };

        let start = dst.len();

        let root = match send_priority(
            codec,
            dst,
            Priority::new(StreamId::zero(), false, tree.root_weight),
        ) {
            Some(id) => id,
            None => return dst.len() - start,
        };
        self.last_node = Some(root);

        for &(level, weight) in tree.levels() {
            let pri = Priority::new(root, false, weight);
            match send_priority(codec, dst, pri) {
                Some(id) => self.last_node = Some(id),
                None => break,
            }
            self.built.insert(level, pri);
            self.lowest = Some(pri);
        }

        debug!(nodes = self.built.len() + 1, "built virtual priority tree");
        dst.len() - start
    }

    pub fn has_tree(&self) -> bool {
        self.lowest.is_some()
    }

    /// The priority for `level` from the virtual tree, if one was built.
    pub fn get(&self, level: u8) -> Option<Priority> {
        self.built.get(&level).copied().or(self.lowest)
    }

    /// Returns the legacy node for `level`, creating it on first use.
    pub fn fallback_node(
        &mut self,
        codec: &mut dyn Codec,
        dst: &mut BytesMut,
        level: u8,
    ) -> Option<StreamId> {
        let level = level.min(7);

        if let Some(id) = self.fallback.get(&level) {
            return Some(*id);
        }

        let weight = 255 - level * 32;
        let id = send_priority(codec, dst, Priority::new(StreamId::zero(), false, weight))?;
        trace!(level, ?id, "created fallback priority node");
        self.fallback.insert(level, id);
        self.last_node = self.last_node.max(Some(id));
        Some(id)
    }

    pub fn last_node(&self) -> Option<StreamId> {
        self.last_node
    }
}

/// Allocates a virtual stream and announces its priority.
pub(super) fn send_priority(
    codec: &mut dyn Codec,
    dst: &mut BytesMut,
    pri: Priority,
) -> Option<StreamId> {
    if !codec.supports_priority() {
        return None;
    }

    let id = codec.create_stream()?;
    codec.generate_priority(dst, id, &pri);
    Some(id)
}
