//! Plain data exchanged across the store ports.

use std::fmt;

use treeline_domain::NodeId;

/// Compile-time descriptor of one hierarchy's node and closure tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HierarchyTable {
    /// Name used on the command line and in logs.
    pub name: &'static str,
    pub node_table: &'static str,
    pub closure_table: &'static str,
}

pub const PRODUCT_TAGS: HierarchyTable = HierarchyTable {
    name: "product-tags",
    node_table: "product_tag",
    closure_table: "product_tag_closure",
};

pub const USER_GROUPS: HierarchyTable = HierarchyTable {
    name: "user-groups",
    node_table: "user_group",
    closure_table: "user_group_closure",
};

impl HierarchyTable {
    pub const ALL: [HierarchyTable; 2] = [PRODUCT_TAGS, USER_GROUPS];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name == name)
    }
}

impl fmt::Display for HierarchyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An inclusive run of unused node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdGap {
    pub start: u32,
    pub end: u32,
}

impl IdGap {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The whole id space.
    pub fn full() -> Self {
        Self::new(NodeId::MIN.get(), NodeId::MAX.get())
    }

    /// Number of ids in the gap; zero when `end < start`.
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            u64::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
