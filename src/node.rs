use crate::identity::{NodeIdentity, NodeKind};

/// A node of the rendered solution tree. Built fresh on every rebuild; only
/// `expanded` and `loaded` may be carried over from a prior tree, and only by
/// the reconciler.
/// 解決方案樹的節點。每次重建都會重新產生；僅 `expanded` 與 `loaded`
/// 可由調和器自前一棵樹轉移。
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub identity: NodeIdentity,
    pub label: String,
    pub children: Vec<TreeNode>,
    pub expanded: bool,
    pub loaded: bool,
    pub has_children: bool,
}

impl TreeNode {
    /// Creates a collapsed, eagerly-loaded leaf node.
    /// 建立已載入且收合的葉節點。
    pub fn new(identity: NodeIdentity, label: impl Into<String>) -> Self {
        Self {
            identity,
            label: label.into(),
            children: Vec::new(),
            expanded: false,
            loaded: true,
            has_children: false,
        }
    }

    /// Attaches eagerly-built children, updating `has_children`.
    /// 附掛立即建立的子節點並更新 `has_children`。
    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.has_children = !children.is_empty();
        self.children = children;
        self
    }

    /// Marks the node lazily loadable: children present are placeholders the
    /// consumer must re-request.
    /// 標記為延遲載入；現有子節點僅為佔位，使用端需重新要求。
    pub fn lazily_loaded(mut self) -> Self {
        self.loaded = false;
        self
    }

    /// The node kind, derived from the identity.
    /// 節點類型，由識別碼推導。
    pub fn kind(&self) -> NodeKind {
        self.identity.kind()
    }

    /// True for nodes without filesystem backing.
    /// 虛擬節點回傳 true。
    pub fn is_virtual(&self) -> bool {
        self.identity.is_virtual()
    }
}
