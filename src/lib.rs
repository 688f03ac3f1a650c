//! Tree-synchronization core for a solution-explorer panel.
//! 解決方案總管面板的樹狀同步核心模組。
//!
//! Parses solution/project descriptors into a declarative model, builds a
//! typed tree with stable node identities, reconciles fresh rebuilds against
//! the previously rendered tree, and persists the user's expansion state.
//! The host editor's file watching, rendering, and command layers sit outside
//! this crate and consume it through [`TreeNode`] and encoded identities.

pub mod builder;
pub mod expansion;
pub mod identity;
pub mod node;
pub mod parser;
pub mod reconcile;
pub mod solution;

pub use builder::{TreeBuilder, DEPENDENCIES_LABEL};
pub use expansion::{
    apply_restored, collect_expanded, ExpansionStore, ExpansionStoreError, EXPANSION_FILE_NAME,
};
pub use identity::{CategoryKind, IdentityError, NodeIdentity, NodeKind};
pub use node::TreeNode;
pub use parser::{
    Dependency, FileEntry, ItemType, ParseCache, ProjectModel, ProjectModelParser, ReferenceKind,
};
pub use reconcile::reconcile;
pub use solution::{
    parse_solution, SolutionModel, SolutionProject, SOLUTION_FOLDER_TYPE_GUID,
};
