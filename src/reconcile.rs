use std::collections::HashMap;

use crate::identity::{CategoryKind, NodeIdentity, NodeKind};
use crate::node::TreeNode;

/// Merges a freshly built tree with the previously rendered one. The fresh
/// structure always wins; only `expanded`/`loaded` are transplanted, and an
/// expanded package/project/assembly category is force-refreshed so the
/// consumer re-reads its children from current state instead of trusting a
/// stale snapshot.
/// 將全新建立的樹與前次呈現的樹合併。結構以新樹為準，僅轉移
/// `expanded`/`loaded`；已展開的套件/專案/組件分類會被強制重新整理，
/// 讓使用端改讀目前狀態而非過期快照。
pub fn reconcile(mut fresh: TreeNode, cached: Option<&TreeNode>) -> TreeNode {
    merge(&mut fresh, cached);
    fresh
}

fn merge(fresh: &mut TreeNode, cached: Option<&TreeNode>) {
    let Some(cached) = cached else {
        // Nothing to transplant at this node, and by extension nothing for
        // the subtree: without a cached counterpart every descendant keeps
        // its fresh defaults.
        return;
    };

    if cached.expanded {
        if force_refresh_on_expand(fresh.kind()) {
            fresh.expanded = true;
            fresh.loaded = false;
            fresh.children.clear();
            return;
        }
        fresh.expanded = true;
        fresh.loaded = cached.loaded;
    }

    let cached_children: HashMap<&NodeIdentity, &TreeNode> = cached
        .children
        .iter()
        .map(|child| (&child.identity, child))
        .collect();
    for child in &mut fresh.children {
        merge(child, cached_children.get(&child.identity).copied());
    }
}

/// Whether an expanded node of this kind must drop its children and reload.
/// The aggregate container and the frameworks category keep fresh structure.
fn force_refresh_on_expand(kind: NodeKind) -> bool {
    match kind {
        NodeKind::DependencyCategory(CategoryKind::Packages)
        | NodeKind::DependencyCategory(CategoryKind::Projects)
        | NodeKind::DependencyCategory(CategoryKind::Assemblies) => true,
        NodeKind::DependencyCategory(CategoryKind::Frameworks) => false,
        NodeKind::Solution
        | NodeKind::Project
        | NodeKind::Folder
        | NodeKind::File
        | NodeKind::SolutionFolder
        | NodeKind::SolutionItem
        | NodeKind::DependencyContainer
        | NodeKind::Dependency => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project_path() -> PathBuf {
        PathBuf::from("/ws/App/App.csproj")
    }

    fn dependency(name: &str, version: Option<&str>) -> TreeNode {
        TreeNode::new(
            NodeIdentity::Dependency {
                project: project_path(),
                category: CategoryKind::Packages,
                name: name.into(),
                version: version.map(str::to_string),
            },
            name,
        )
    }

    fn package_category(leaves: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(
            NodeIdentity::DependencyCategory {
                project: project_path(),
                category: CategoryKind::Packages,
            },
            "Packages",
        )
        .with_children(leaves)
        .lazily_loaded()
    }

    fn container(categories: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(
            NodeIdentity::DependencyContainer {
                project: project_path(),
            },
            "Dependencies",
        )
        .with_children(categories)
        .lazily_loaded()
    }

    fn project(children: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(
            NodeIdentity::Project {
                path: project_path(),
            },
            "App",
        )
        .with_children(children)
    }

    #[test]
    fn without_a_cached_tree_the_fresh_tree_is_untouched() {
        let fresh = project(vec![container(vec![package_category(vec![dependency(
            "Serilog",
            Some("3.1.1"),
        )])])]);
        let reconciled = reconcile(fresh.clone(), None);
        assert_eq!(reconciled, fresh);
    }

    #[test]
    fn reconciling_a_collapsed_tree_against_itself_is_a_no_op() {
        let fresh = project(vec![container(vec![package_category(vec![dependency(
            "Serilog",
            Some("3.1.1"),
        )])])]);
        let reconciled = reconcile(fresh.clone(), Some(&fresh));
        assert_eq!(reconciled, fresh);
    }

    #[test]
    fn expanded_category_is_force_refreshed_even_against_itself() {
        let mut cached = project(vec![container(vec![package_category(vec![dependency(
            "Serilog",
            Some("3.1.1"),
        )])])]);
        cached.expanded = true;
        cached.children[0].expanded = true;
        cached.children[0].children[0].expanded = true;
        cached.children[0].children[0].loaded = true;

        let reconciled = reconcile(cached.clone(), Some(&cached));
        let category = &reconciled.children[0].children[0];
        assert!(category.expanded);
        assert!(!category.loaded);
        assert!(category.children.is_empty());
        assert!(category.has_children);
    }

    #[test]
    fn removed_dependency_does_not_linger_after_refresh() {
        // Cached: the user expanded Packages and saw Newtonsoft.Json 13.0.1.
        let mut cached = project(vec![container(vec![package_category(vec![dependency(
            "Newtonsoft.Json",
            Some("13.0.1"),
        )])])]);
        cached.expanded = true;
        cached.children[0].expanded = true;
        cached.children[0].loaded = true;
        cached.children[0].children[0].expanded = true;
        cached.children[0].children[0].loaded = true;

        // Fresh: the reference was removed from the descriptor.
        let fresh = project(vec![container(vec![])]);
        let reconciled = reconcile(fresh, Some(&cached));

        let refreshed_container = &reconciled.children[0];
        assert!(refreshed_container.expanded);
        assert!(refreshed_container.children.is_empty());
        // The category node no longer exists in the fresh tree and is never
        // reintroduced from the cache.
        assert!(reconciled.expanded);
    }

    #[test]
    fn expanded_container_keeps_its_category_children() {
        let mut cached = project(vec![container(vec![package_category(vec![dependency(
            "Serilog",
            Some("3.1.1"),
        )])])]);
        cached.expanded = true;
        cached.children[0].expanded = true;
        cached.children[0].loaded = true;

        let fresh = project(vec![container(vec![package_category(vec![dependency(
            "Serilog",
            Some("3.1.1"),
        )])])]);
        let reconciled = reconcile(fresh, Some(&cached));

        let merged_container = &reconciled.children[0];
        assert!(merged_container.expanded);
        assert!(merged_container.loaded);
        assert_eq!(merged_container.children.len(), 1);
        // The collapsed category below it keeps fresh defaults.
        let category = &merged_container.children[0];
        assert!(!category.expanded);
        assert!(!category.loaded);
        assert_eq!(category.children.len(), 1);
    }

    #[test]
    fn frameworks_category_follows_the_fresh_structure_branch() {
        let framework_leaf = TreeNode::new(
            NodeIdentity::Dependency {
                project: project_path(),
                category: CategoryKind::Frameworks,
                name: "Microsoft.AspNetCore.App".into(),
                version: None,
            },
            "Microsoft.AspNetCore.App",
        );
        let frameworks = TreeNode::new(
            NodeIdentity::DependencyCategory {
                project: project_path(),
                category: CategoryKind::Frameworks,
            },
            "Frameworks",
        )
        .with_children(vec![framework_leaf])
        .lazily_loaded();

        let mut cached = project(vec![container(vec![frameworks.clone()])]);
        cached.expanded = true;
        cached.children[0].expanded = true;
        cached.children[0].children[0].expanded = true;
        cached.children[0].children[0].loaded = true;

        let fresh = project(vec![container(vec![frameworks])]);
        let reconciled = reconcile(fresh, Some(&cached));
        let category = &reconciled.children[0].children[0];
        assert!(category.expanded);
        assert!(category.loaded);
        assert_eq!(category.children.len(), 1);
    }

    #[test]
    fn expansion_transplants_down_matching_folder_chains() {
        let file = TreeNode::new(
            NodeIdentity::File {
                path: PathBuf::from("/ws/App/Views/Index.cshtml"),
            },
            "Index.cshtml",
        );
        let folder = TreeNode::new(
            NodeIdentity::Folder {
                path: PathBuf::from("/ws/App/Views"),
            },
            "Views",
        )
        .with_children(vec![file]);

        let mut cached = project(vec![container(vec![]), folder.clone()]);
        cached.expanded = true;
        cached.children[1].expanded = true;

        let fresh = project(vec![container(vec![]), folder]);
        let reconciled = reconcile(fresh, Some(&cached));
        assert!(reconciled.expanded);
        assert!(!reconciled.children[0].expanded);
        assert!(reconciled.children[1].expanded);
        assert_eq!(reconciled.children[1].children.len(), 1);
    }

    #[test]
    fn nodes_present_only_in_the_cache_are_dropped() {
        let ghost = TreeNode::new(
            NodeIdentity::File {
                path: PathBuf::from("/ws/App/Deleted.cs"),
            },
            "Deleted.cs",
        );
        let mut cached = project(vec![container(vec![]), ghost]);
        cached.expanded = true;
        cached.children[1].expanded = true;

        let fresh = project(vec![container(vec![])]);
        let reconciled = reconcile(fresh, Some(&cached));
        assert_eq!(reconciled.children.len(), 1);
        assert_eq!(
            reconciled.children[0].kind(),
            NodeKind::DependencyContainer
        );
    }
}
