use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::identity::{CategoryKind, NodeIdentity};
use crate::node::TreeNode;
use crate::parser::{normalize_separators, FileEntry, ProjectModel, ProjectModelParser};
use crate::solution::{parse_solution, SolutionModel, SolutionProject};

/// Label of the virtual dependency container under every project.
/// 每個專案底下虛擬相依容器的顯示名稱。
pub const DEPENDENCIES_LABEL: &str = "Dependencies";

/// Materializes a fresh tree from the solution and project descriptors.
/// Expansion is never set here; the reconciler injects it afterwards.
/// 依方案與專案描述檔建出全新樹狀結構；展開狀態一律由調和器事後注入。
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    parser: &'a mut ProjectModelParser,
}

impl<'a> TreeBuilder<'a> {
    /// Borrows the parser so every project of the solution shares its cache.
    /// 借用解析器，讓方案內所有專案共用同一份快取。
    pub fn new(parser: &'a mut ProjectModelParser) -> Self {
        Self { parser }
    }

    /// Builds the fresh tree rooted at the solution node.
    /// 建立以方案節點為根的全新樹。
    pub fn build(&mut self, solution_path: &Path) -> TreeNode {
        let solution_path = solution_path
            .canonicalize()
            .unwrap_or_else(|_| solution_path.to_path_buf());
        let model = parse_solution(&solution_path);
        let solution_dir = solution_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let label = solution_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| solution_path.display().to_string());

        let children = self.build_branch(&model, &solution_path, &solution_dir, None);
        TreeNode::new(
            NodeIdentity::Solution {
                path: solution_path,
            },
            label,
        )
        .with_children(children)
    }

    /// Children of one solution-folder level: nested folders, then solution
    /// items, then projects, each alphabetical.
    fn build_branch(
        &mut self,
        model: &SolutionModel,
        solution_path: &Path,
        solution_dir: &Path,
        parent_guid: Option<&str>,
    ) -> Vec<TreeNode> {
        let mut folders: Vec<&SolutionProject> = Vec::new();
        let mut projects: Vec<&SolutionProject> = Vec::new();
        for record in &model.projects {
            if model.parent_of(&record.guid) != parent_guid {
                continue;
            }
            if record.is_solution_folder() {
                folders.push(record);
            } else {
                projects.push(record);
            }
        }
        folders.sort_by_key(|record| record.name.to_lowercase());
        projects.sort_by_key(|record| record.name.to_lowercase());

        let mut nodes = Vec::new();
        for folder in folders {
            nodes.push(self.build_solution_folder(model, solution_path, solution_dir, folder));
        }
        if let Some(guid) = parent_guid {
            nodes.extend(build_solution_items(model, solution_path, solution_dir, guid));
        }
        for project in projects {
            nodes.push(self.build_project(solution_dir, project));
        }
        nodes
    }

    fn build_solution_folder(
        &mut self,
        model: &SolutionModel,
        solution_path: &Path,
        solution_dir: &Path,
        record: &SolutionProject,
    ) -> TreeNode {
        let children = self.build_branch(model, solution_path, solution_dir, Some(&record.guid));
        TreeNode::new(
            NodeIdentity::SolutionFolder {
                solution: solution_path.to_path_buf(),
                guid: record.guid.clone(),
            },
            record.name.clone(),
        )
        .with_children(children)
    }

    fn build_project(&mut self, solution_dir: &Path, record: &SolutionProject) -> TreeNode {
        let descriptor_path =
            solution_dir.join(normalize_separators(&record.relative_path));
        let descriptor_path = descriptor_path
            .canonicalize()
            .unwrap_or(descriptor_path);
        let model = self.parser.parse(&descriptor_path);

        let mut children = vec![build_dependency_container(&descriptor_path, &model)];
        let project_dir = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        children.extend(build_file_entries(&project_dir, &model));

        TreeNode::new(
            NodeIdentity::Project {
                path: descriptor_path,
            },
            record.name.clone(),
        )
        .with_children(children)
    }
}

fn build_solution_items(
    model: &SolutionModel,
    solution_path: &Path,
    solution_dir: &Path,
    folder_guid: &str,
) -> Vec<TreeNode> {
    let Some(items) = model.items.get(folder_guid) else {
        return Vec::new();
    };
    let mut items: Vec<PathBuf> = items
        .iter()
        .map(|relative| solution_dir.join(normalize_separators(relative)))
        .collect();
    items.sort_by_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    items
        .into_iter()
        .map(|path| {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            TreeNode::new(
                NodeIdentity::SolutionItem {
                    solution: solution_path.to_path_buf(),
                    path,
                },
                label,
            )
        })
        .collect()
}

fn build_dependency_container(project_path: &Path, model: &ProjectModel) -> TreeNode {
    let mut categories = Vec::new();
    for category in CategoryKind::ORDERED {
        let leaves: Vec<TreeNode> = model
            .dependencies
            .iter()
            .filter(|dependency| dependency.kind.category() == category)
            .map(|dependency| {
                TreeNode::new(
                    NodeIdentity::Dependency {
                        project: project_path.to_path_buf(),
                        category,
                        name: dependency.name.clone(),
                        version: dependency.version.clone(),
                    },
                    dependency.name.clone(),
                )
            })
            .collect();
        if leaves.is_empty() {
            continue;
        }
        categories.push(
            TreeNode::new(
                NodeIdentity::DependencyCategory {
                    project: project_path.to_path_buf(),
                    category,
                },
                category.label(),
            )
            .with_children(leaves)
            .lazily_loaded(),
        );
    }

    TreeNode::new(
        NodeIdentity::DependencyContainer {
            project: project_path.to_path_buf(),
        },
        DEPENDENCIES_LABEL,
    )
    .with_children(categories)
    .lazily_loaded()
}

/// Folder/file nodes directly under `dir`: folders first, then files, both in
/// path order.
fn entries_under(
    dir: &Path,
    directories: &BTreeSet<PathBuf>,
    files: &[FileEntry],
) -> Vec<TreeNode> {
    let mut nodes = Vec::new();
    for sub_dir in directories.iter().filter(|d| d.parent() == Some(dir)) {
        let children = entries_under(sub_dir, directories, files);
        let label = sub_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| sub_dir.display().to_string());
        nodes.push(
            TreeNode::new(
                NodeIdentity::Folder {
                    path: sub_dir.clone(),
                },
                label,
            )
            .with_children(children),
        );
    }
    for entry in files.iter().filter(|f| f.path.parent() == Some(dir)) {
        nodes.push(file_node(entry));
    }
    nodes
}

fn file_node(entry: &FileEntry) -> TreeNode {
    let label = entry
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.path.display().to_string());
    TreeNode::new(
        NodeIdentity::File {
            path: entry.path.clone(),
        },
        label,
    )
}

fn build_file_entries(project_dir: &Path, model: &ProjectModel) -> Vec<TreeNode> {
    let mut nodes = entries_under(project_dir, &model.directories, &model.files);
    // Items linked from outside the project directory have no folder chain in
    // the model; they hang directly off the project node.
    for entry in model.files.iter().filter(|f| !f.path.starts_with(project_dir)) {
        nodes.push(file_node(entry));
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeKind;
    use std::fs;
    use tempfile::tempdir;

    const SLN: &str = r#"Microsoft Visual Studio Solution File, Format Version 12.00
Project("{2150E333-8FDC-42A3-9474-1A3956D46DE8}") = "tools", "tools", "{AAAA0000-0000-0000-0000-000000000001}"
	ProjectSection(SolutionItems) = preProject
		README.md = README.md
	EndProjectSection
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Zeta", "Zeta\Zeta.csproj", "{BBBB0000-0000-0000-0000-000000000002}"
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App", "App\App.csproj", "{CCCC0000-0000-0000-0000-000000000003}"
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Tool", "Tool\Tool.csproj", "{DDDD0000-0000-0000-0000-000000000004}"
EndProject
Global
	GlobalSection(NestedProjects) = preSolution
		{DDDD0000-0000-0000-0000-000000000004} = {AAAA0000-0000-0000-0000-000000000001}
	EndGlobalSection
EndGlobal
"#;

    const APP_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <PackageReference Include="Serilog" Version="3.1.1" />
    <PackageReference Include="Newtonsoft.Json" Version="13.0.3" />
    <ProjectReference Include="..\Zeta\Zeta.csproj" />
    <Reference Include="System.Web, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a" />
  </ItemGroup>
</Project>"#;

    fn make_workspace() -> (tempfile::TempDir, PathBuf) {
        let workspace = tempdir().unwrap();
        let root = workspace.path();
        fs::write(root.join("App.sln"), SLN).unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();
        for name in ["Zeta", "Tool"] {
            fs::create_dir_all(root.join(name)).unwrap();
            fs::write(
                root.join(name).join(format!("{name}.csproj")),
                "<Project></Project>",
            )
            .unwrap();
        }
        fs::create_dir_all(root.join("App/Views")).unwrap();
        fs::write(root.join("App/App.csproj"), APP_CSPROJ).unwrap();
        fs::write(root.join("App/Program.cs"), "class Program {}").unwrap();
        fs::write(root.join("App/Views/Index.cshtml"), "<html/>").unwrap();
        let sln = root.join("App.sln");
        (workspace, sln)
    }

    #[test]
    fn solution_children_are_folders_then_projects_alphabetical() {
        let (workspace, sln) = make_workspace();
        let mut parser = ProjectModelParser::new(workspace.path());
        let tree = TreeBuilder::new(&mut parser).build(&sln);

        assert_eq!(tree.kind(), NodeKind::Solution);
        assert_eq!(tree.label, "App");
        let labels: Vec<&str> = tree.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["tools", "App", "Zeta"]);

        let tools = &tree.children[0];
        assert_eq!(tools.kind(), NodeKind::SolutionFolder);
        let tool_labels: Vec<&str> = tools.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(tool_labels, vec!["README.md", "Tool"]);
        assert_eq!(tools.children[0].kind(), NodeKind::SolutionItem);
    }

    #[test]
    fn project_gets_container_first_then_folders_then_files() {
        let (workspace, sln) = make_workspace();
        let mut parser = ProjectModelParser::new(workspace.path());
        let tree = TreeBuilder::new(&mut parser).build(&sln);

        let app = &tree.children[1];
        assert_eq!(app.kind(), NodeKind::Project);
        let labels: Vec<&str> = app.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Dependencies", "Views", "Program.cs"]);
        let views = &app.children[1];
        assert_eq!(views.kind(), NodeKind::Folder);
        assert!(views.loaded);
        let view_labels: Vec<&str> = views.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(view_labels, vec!["Index.cshtml"]);
        let container = &app.children[0];
        assert_eq!(container.kind(), NodeKind::DependencyContainer);
    }

    #[test]
    fn container_and_categories_are_lazy_and_ordered() {
        let (workspace, sln) = make_workspace();
        let mut parser = ProjectModelParser::new(workspace.path());
        let tree = TreeBuilder::new(&mut parser).build(&sln);

        let app = &tree.children[1];
        let container = &app.children[0];
        assert!(container.is_virtual());
        assert!(!container.loaded);
        assert!(container.has_children);
        assert!(!container.expanded);

        let categories: Vec<&str> = container
            .children
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(categories, vec!["Packages", "Projects", "Assemblies"]);
        for category in &container.children {
            assert!(!category.loaded);
            assert!(category.has_children);
        }
        let packages: Vec<&str> = container.children[0]
            .children
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(packages, vec!["Newtonsoft.Json", "Serilog"]);
    }

    #[test]
    fn linked_file_outside_the_project_dir_hangs_off_the_project_node() {
        let (workspace, sln) = make_workspace();
        fs::create_dir_all(workspace.path().join("Shared")).unwrap();
        fs::write(workspace.path().join("Shared/Util.cs"), "class Util {}").unwrap();
        fs::write(
            workspace.path().join("App/App.csproj"),
            r#"<Project>
  <ItemGroup>
    <PackageReference Include="Serilog" Version="3.1.1" />
    <Compile Include="..\Shared\Util.cs" />
  </ItemGroup>
</Project>"#,
        )
        .unwrap();

        let mut parser = ProjectModelParser::new(workspace.path());
        let tree = TreeBuilder::new(&mut parser).build(&sln);
        let app = &tree.children[1];
        let labels: Vec<&str> = app.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Dependencies", "Views", "Program.cs", "Util.cs"]
        );
        let util = app.children.last().unwrap();
        assert_eq!(util.kind(), NodeKind::File);
        assert_eq!(
            util.identity.filesystem_path(),
            Some(
                workspace
                    .path()
                    .canonicalize()
                    .unwrap()
                    .join("Shared/Util.cs")
            )
            .as_deref()
        );
    }

    #[test]
    fn rebuilding_an_unchanged_solution_reproduces_identities() {
        let (workspace, sln) = make_workspace();
        let mut parser = ProjectModelParser::new(workspace.path());
        let first = TreeBuilder::new(&mut parser).build(&sln);
        let second = TreeBuilder::new(&mut parser).build(&sln);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_solution_yields_a_bare_root() {
        let workspace = tempdir().unwrap();
        let mut parser = ProjectModelParser::new(workspace.path());
        let tree = TreeBuilder::new(&mut parser).build(&workspace.path().join("Ghost.sln"));
        assert_eq!(tree.label, "Ghost");
        assert!(tree.children.is_empty());
        assert!(!tree.has_children);
    }
}
