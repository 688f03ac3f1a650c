use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use walkdir::WalkDir;

use crate::identity::CategoryKind;

/// Build-item classification for a file shown under a project.
/// 專案底下檔案的建置項目分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Compile,
    Content,
}

/// A classified file entry of the project model.
/// 專案模型中的已分類檔案項目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub item_type: ItemType,
}

/// The reference element kind a dependency was declared with.
/// 相依項在描述檔中宣告所用的參考元素類型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Package,
    Project,
    Assembly,
    Framework,
}

impl ReferenceKind {
    /// The category bucket this reference kind is grouped under.
    /// 此參考類型所屬的分類群組。
    pub fn category(&self) -> CategoryKind {
        match self {
            ReferenceKind::Package => CategoryKind::Packages,
            ReferenceKind::Project => CategoryKind::Projects,
            ReferenceKind::Assembly => CategoryKind::Assemblies,
            ReferenceKind::Framework => CategoryKind::Frameworks,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ReferenceKind::Package => 0,
            ReferenceKind::Project => 1,
            ReferenceKind::Assembly => 2,
            ReferenceKind::Framework => 3,
        }
    }
}

/// A single declared dependency of a project.
/// 專案宣告的單一相依項。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub kind: ReferenceKind,
    pub version: Option<String>,
}

/// Declarative model extracted from one project descriptor.
/// 自單一專案描述檔萃取出的宣告式模型。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectModel {
    pub files: Vec<FileEntry>,
    pub directories: BTreeSet<PathBuf>,
    pub dependencies: Vec<Dependency>,
}

/// Memoization cache for parsed project models, keyed by path and
/// modification time. Owned by a parser instance; never shared globally.
/// 專案模型的記憶快取，以路徑與修改時間為鍵；由單一解析器持有，不共用全域狀態。
#[derive(Debug, Default)]
pub struct ParseCache {
    entries: HashMap<PathBuf, CachedModel>,
}

#[derive(Debug)]
struct CachedModel {
    modified: SystemTime,
    model: ProjectModel,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every memoized entry. Must run whenever underlying files are
    /// known to have changed, or stale dependency lists get served.
    /// 清除所有快取項目；檔案確定變更時必須呼叫，否則會回傳過期的相依清單。
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the memoized model when the recorded mtime still matches.
    /// 若記錄的修改時間仍相符則回傳快取模型。
    pub fn lookup(&self, path: &Path, modified: SystemTime) -> Option<&ProjectModel> {
        self.entries
            .get(path)
            .filter(|entry| entry.modified == modified)
            .map(|entry| &entry.model)
    }

    /// Records a parse result for the given path and mtime.
    /// 記錄指定路徑與修改時間的解析結果。
    pub fn insert(&mut self, path: PathBuf, modified: SystemTime, model: ProjectModel) {
        self.entries.insert(path, CachedModel { modified, model });
    }
}

/// Reads project descriptors into [`ProjectModel`]s. Confined to one
/// workspace root; every failure path degrades to an empty model so that one
/// bad project never blocks the rest of the tree.
/// 將專案描述檔讀為 [`ProjectModel`]。侷限於單一工作區根目錄；
/// 任何失敗都退化為空模型，單一壞專案不會阻斷整棵樹。
#[derive(Debug)]
pub struct ProjectModelParser {
    workspace_root: PathBuf,
    cache: ParseCache,
}

impl ProjectModelParser {
    /// Creates a parser rooted at the workspace directory with its own cache.
    /// 建立以工作區為根目錄、持有自身快取的解析器。
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self::with_cache(workspace_root, ParseCache::new())
    }

    /// Creates a parser with an injected cache (shared or test-controlled).
    /// 以外部注入的快取建立解析器（供共用或測試控制）。
    pub fn with_cache(workspace_root: impl AsRef<Path>, cache: ParseCache) -> Self {
        let workspace_root = workspace_root.as_ref();
        let workspace_root = workspace_root
            .canonicalize()
            .unwrap_or_else(|_| workspace_root.to_path_buf());
        Self {
            workspace_root,
            cache,
        }
    }

    /// The workspace root all parsed paths must resolve under.
    /// 所有解析路徑必須落在其下的工作區根目錄。
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Mutable access to the memoization cache.
    /// 取得記憶快取的可變借用。
    pub fn cache_mut(&mut self) -> &mut ParseCache {
        &mut self.cache
    }

    /// Drops all memoized parse results.
    /// 清除所有快取的解析結果。
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Parses one project descriptor. Nonexistent paths, paths outside the
    /// workspace root, and malformed markup all yield an empty model.
    /// 解析單一專案描述檔。路徑不存在、超出工作區或標記格式錯誤時回傳空模型。
    pub fn parse(&mut self, path: &Path) -> ProjectModel {
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(err) => {
                log::debug!("project descriptor unavailable: {}: {err}", path.display());
                return ProjectModel::default();
            }
        };
        if !canonical.starts_with(&self.workspace_root) {
            log::warn!(
                "project descriptor outside workspace root, ignored: {}",
                canonical.display()
            );
            return ProjectModel::default();
        }

        let modified = fs::metadata(&canonical)
            .and_then(|metadata| metadata.modified())
            .ok();
        if let Some(modified) = modified {
            if let Some(model) = self.cache.lookup(&canonical, modified) {
                return model.clone();
            }
        }

        let model = parse_descriptor(&canonical);
        if let Some(modified) = modified {
            self.cache.insert(canonical, modified, model.clone());
        }
        model
    }
}

fn parse_descriptor(path: &Path) -> ProjectModel {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            log::debug!("failed to read {}: {err}", path.display());
            return ProjectModel::default();
        }
    };

    let descriptor = match read_descriptor_xml(&text) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            log::warn!("malformed project descriptor {}: {err}", path.display());
            return ProjectModel::default();
        }
    };

    let project_dir = match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => return ProjectModel::default(),
    };

    let mut classified: BTreeMap<PathBuf, ItemType> = BTreeMap::new();
    for (include, item_type) in &descriptor.explicit_items {
        let resolved = resolve_lexically(&project_dir.join(normalize_separators(include)));
        classified.insert(resolved, *item_type);
    }
    scan_project_dir(&project_dir, &mut classified);

    let mut directories = BTreeSet::new();
    for file_path in classified.keys() {
        let mut ancestor = file_path.parent();
        while let Some(dir) = ancestor {
            if dir == project_dir || !dir.starts_with(&project_dir) {
                break;
            }
            directories.insert(dir.to_path_buf());
            ancestor = dir.parent();
        }
    }

    let files = classified
        .into_iter()
        .map(|(path, item_type)| FileEntry { path, item_type })
        .collect();

    let mut dependencies = descriptor.dependencies;
    dependencies.sort_by(|a, b| {
        a.kind
            .rank()
            .cmp(&b.kind.rank())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    // A descriptor can repeat the exact same reference declaration; one node
    // identity must map to one leaf.
    dependencies.dedup();

    ProjectModel {
        files,
        directories,
        dependencies,
    }
}

#[derive(Debug, Default)]
struct DescriptorData {
    dependencies: Vec<Dependency>,
    explicit_items: Vec<(String, ItemType)>,
}

fn read_descriptor_xml(text: &str) -> Result<DescriptorData, quick_xml::Error> {
    let mut reader = Reader::from_str(text);

    let mut data = DescriptorData::default();
    // Index into `dependencies` while inside a <PackageReference> block, so a
    // nested <Version> element can be attached to it.
    let mut open_package: Option<usize> = None;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(element) => {
                match element.name().as_ref() {
                    b"PackageReference" => {
                        if let Some(dependency) = package_from_element(&element)? {
                            data.dependencies.push(dependency);
                            open_package = Some(data.dependencies.len() - 1);
                        }
                    }
                    b"Version" => {
                        let version = reader.read_text(element.name())?.trim().to_string();
                        if let Some(index) = open_package {
                            if !version.is_empty() {
                                data.dependencies[index].version = Some(version);
                            }
                        }
                    }
                    other => handle_simple_element(&element, other, &mut data)?,
                }
            }
            Event::Empty(element) => {
                let name = element.name();
                match name.as_ref() {
                    b"PackageReference" => {
                        if let Some(dependency) = package_from_element(&element)? {
                            data.dependencies.push(dependency);
                        }
                    }
                    other => handle_simple_element(&element, other, &mut data)?,
                }
            }
            Event::End(element) => {
                if element.name().as_ref() == b"PackageReference" {
                    open_package = None;
                }
            }
            _ => {}
        }
    }

    Ok(data)
}

fn handle_simple_element(
    element: &BytesStart<'_>,
    name: &[u8],
    data: &mut DescriptorData,
) -> Result<(), quick_xml::Error> {
    match name {
        b"ProjectReference" => {
            if let Some(include) = attribute(element, b"Include")? {
                data.dependencies.push(Dependency {
                    name: project_reference_name(&include),
                    kind: ReferenceKind::Project,
                    version: None,
                });
            }
        }
        b"FrameworkReference" => {
            if let Some(include) = attribute(element, b"Include")? {
                data.dependencies.push(Dependency {
                    name: include,
                    kind: ReferenceKind::Framework,
                    version: None,
                });
            }
        }
        b"Reference" => {
            if let Some(include) = attribute(element, b"Include")? {
                let (name, version) = split_assembly_identity(&include);
                data.dependencies.push(Dependency {
                    name,
                    kind: ReferenceKind::Assembly,
                    version,
                });
            }
        }
        b"Compile" => {
            if let Some(include) = attribute(element, b"Include")? {
                data.explicit_items.push((include, ItemType::Compile));
            }
        }
        b"Content" | b"None" => {
            if let Some(include) = attribute(element, b"Include")? {
                data.explicit_items.push((include, ItemType::Content));
            }
        }
        _ => {}
    }
    Ok(())
}

fn package_from_element(
    element: &BytesStart<'_>,
) -> Result<Option<Dependency>, quick_xml::Error> {
    let Some(include) = attribute(element, b"Include")? else {
        return Ok(None);
    };
    let version = attribute(element, b"Version")?;
    Ok(Some(Dependency {
        name: include,
        kind: ReferenceKind::Package,
        version,
    }))
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    match element.try_get_attribute(key)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Extracts the short name and version from an assembly identity string such
/// as `System.Web, Version=4.0.0.0, Culture=neutral, PublicKeyToken=...`.
fn split_assembly_identity(include: &str) -> (String, Option<String>) {
    let mut parts = include.split(',');
    let name = parts.next().unwrap_or(include).trim().to_string();
    let version = parts
        .filter_map(|part| part.trim().strip_prefix("Version="))
        .map(|value| value.trim().to_string())
        .next();
    (name, version)
}

fn project_reference_name(include: &str) -> String {
    let normalized = normalize_separators(include);
    Path::new(&normalized)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| normalized.clone())
}

/// Converts Windows-style `\` separators from descriptor files.
pub(crate) fn normalize_separators(raw: &str) -> String {
    raw.replace('\\', "/")
}

/// Resolves `.` and `..` components without touching the filesystem, so a
/// linked item like `..\Shared\Util.cs` yields its real sibling-tree path.
fn resolve_lexically(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push(component.as_os_str());
                }
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

fn scan_project_dir(project_dir: &Path, classified: &mut BTreeMap<PathBuf, ItemType>) {
    let walker = WalkDir::new(project_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));
    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(item_type) = classify(entry.path()) else {
            continue;
        };
        classified
            .entry(entry.path().to_path_buf())
            .or_insert(item_type);
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == "bin" || name == "obj" || name.starts_with('.')
}

fn classify(path: &Path) -> Option<ItemType> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "cs" | "vb" | "fs" => Some(ItemType::Compile),
        "json" | "xml" | "xaml" | "config" | "resx" | "props" | "targets" | "txt" | "md"
        | "html" | "htm" | "css" | "js" | "ts" | "cshtml" | "razor" | "yml" | "yaml" => {
            Some(ItemType::Content)
        }
        _ => None,
    }
}
