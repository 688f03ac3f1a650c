use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

const PREFIX_SOLUTION: &str = "sln";
const PREFIX_PROJECT: &str = "proj";
const PREFIX_FOLDER: &str = "fld";
const PREFIX_FILE: &str = "file";
const PREFIX_SOLUTION_FOLDER: &str = "slnfld";
const PREFIX_SOLUTION_ITEM: &str = "slnitem";
const PREFIX_DEPENDENCY_CONTAINER: &str = "deps";
const PREFIX_DEPENDENCY_CATEGORY: &str = "depcat";
const PREFIX_DEPENDENCY: &str = "dep";

const SEGMENT_DELIMITER: char = '|';
const B64_PREFIX: &str = "b64:";

/// Grouping bucket under a project's dependency container.
/// 專案相依容器底下的分類群組。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    Packages,
    Projects,
    Assemblies,
    Frameworks,
}

impl CategoryKind {
    /// Fixed display order of the categories.
    /// 分類的固定顯示順序。
    pub const ORDERED: [CategoryKind; 4] = [
        CategoryKind::Packages,
        CategoryKind::Projects,
        CategoryKind::Assemblies,
        CategoryKind::Frameworks,
    ];

    /// Human-readable label shown in the tree.
    /// 顯示於樹狀檢視的名稱。
    pub fn label(&self) -> &'static str {
        match self {
            CategoryKind::Packages => "Packages",
            CategoryKind::Projects => "Projects",
            CategoryKind::Assemblies => "Assemblies",
            CategoryKind::Frameworks => "Frameworks",
        }
    }

    fn token(&self) -> &'static str {
        match self {
            CategoryKind::Packages => "packages",
            CategoryKind::Projects => "projects",
            CategoryKind::Assemblies => "assemblies",
            CategoryKind::Frameworks => "frameworks",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "packages" => Some(CategoryKind::Packages),
            "projects" => Some(CategoryKind::Projects),
            "assemblies" => Some(CategoryKind::Assemblies),
            "frameworks" => Some(CategoryKind::Frameworks),
            _ => None,
        }
    }
}

/// The kind of a tree node, derived from its identity.
/// 樹狀節點的類型，由識別碼推導而得。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Solution,
    Project,
    Folder,
    File,
    SolutionFolder,
    SolutionItem,
    DependencyContainer,
    DependencyCategory(CategoryKind),
    Dependency,
}

/// Globally unique, stable identity for a tree node. Carries the key material
/// per kind; serialized to an opaque string only at the UI/persistence
/// boundary via [`NodeIdentity::encode`].
/// 節點的全域唯一且穩定的識別碼；依類型攜帶鍵值資料，僅在 UI
/// 與持久化邊界透過 [`NodeIdentity::encode`] 轉為不透明字串。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentity {
    Solution {
        path: PathBuf,
    },
    Project {
        path: PathBuf,
    },
    Folder {
        path: PathBuf,
    },
    File {
        path: PathBuf,
    },
    SolutionFolder {
        solution: PathBuf,
        guid: String,
    },
    SolutionItem {
        solution: PathBuf,
        path: PathBuf,
    },
    DependencyContainer {
        project: PathBuf,
    },
    DependencyCategory {
        project: PathBuf,
        category: CategoryKind,
    },
    Dependency {
        project: PathBuf,
        category: CategoryKind,
        name: String,
        version: Option<String>,
    },
}

/// Errors produced while decoding an identity string.
/// 解碼識別碼字串時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unrecognized node identity kind: {0}")]
    UnrecognizedKind(String),
    #[error("malformed node identity: {0}")]
    Malformed(String),
}

impl NodeIdentity {
    /// Returns the node kind encoded in this identity.
    /// 取得識別碼所代表的節點類型。
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeIdentity::Solution { .. } => NodeKind::Solution,
            NodeIdentity::Project { .. } => NodeKind::Project,
            NodeIdentity::Folder { .. } => NodeKind::Folder,
            NodeIdentity::File { .. } => NodeKind::File,
            NodeIdentity::SolutionFolder { .. } => NodeKind::SolutionFolder,
            NodeIdentity::SolutionItem { .. } => NodeKind::SolutionItem,
            NodeIdentity::DependencyContainer { .. } => NodeKind::DependencyContainer,
            NodeIdentity::DependencyCategory { category, .. } => {
                NodeKind::DependencyCategory(*category)
            }
            NodeIdentity::Dependency { .. } => NodeKind::Dependency,
        }
    }

    /// True for nodes without direct filesystem backing (the dependency
    /// container, categories, and individual dependencies).
    /// 無檔案系統實體的虛擬節點（相依容器、分類與個別相依項）回傳 true。
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            NodeIdentity::DependencyContainer { .. }
                | NodeIdentity::DependencyCategory { .. }
                | NodeIdentity::Dependency { .. }
        )
    }

    /// Returns the backing path for filesystem-backed kinds, `None` otherwise.
    /// 檔案系統節點回傳其路徑，其餘類型回傳 `None`。
    pub fn filesystem_path(&self) -> Option<&Path> {
        match self {
            NodeIdentity::Solution { path }
            | NodeIdentity::Project { path }
            | NodeIdentity::Folder { path }
            | NodeIdentity::File { path } => Some(path),
            _ => None,
        }
    }

    /// Serializes the identity to its opaque string form.
    /// 將識別碼序列化為不透明字串。
    pub fn encode(&self) -> String {
        match self {
            NodeIdentity::Solution { path } => join(PREFIX_SOLUTION, &[encode_path(path)]),
            NodeIdentity::Project { path } => join(PREFIX_PROJECT, &[encode_path(path)]),
            NodeIdentity::Folder { path } => join(PREFIX_FOLDER, &[encode_path(path)]),
            NodeIdentity::File { path } => join(PREFIX_FILE, &[encode_path(path)]),
            NodeIdentity::SolutionFolder { solution, guid } => join(
                PREFIX_SOLUTION_FOLDER,
                &[encode_path(solution), escape_segment(guid)],
            ),
            NodeIdentity::SolutionItem { solution, path } => join(
                PREFIX_SOLUTION_ITEM,
                &[encode_path(solution), encode_path(path)],
            ),
            NodeIdentity::DependencyContainer { project } => {
                join(PREFIX_DEPENDENCY_CONTAINER, &[encode_path(project)])
            }
            NodeIdentity::DependencyCategory { project, category } => join(
                PREFIX_DEPENDENCY_CATEGORY,
                &[encode_path(project), category.token().to_string()],
            ),
            NodeIdentity::Dependency {
                project,
                category,
                name,
                version,
            } => {
                let mut segments = vec![
                    encode_path(project),
                    category.token().to_string(),
                    escape_segment(name),
                ];
                if let Some(version) = version {
                    segments.push(escape_segment(version));
                }
                join(PREFIX_DEPENDENCY, &segments)
            }
        }
    }

    /// Parses an opaque identity string back into its typed form.
    /// 將不透明字串還原為具型別的識別碼。
    pub fn decode(text: &str) -> Result<Self, IdentityError> {
        let (prefix, rest) = text
            .split_once(':')
            .ok_or_else(|| IdentityError::Malformed(text.to_string()))?;
        let segments: Vec<&str> = rest.split(SEGMENT_DELIMITER).collect();
        let malformed = || IdentityError::Malformed(text.to_string());

        match prefix {
            PREFIX_SOLUTION => Ok(NodeIdentity::Solution {
                path: decode_single_path(&segments, &malformed)?,
            }),
            PREFIX_PROJECT => Ok(NodeIdentity::Project {
                path: decode_single_path(&segments, &malformed)?,
            }),
            PREFIX_FOLDER => Ok(NodeIdentity::Folder {
                path: decode_single_path(&segments, &malformed)?,
            }),
            PREFIX_FILE => Ok(NodeIdentity::File {
                path: decode_single_path(&segments, &malformed)?,
            }),
            PREFIX_SOLUTION_FOLDER => {
                if segments.len() != 2 {
                    return Err(malformed());
                }
                Ok(NodeIdentity::SolutionFolder {
                    solution: decode_path(segments[0]).ok_or_else(&malformed)?,
                    guid: unescape_segment(segments[1]),
                })
            }
            PREFIX_SOLUTION_ITEM => {
                if segments.len() != 2 {
                    return Err(malformed());
                }
                Ok(NodeIdentity::SolutionItem {
                    solution: decode_path(segments[0]).ok_or_else(&malformed)?,
                    path: decode_path(segments[1]).ok_or_else(&malformed)?,
                })
            }
            PREFIX_DEPENDENCY_CONTAINER => Ok(NodeIdentity::DependencyContainer {
                project: decode_single_path(&segments, &malformed)?,
            }),
            PREFIX_DEPENDENCY_CATEGORY => {
                if segments.len() != 2 {
                    return Err(malformed());
                }
                Ok(NodeIdentity::DependencyCategory {
                    project: decode_path(segments[0]).ok_or_else(&malformed)?,
                    category: CategoryKind::from_token(segments[1]).ok_or_else(&malformed)?,
                })
            }
            PREFIX_DEPENDENCY => {
                if segments.len() != 3 && segments.len() != 4 {
                    return Err(malformed());
                }
                Ok(NodeIdentity::Dependency {
                    project: decode_path(segments[0]).ok_or_else(&malformed)?,
                    category: CategoryKind::from_token(segments[1]).ok_or_else(&malformed)?,
                    name: unescape_segment(segments[2]),
                    version: segments.get(3).map(|text| unescape_segment(text)),
                })
            }
            other => Err(IdentityError::UnrecognizedKind(other.to_string())),
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn join(prefix: &str, segments: &[String]) -> String {
    format!("{prefix}:{}", segments.join("|"))
}

fn decode_single_path(
    segments: &[&str],
    malformed: impl Fn() -> IdentityError,
) -> Result<PathBuf, IdentityError> {
    if segments.len() != 1 {
        return Err(malformed());
    }
    decode_path(segments[0]).ok_or_else(malformed)
}

/// Escapes the characters that structure an encoded identity (`%`, `|`, `:`)
/// so that arbitrary package names and versions survive the round trip.
fn escape_segment(text: &str) -> String {
    text.replace('%', "%25")
        .replace(SEGMENT_DELIMITER, "%7C")
        .replace(':', "%3A")
}

fn unescape_segment(text: &str) -> String {
    text.replace("%7C", "|").replace("%3A", ":").replace("%25", "%")
}

fn encode_path(path: &Path) -> String {
    match path.to_str() {
        Some(text) => escape_segment(text),
        None => {
            let b64 = BASE64.encode(path_to_bytes(path));
            format!("{B64_PREFIX}{b64}")
        }
    }
}

fn decode_path(text: &str) -> Option<PathBuf> {
    if let Some(rest) = text.strip_prefix(B64_PREFIX) {
        let bytes = BASE64.decode(rest.as_bytes()).ok()?;
        bytes_to_path(bytes)
    } else {
        Some(PathBuf::from(unescape_segment(text)))
    }
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn bytes_to_path(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(windows)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

#[cfg(windows)]
fn bytes_to_path(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;

    if bytes.len() % 2 != 0 {
        return None;
    }
    let wide: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    Some(PathBuf::from(OsString::from_wide(&wide)))
}
