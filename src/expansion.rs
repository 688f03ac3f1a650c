use std::collections::HashSet;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::TreeNode;

/// Well-known file name of the persisted expansion set, one per workspace.
/// 持久化展開集合的固定檔名，每個工作區一份。
pub const EXPANSION_FILE_NAME: &str = "expanded-nodes.json";

/// Walks the whole tree, collapsed branches included, and returns the encoded
/// identity of every expanded node in document order. A deeper expanded
/// descendant of a collapsed ancestor must not be skipped.
/// 走訪整棵樹（含收合分支），依文件順序回傳所有展開節點的識別碼；
/// 收合祖先底下較深的展開節點不可被略過。
pub fn collect_expanded(tree: &TreeNode) -> Vec<String> {
    fn walk(node: &TreeNode, out: &mut Vec<String>) {
        if node.expanded {
            out.push(node.identity.encode());
        }
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    walk(tree, &mut out);
    out
}

/// Re-applies a restored expansion set: every node whose identity appears in
/// the list is marked expanded. Identities not found in the (possibly still
/// skeletal) tree are left alone so a later, deeper rebuild can pick them up;
/// the persisted list is never pruned on absence.
/// 套用還原的展開集合：識別碼在清單中的節點會被標記展開。樹中（可能尚未
/// 完整載入）找不到的識別碼不做任何處理，待後續重建時再套用；
/// 持久化清單絕不因找不到節點而被修剪。
pub fn apply_restored(tree: &mut TreeNode, identities: &[String]) {
    let lookup: HashSet<&str> = identities.iter().map(String::as_str).collect();
    fn walk(node: &mut TreeNode, lookup: &HashSet<&str>) {
        if lookup.contains(node.identity.encode().as_str()) {
            node.expanded = true;
        }
        for child in &mut node.children {
            walk(child, lookup);
        }
    }
    walk(tree, &lookup);
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ExpansionFile {
    #[serde(default)]
    expanded: Vec<String>,
}

/// Errors emitted while persisting the expansion set.
/// 持久化展開集合時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ExpansionStoreError {
    #[error("expansion store IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid expansion payload: {0}")]
    Invalid(String),
}

/// Persists the expanded-node identities for one workspace as JSON, written
/// atomically. Reads degrade to an empty set; identities are opaque strings
/// and no schema versioning is performed.
/// 以 JSON 原子寫入的方式保存單一工作區的展開節點識別碼。讀取失敗時
/// 退化為空集合；識別碼為不透明字串，不做格式版本控管。
#[derive(Debug)]
pub struct ExpansionStore {
    path: PathBuf,
}

impl ExpansionStore {
    /// Binds the store to an explicit file path.
    /// 綁定至指定檔案路徑。
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Binds the store to the well-known file under a workspace state dir.
    /// 綁定至工作區狀態目錄下的固定檔案。
    pub fn for_workspace(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(EXPANSION_FILE_NAME))
    }

    /// The backing file path.
    /// 實際儲存檔案的路徑。
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted set; a missing or unreadable file is an empty set.
    /// 載入持久化集合；檔案不存在或無法讀取時回傳空集合。
    pub fn load(&self) -> Vec<String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                log::warn!("unreadable expansion store {}: {err}", self.path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str::<ExpansionFile>(&contents) {
            Ok(file) => file.expanded,
            Err(err) => {
                log::warn!("invalid expansion store {}: {err}", self.path.display());
                Vec::new()
            }
        }
    }

    /// Replaces the persisted set with the given identities.
    /// 以指定識別碼清單覆寫持久化集合。
    pub fn save(&self, identities: &[String]) -> Result<(), ExpansionStoreError> {
        let payload = ExpansionFile {
            expanded: identities.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&payload)
            .map_err(|err| ExpansionStoreError::Invalid(err.to_string()))?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
