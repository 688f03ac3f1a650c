use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Type GUID that marks a record as a solution folder rather than a project.
/// 標記記錄為方案資料夾（而非真實專案）的類型 GUID。
pub const SOLUTION_FOLDER_TYPE_GUID: &str = "{2150E333-8FDC-42A3-9474-1A3956D46DE8}";

static PROJECT_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^Project\("(\{[0-9A-Fa-f-]+\})"\)\s*=\s*"([^"]*)",\s*"([^"]*)",\s*"(\{[0-9A-Fa-f-]+\})""#,
    )
    .expect("project record pattern")
});

static NESTING_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\{[0-9A-Fa-f-]+\})\s*=\s*(\{[0-9A-Fa-f-]+\})$").expect("nesting record pattern")
});

/// One `Project(...)` record from a solution file. May denote a real project
/// or a solution folder, distinguished by the type GUID.
/// 方案檔中的一筆 `Project(...)` 記錄；依類型 GUID 區分真實專案或方案資料夾。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionProject {
    pub type_guid: String,
    pub name: String,
    pub relative_path: String,
    pub guid: String,
}

impl SolutionProject {
    /// True when this record denotes a solution folder.
    /// 若此記錄為方案資料夾則回傳 true。
    pub fn is_solution_folder(&self) -> bool {
        self.type_guid.eq_ignore_ascii_case(SOLUTION_FOLDER_TYPE_GUID)
    }
}

/// Declarative model of a solution descriptor: records, the nesting table,
/// and solution items per folder.
/// 方案描述檔的宣告式模型：記錄、巢狀表與各資料夾的方案項目。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionModel {
    pub projects: Vec<SolutionProject>,
    /// Child GUID → parent (solution folder) GUID.
    pub nesting: HashMap<String, String>,
    /// Solution folder GUID → relative paths of its solution items.
    pub items: HashMap<String, Vec<String>>,
}

impl SolutionModel {
    /// The parent folder GUID of a record, if nested.
    /// 取得記錄的父資料夾 GUID（若有巢狀）。
    pub fn parent_of(&self, guid: &str) -> Option<&str> {
        self.nesting.get(&normalize_guid(guid)).map(String::as_str)
    }
}

/// Reads a solution descriptor. A missing or unreadable file yields an empty
/// model; unparseable lines are skipped.
/// 讀取方案描述檔；檔案不存在或無法讀取時回傳空模型，無法解析的行會被略過。
pub fn parse_solution(path: &Path) -> SolutionModel {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            log::debug!("solution descriptor unavailable: {}: {err}", path.display());
            return SolutionModel::default();
        }
    };
    parse_solution_text(&text)
}

fn parse_solution_text(text: &str) -> SolutionModel {
    let mut model = SolutionModel::default();
    let mut current_record: Option<String> = None;
    let mut in_solution_items = false;
    let mut in_nested_projects = false;

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if let Some(captures) = PROJECT_RECORD.captures(line) {
            let record = SolutionProject {
                type_guid: normalize_guid(&captures[1]),
                name: captures[2].to_string(),
                relative_path: captures[3].to_string(),
                guid: normalize_guid(&captures[4]),
            };
            current_record = Some(record.guid.clone());
            model.projects.push(record);
            continue;
        }

        if line == "EndProject" {
            current_record = None;
            in_solution_items = false;
            continue;
        }

        if current_record.is_some() && line.starts_with("ProjectSection(SolutionItems)") {
            in_solution_items = true;
            continue;
        }
        if line == "EndProjectSection" {
            in_solution_items = false;
            continue;
        }
        if in_solution_items {
            if let (Some(guid), Some((item, _))) = (&current_record, line.split_once('=')) {
                let item = item.trim();
                if !item.is_empty() {
                    model
                        .items
                        .entry(guid.clone())
                        .or_default()
                        .push(item.to_string());
                }
            }
            continue;
        }

        if line.starts_with("GlobalSection(NestedProjects)") {
            in_nested_projects = true;
            continue;
        }
        if line == "EndGlobalSection" {
            in_nested_projects = false;
            continue;
        }
        if in_nested_projects {
            if let Some(captures) = NESTING_RECORD.captures(line) {
                model
                    .nesting
                    .insert(normalize_guid(&captures[1]), normalize_guid(&captures[2]));
            }
        }
    }

    model
}

fn normalize_guid(guid: &str) -> String {
    guid.to_ascii_uppercase()
}
