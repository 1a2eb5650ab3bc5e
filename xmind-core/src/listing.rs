use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// Modification time as reported by the drive: epoch milliseconds for most
/// accounts, free text for some older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFileEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub modified_time: Option<Timestamp>,
}

impl RemoteFileEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFolderRequest {
    pub folder_id: String,
    pub limit: u32,
    pub order: String,
    pub sort_by: String,
    pub team_or_my_works_id: String,
    #[serde(rename = "type")]
    pub item_type: String,
}

impl ListFolderRequest {
    pub fn new(folder_id: impl Into<String>) -> Self {
        let folder_id = folder_id.into();
        Self {
            team_or_my_works_id: folder_id.clone(),
            folder_id,
            limit: 100,
            order: "desc".to_string(),
            sort_by: "modifiedTime".to_string(),
            item_type: "file".to_string(),
        }
    }

    pub fn with_team(mut self, team_or_my_works_id: impl Into<String>) -> Self {
        self.team_or_my_works_id = team_or_my_works_id.into();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }
}

/// Flattens the list-folder response into entries.
///
/// The drive has answered with a bare array, `{items}`, `{data: [...]}`,
/// `{data: {files}}` and `{data: {items}}` depending on account and API
/// revision. Anything else is treated as an empty folder.
pub fn normalize_listing(value: &Value) -> Vec<RemoteFileEntry> {
    raw_items(value)
        .iter()
        .enumerate()
        .filter_map(|(index, item)| parse_entry(index, item))
        .collect()
}

fn raw_items(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("items") {
                return items.as_slice();
            }
            match map.get("data") {
                Some(Value::Array(items)) => items.as_slice(),
                Some(Value::Object(data)) => ["files", "items"]
                    .iter()
                    .find_map(|key| match data.get(*key) {
                        Some(Value::Array(items)) => Some(items.as_slice()),
                        _ => None,
                    })
                    .unwrap_or(&[]),
                _ => &[],
            }
        }
        _ => &[],
    }
}

fn parse_entry(index: usize, item: &Value) -> Option<RemoteFileEntry> {
    let object = item.as_object()?;
    let id = match object.get("id")? {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("untitled_{index}"));
    let kind = match object.get("type").and_then(Value::as_str) {
        Some("folder") => EntryKind::Folder,
        _ => EntryKind::File,
    };
    let modified_time = match object.get("modifiedTime") {
        Some(Value::Number(ms)) => ms.as_i64().map(Timestamp::Millis),
        Some(Value::String(text)) if !text.is_empty() => Some(Timestamp::Text(text.clone())),
        _ => None,
    };

    Some(RemoteFileEntry {
        id,
        name,
        kind,
        modified_time,
    })
}
