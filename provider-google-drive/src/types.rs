//! Google Drive API v3 response types.

use serde::Deserialize;

/// MIME type Drive assigns to folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

#[derive(Debug, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_list_parsing() {
        let body = r#"{
            "files": [
                {"id": "a", "name": "images", "mimeType": "application/vnd.google-apps.folder"},
                {"id": "b", "name": "metadata.json", "mimeType": "application/json"}
            ],
            "nextPageToken": "tok"
        }"#;
        let parsed: FileListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.files.len(), 2);
        assert!(parsed.files[0].is_folder());
        assert!(!parsed.files[1].is_folder());
        assert_eq!(parsed.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_empty_list_parsing() {
        let parsed: FileListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.files.is_empty());
        assert!(parsed.next_page_token.is_none());
    }
}
