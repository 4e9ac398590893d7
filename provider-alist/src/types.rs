//! AList API request and response types
//!
//! Data structures for the `fs/list` endpoint. Every response is wrapped in
//! an envelope carrying an application-level `code`; the HTTP status alone
//! does not tell success from failure.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/fs/list`
#[derive(Debug, Clone, Serialize)]
pub struct ListRequest<'a> {
    pub path: &'a str,
    pub password: &'a str,
    pub page: u32,
    /// Zero asks for every entry in one page
    pub per_page: u32,
    pub refresh: bool,
}

impl<'a> ListRequest<'a> {
    pub fn new(path: &'a str, refresh: bool) -> Self {
        Self {
            path,
            password: "",
            page: 1,
            per_page: 0,
            refresh,
        }
    }
}

/// Response envelope shared by every AList endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Payload of a successful `fs/list` call
#[derive(Debug, Deserialize)]
pub struct ListData {
    /// `null` for an empty directory
    #[serde(default)]
    pub content: Option<Vec<ObjectInfo>>,
    #[serde(default)]
    pub total: u64,
}

/// One listed object
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub is_dir: bool,
    /// RFC 3339 timestamp, possibly with sub-microsecond precision
    #[serde(default)]
    pub modified: Option<String>,
    /// Empty when the object needs no signature
    #[serde(default)]
    pub sign: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_list_response() {
        let json = r#"{
            "code": 200,
            "message": "success",
            "data": {
                "content": [
                    {
                        "name": "Movie.mkv",
                        "size": 1073741824,
                        "is_dir": false,
                        "modified": "2024-05-17T16:05:36.4651534+08:00",
                        "sign": "abc",
                        "thumb": "",
                        "type": 2
                    },
                    {
                        "name": "Extras",
                        "size": 0,
                        "is_dir": true,
                        "modified": "2024-05-17T16:05:36+08:00",
                        "sign": ""
                    }
                ],
                "total": 2,
                "readme": "",
                "write": false,
                "provider": "Local"
            }
        }"#;

        let envelope: Envelope<ListData> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.code, 200);
        let content = envelope.data.unwrap().content.unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0].name, "Movie.mkv");
        assert!(content[1].is_dir);
    }

    #[test]
    fn test_deserialize_empty_directory() {
        let json = r#"{"code":200,"message":"success","data":{"content":null,"total":0}}"#;
        let envelope: Envelope<ListData> = serde_json::from_str(json).unwrap();
        assert!(envelope.data.unwrap().content.is_none());
    }

    #[test]
    fn test_serialize_list_request() {
        let body = serde_json::to_value(ListRequest::new("/movies", true)).unwrap();
        assert_eq!(body["path"], "/movies");
        assert_eq!(body["per_page"], 0);
        assert_eq!(body["refresh"], true);
        assert_eq!(body["password"], "");
    }
}
