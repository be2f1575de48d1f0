//! 文档存储 - 基础设施层
//!
//! 以 jobId 为键保存不透明的 JSON 文档，只暴露 get / put / delete / keys 能力

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

/// 键值文档存储
///
/// 职责：
/// - 单个文档的读写是原子的，读方不会看到写了一半的文档
/// - 不认识作业结构，不处理业务逻辑
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError>;
    async fn put(&self, key: &str, document: &JsonValue) -> Result<(), StoreError>;
    /// 返回文档是否存在过
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// 内存存储
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, JsonValue>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, document: &JsonValue) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.documents.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.documents.read().await.keys().cloned().collect())
    }
}

/// 文件存储：每个文档一个 `<key>.json`
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// 创建文件存储（目录不存在时自动创建）
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StoreError::WriteFailed {
                key: root.display().to_string(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.json", encode_key(key)?)))
    }
}

/// 键编码为文件名（可逆的百分号编码，`/` 等字符不会出现在文件名里）
fn encode_key(key: &str) -> Result<String, StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(urlencoding::encode(key).into_owned())
}

/// 文件名还原为键；不是本存储写出的文件返回 None
fn decode_key(stem: &str) -> Option<String> {
    let key = urlencoding::decode(stem).ok()?.into_owned();
    (encode_key(&key).ok()? == stem).then_some(key)
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::ReadFailed {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let document = serde_json::from_str(&content).map_err(|source| StoreError::Corrupted {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(document))
    }

    async fn put(&self, key: &str, document: &JsonValue) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let content =
            serde_json::to_vec_pretty(document).map_err(|source| StoreError::Corrupted {
                key: key.to_string(),
                source,
            })?;

        // 先写临时文件再 rename，保证读方只看到完整文档
        let write_failed = |source| StoreError::WriteFailed {
            key: key.to_string(),
            source,
        };
        fs::write(&tmp_path, content).await.map_err(write_failed)?;
        fs::rename(&tmp_path, &path).await.map_err(write_failed)?;

        debug!("文档已写入: {}", path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::DeleteFailed {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let read_failed = |source| StoreError::ReadFailed {
            key: self.root.display().to_string(),
            source,
        };
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await.map_err(read_failed)?;
        while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(key) = path.file_stem().and_then(|s| s.to_str()).and_then(decode_key) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_basic_ops() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.get("job-1").await.unwrap(), None);

        store.put("job-1", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("job-1").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.keys().await.unwrap(), vec!["job-1".to_string()]);

        assert!(store.delete("job-1").await.unwrap());
        assert!(!store.delete("job-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path().join("jobs")).await.unwrap();

        store.put("job-42", &json!({"pages": [1, 2]})).await.unwrap();
        assert_eq!(
            store.get("job-42").await.unwrap(),
            Some(json!({"pages": [1, 2]}))
        );
        assert_eq!(store.keys().await.unwrap(), vec!["job-42".to_string()]);
        assert!(!store.root().join("job-42.json.tmp").exists());

        assert!(store.delete("job-42").await.unwrap());
        assert_eq!(store.get("job-42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }

    #[test]
    fn test_encode_key_is_reversible() {
        assert_eq!(encode_key("job-1700000000000").unwrap(), "job-1700000000000");
        assert_eq!(encode_key("../etc/passwd").unwrap(), "..%2Fetc%2Fpasswd");
        for key in ["job/1", "job 1", "job_1", "作业%1"] {
            assert_eq!(decode_key(&encode_key(key).unwrap()).as_deref(), Some(key));
        }
        assert!(matches!(encode_key(""), Err(StoreError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn test_fs_store_keeps_similar_keys_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).await.unwrap();

        store.put("job/1", &json!({"who": "slash"})).await.unwrap();
        store.put("job 1", &json!({"who": "space"})).await.unwrap();
        store.put("job_1", &json!({"who": "underscore"})).await.unwrap();

        assert_eq!(store.get("job/1").await.unwrap(), Some(json!({"who": "slash"})));
        assert_eq!(store.get("job 1").await.unwrap(), Some(json!({"who": "space"})));
        assert_eq!(
            store.get("job_1").await.unwrap(),
            Some(json!({"who": "underscore"}))
        );
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["job 1".to_string(), "job/1".to_string(), "job_1".to_string()]
        );

        assert!(store.delete("job/1").await.unwrap());
        assert_eq!(store.get("job_1").await.unwrap(), Some(json!({"who": "underscore"})));
    }
}
