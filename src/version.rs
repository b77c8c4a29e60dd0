//! 版本链管理模块
//!
//! 为每个逻辑文件路径维护只追加的快照序列，存放在版本根目录下
//! 镜像的目录树中。版本号从 1 开始，以十进制文件名命名；
//! 快照写入后不可变，本组件不删除任何条目。

use crate::error::{RegistryError, Result};
use crate::store::ByteStore;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info};

/// 版本链管理器
pub struct VersionStore {
    /// 版本存储根目录
    version_root: PathBuf,
    /// 字节存储
    store: Arc<dyn ByteStore>,
    /// 路径级写锁，序列化版本号分配
    path_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VersionStore {
    pub fn new(version_root: PathBuf, store: Arc<dyn ByteStore>) -> Self {
        Self {
            version_root,
            store,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 初始化版本根目录（缺失时自动创建，不是错误）
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.version_root).await?;
        info!("版本链管理器已初始化: {:?}", self.version_root);
        Ok(())
    }

    /// 版本根目录
    pub fn version_root(&self) -> &Path {
        &self.version_root
    }

    /// 追加快照，返回分配的版本号
    ///
    /// 同一路径的并发写入被序列化，两个写入者不会获得相同版本号。
    pub async fn store_version(&self, file_path: &str, data: &[u8]) -> Result<u64> {
        let guard = self.path_lock(file_path);
        let _held = guard.lock().await;

        let version = self.next_version(file_path).await?;
        let write_path = self.version_path(file_path, version);
        self.store.write(&write_path, data).await?;

        debug!("已追加版本快照: {} -> {}", file_path, version);
        Ok(version)
    }

    /// 下一个版本号
    ///
    /// 链不存在时返回 1；否则取现有最大版本号加一。
    /// 不统计目录条目数，乱序删除历史快照后仍保持正确。
    pub async fn next_version(&self, file_path: &str) -> Result<u64> {
        Ok(self.max_version(file_path).await?.map_or(1, |max| max + 1))
    }

    /// 当前（最新）快照路径
    ///
    /// 与 `next_version` 使用同一推导规则。
    pub async fn current_version_path(&self, file_path: &str) -> Result<PathBuf> {
        match self.max_version(file_path).await? {
            Some(version) => Ok(self.version_path(file_path, version)),
            None => Err(RegistryError::NotFound(format!(
                "版本链不存在: {}",
                file_path
            ))),
        }
    }

    /// 读取当前快照
    pub async fn load_version(&self, file_path: &str) -> Result<Vec<u8>> {
        let read_path = self.current_version_path(file_path).await?;
        self.store.read(&read_path).await
    }

    /// 该精确路径是否尚无快照
    pub async fn is_first_version(&self, path: &Path) -> bool {
        !self.store.exists(path).await
    }

    /// 指定版本号的快照路径
    pub fn version_path(&self, file_path: &str, version: u64) -> PathBuf {
        self.chain_dir(file_path).join(version.to_string())
    }

    /// 文件路径对应的链目录
    fn chain_dir(&self, file_path: &str) -> PathBuf {
        self.version_root.join(file_path.trim_start_matches('/'))
    }

    /// 扫描链目录，取最大版本号
    async fn max_version(&self, file_path: &str) -> Result<Option<u64>> {
        let dir = self.chain_dir(file_path);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RegistryError::Io(e)),
        };

        let mut max = None;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(version) = name.parse::<u64>() {
                    if max.is_none_or(|m| version > m) {
                        max = Some(version);
                    }
                }
            }
        }

        Ok(max)
    }

    fn path_lock(&self, file_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.path_locks.lock().unwrap();
        locks
            .entry(file_path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DiskStore;
    use tempfile::TempDir;

    fn create_test_store() -> (Arc<VersionStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = VersionStore::new(
            temp_dir.path().join("versions"),
            Arc::new(DiskStore),
        );
        (Arc::new(store), temp_dir)
    }

    #[tokio::test]
    async fn test_next_version_starts_at_one() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        assert_eq!(store.next_version("a.txt").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_version_monotonicity() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        assert_eq!(store.store_version("a.txt", b"v1").await.unwrap(), 1);
        assert_eq!(store.store_version("a.txt", b"v2").await.unwrap(), 2);
        assert_eq!(store.store_version("a.txt", b"v3").await.unwrap(), 3);
        assert_eq!(store.next_version("a.txt").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_load_version_returns_latest() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        store.store_version("doc/a.txt", b"v1").await.unwrap();
        store.store_version("doc/a.txt", b"v2").await.unwrap();

        let data = store.load_version("doc/a.txt").await.unwrap();
        assert_eq!(data, b"v2");
    }

    #[tokio::test]
    async fn test_load_missing_chain_is_not_found() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        let err = store.load_version("nope.txt").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_max_based_numbering_survives_deletion() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        store.store_version("a.txt", b"v1").await.unwrap();
        store.store_version("a.txt", b"v2").await.unwrap();
        store.store_version("a.txt", b"v3").await.unwrap();

        // 乱序删除最早的快照后，版本号不得回退复用
        tokio::fs::remove_file(store.version_path("a.txt", 1))
            .await
            .unwrap();
        assert_eq!(store.next_version("a.txt").await.unwrap(), 4);
        assert_eq!(
            store.current_version_path("a.txt").await.unwrap(),
            store.version_path("a.txt", 3)
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_get_distinct_numbers() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store_version("shared.txt", &[i]).await.unwrap()
            }));
        }

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_leading_slash_is_mirrored() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        store.store_version("/etc/a.conf", b"v1").await.unwrap();
        let path = store.current_version_path("/etc/a.conf").await.unwrap();
        assert_eq!(path, store.version_root().join("etc/a.conf").join("1"));
    }

    #[tokio::test]
    async fn test_is_first_version() {
        let (store, _temp) = create_test_store();
        store.init().await.unwrap();

        let path = store.version_path("a.txt", 1);
        assert!(store.is_first_version(&path).await);

        store.store_version("a.txt", b"v1").await.unwrap();
        assert!(!store.is_first_version(&path).await);
    }
}
