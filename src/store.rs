//! 字节存储抽象
//!
//! 注册表与版本链通过窄接口读写磁盘，便于替换实现与注入测试替身。

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 字节存储能力接口
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// 读取文件全部内容，不存在时返回 NotFound
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// 写入文件，自动创建父目录
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// 删除文件，返回是否实际删除（不存在视为成功）
    async fn remove(&self, path: &Path) -> Result<bool>;

    /// 检查文件是否存在
    async fn exists(&self, path: &Path) -> bool;
}

/// 磁盘字节存储
#[derive(Debug, Default, Clone)]
pub struct DiskStore;

#[async_trait]
impl ByteStore for DiskStore {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RegistryError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!("已写入: {:?}, {} 字节", path, data.len());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
