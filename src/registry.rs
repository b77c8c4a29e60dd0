//! 基底注册表模块
//!
//! 去重内容寻址存储的核心：按指纹把基底恰好持久化一次，
//! 组合编解码器（启用压缩时）与版本链管理器（启用版本管理时），
//! 提供批量存储、读取、删除与存在性检查。

use crate::compression::{Codec, Compressor, decode_frame, encode_frame};
use crate::config::{RegistryConfig, RegistryOptions};
use crate::error::{RegistryError, Result};
use crate::fingerprint::{Fingerprint, shard_relative};
use crate::store::{ByteStore, DiskStore};
use crate::version::VersionStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::fs;
use tracing::{debug, info, warn};

/// 批量存储结果
///
/// 各条目独立处理，失败不回滚；借助存在性检查可安全重试。
#[derive(Debug, Default)]
pub struct StoreBasesResult {
    /// 新写入的指纹
    pub stored: Vec<Fingerprint>,
    /// 因已存在而跳过的指纹
    pub deduplicated: Vec<Fingerprint>,
    /// 失败的指纹及原因
    pub failed: Vec<(Fingerprint, RegistryError)>,
}

/// 注册表统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    /// 已写入基底数
    pub bases_stored: u64,
    /// 去重命中次数
    pub dedup_hits: u64,
    /// 已删除基底数
    pub bases_deleted: u64,
    /// 写入的逻辑字节数
    pub logical_bytes_stored: u64,
    /// 去重节省的字节数
    pub bytes_saved: u64,
}

/// 基底注册表
pub struct BasisRegistry {
    config: RegistryConfig,
    store: Arc<dyn ByteStore>,
    version: Option<VersionStore>,
    codec: Option<Arc<dyn Codec>>,
    /// 内存存在性索引（仅 in_memory 模式）
    in_memory_index: Option<RwLock<HashSet<Fingerprint>>>,
    /// 指纹级写锁：存在性检查与写入对同一指纹原子化
    fingerprint_locks: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>,
    bases_stored: AtomicU64,
    dedup_hits: AtomicU64,
    bases_deleted: AtomicU64,
    logical_bytes_stored: AtomicU64,
    bytes_saved: AtomicU64,
}

impl BasisRegistry {
    /// 以默认磁盘存储构建注册表
    pub fn new(options: RegistryOptions) -> Result<Self> {
        Self::with_store(options, Arc::new(DiskStore))
    }

    /// 注入自定义字节存储（测试替身、计数器等）
    pub fn with_store(options: RegistryOptions, store: Arc<dyn ByteStore>) -> Result<Self> {
        let config = RegistryConfig::resolve(options)?;

        let version = config
            .versioning
            .as_ref()
            .map(|v| VersionStore::new(v.version_path.clone(), store.clone()));

        let codec: Option<Arc<dyn Codec>> = config
            .compression
            .as_ref()
            .map(|c| Arc::new(Compressor::new(c.config.clone())) as Arc<dyn Codec>);

        let in_memory_index = if config.in_memory {
            Some(RwLock::new(HashSet::new()))
        } else {
            None
        };

        info!(
            "基底注册表已创建: index={:?}, 版本管理={}, 压缩={}, 内存索引={}",
            config.index_path,
            version.is_some(),
            codec.is_some(),
            config.in_memory
        );

        Ok(Self {
            config,
            store,
            version,
            codec,
            in_memory_index,
            fingerprint_locks: Mutex::new(HashMap::new()),
            bases_stored: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
            bases_deleted: AtomicU64::new(0),
            logical_bytes_stored: AtomicU64::new(0),
            bytes_saved: AtomicU64::new(0),
        })
    }

    /// 替换编解码器实现（仅在压缩启用时生效）
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        if self.config.compression.is_some() {
            self.codec = Some(codec);
        }
        self
    }

    /// 初始化目录结构；in_memory 模式下预热存在性索引
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.config.fileout_path).await?;
        fs::create_dir_all(&self.config.index_path).await?;

        if let Some(version) = &self.version {
            version.init().await?;
        }
        if self.in_memory_index.is_some() {
            self.warm_index().await?;
        }

        info!("基底注册表初始化完成: {:?}", self.config.index_path);
        Ok(())
    }

    /// 已解析配置
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// 版本链管理器（启用时）
    pub fn version_store(&self) -> Option<&VersionStore> {
        self.version.as_ref()
    }

    /// 写入整文件内容
    ///
    /// 版本管理启用时先追加版本快照（版本链是完整写历史，
    /// 含即将成为规范内容的这次写入）；快照失败则不更新规范文件。
    /// 随后无条件覆盖规范输出位置。
    pub async fn write_file(&self, file_path: &str, data: &[u8]) -> Result<()> {
        if let Some(version) = &self.version {
            version.store_version(file_path, data).await?;
        }

        let canonical = self.canonical_path(file_path);
        self.store.write(&canonical, data).await?;

        debug!("规范文件已更新: {}", file_path);
        Ok(())
    }

    /// 读取整文件内容
    pub async fn load_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let canonical = self.canonical_path(file_path);
        match self.store.read(&canonical).await {
            Err(RegistryError::NotFound(_)) => Err(RegistryError::NotFound(format!(
                "文件不存在: {}",
                file_path
            ))),
            other => other,
        }
    }

    /// 批量存储基底（按指纹去重）
    ///
    /// 已存在的指纹直接跳过：不产生磁盘写入，也不做压缩工作。
    /// 条目间不构成事务，单条失败记入结果并继续处理其余条目。
    pub async fn store_bases(
        &self,
        bases: &HashMap<Fingerprint, Vec<u8>>,
    ) -> Result<StoreBasesResult> {
        let mut result = StoreBasesResult::default();

        for (fingerprint, data) in bases {
            match self.store_basis(fingerprint, data).await {
                Ok(true) => result.stored.push(fingerprint.clone()),
                Ok(false) => result.deduplicated.push(fingerprint.clone()),
                Err(e) => {
                    warn!("基底存储失败: {}: {}", fingerprint, e);
                    result.failed.push((fingerprint.clone(), e));
                }
            }
        }

        debug!(
            "批量存储完成: 新增 {}, 去重 {}, 失败 {}",
            result.stored.len(),
            result.deduplicated.len(),
            result.failed.len()
        );
        Ok(result)
    }

    /// 批量读取基底，就地替换映射中的占位值
    ///
    /// 任一指纹无对应基底即返回 NotFound；之前已读取的条目
    /// 保留读取结果，由调用方决定部分结果是否可用。
    pub async fn load_bases(&self, bases: &mut HashMap<Fingerprint, Vec<u8>>) -> Result<()> {
        let fingerprints: Vec<Fingerprint> = bases.keys().cloned().collect();

        for fingerprint in fingerprints {
            let data = self.load_basis(&fingerprint).await?;
            bases.insert(fingerprint, data);
        }

        Ok(())
    }

    /// 批量删除基底，返回实际删除数量
    ///
    /// 删除不存在的指纹不是错误；同时使内存存在性标记失效。
    pub async fn delete_bases(&self, fingerprints: &[Fingerprint]) -> Result<u64> {
        let mut removed = 0u64;

        for fingerprint in fingerprints {
            let path = self.basis_path(fingerprint)?;
            if self.store.remove(&path).await? {
                removed += 1;
            }

            if let Some(index) = &self.in_memory_index {
                index.write().unwrap().remove(fingerprint);
            }
        }

        self.bases_deleted.fetch_add(removed, Ordering::Relaxed);
        info!("已删除 {} 个基底", removed);
        Ok(removed)
    }

    /// 基底是否已存在
    ///
    /// in_memory 模式由内存索引应答，否则检查分片文件；
    /// 两种模式对调用方行为等价。
    pub async fn basis_exists(&self, fingerprint: &Fingerprint) -> bool {
        if let Some(index) = &self.in_memory_index {
            return index.read().unwrap().contains(fingerprint);
        }

        match self.basis_path(fingerprint) {
            Ok(path) => self.store.exists(&path).await,
            Err(_) => false,
        }
    }

    /// 统计信息快照
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            bases_stored: self.bases_stored.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            bases_deleted: self.bases_deleted.load(Ordering::Relaxed),
            logical_bytes_stored: self.logical_bytes_stored.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
        }
    }

    /// 存储单个基底，返回是否发生写入
    async fn store_basis(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<bool> {
        let path = self.basis_path(fingerprint)?;

        // 同一指纹的存在性检查与写入必须原子：裸的先查后写会竞争
        let guard = self.fingerprint_lock(fingerprint);
        let _held = guard.lock().await;

        let written = if self.basis_exists(fingerprint).await {
            self.dedup_hits.fetch_add(1, Ordering::Relaxed);
            self.bytes_saved
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            debug!("基底已存在，跳过: {}", fingerprint);
            false
        } else {
            let payload = match &self.codec {
                Some(codec) => {
                    let (meta, compressed) = codec.compress(data)?;
                    encode_frame(&meta, &compressed)
                }
                None => data.to_vec(),
            };

            self.store.write(&path, &payload).await?;

            if let Some(index) = &self.in_memory_index {
                index.write().unwrap().insert(fingerprint.clone());
            }

            self.bases_stored.fetch_add(1, Ordering::Relaxed);
            self.logical_bytes_stored
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            true
        };

        drop(_held);
        self.release_fingerprint_lock(fingerprint, &guard);
        Ok(written)
    }

    /// 读取单个基底
    async fn load_basis(&self, fingerprint: &Fingerprint) -> Result<Vec<u8>> {
        let path = self.basis_path(fingerprint)?;

        let raw = match self.store.read(&path).await {
            Ok(raw) => raw,
            Err(RegistryError::NotFound(_)) => {
                return Err(RegistryError::NotFound(format!(
                    "基底不存在: {}",
                    fingerprint
                )));
            }
            Err(e) => return Err(e),
        };

        match &self.codec {
            Some(codec) => {
                let (meta, payload) = decode_frame(&raw)?;
                let data = codec.decompress(&meta, payload)?;

                // 旧式全局尺寸提示仅作交叉校验，帧内记录的长度是权威值
                if let Some(compression) = &self.config.compression {
                    if let Some(hint) = compression.uncompressed_size {
                        if hint != meta.original_size {
                            warn!(
                                "基底原始长度与全局提示不符: {} != {}",
                                meta.original_size, hint
                            );
                        }
                    }
                }

                Ok(data)
            }
            None => Ok(raw),
        }
    }

    /// 指纹的基底完整路径
    fn basis_path(&self, fingerprint: &Fingerprint) -> Result<PathBuf> {
        let needed = self.config.major_group_length + self.config.minor_group_length;
        let hex_len = fingerprint.len() * 2;
        if hex_len < needed {
            return Err(RegistryError::Config(format!(
                "指纹长度不足以分片: {} < {}",
                hex_len, needed
            )));
        }

        Ok(self.config.index_path.join(shard_relative(
            fingerprint,
            self.config.major_group_length,
            self.config.minor_group_length,
        )))
    }

    /// 规范文件完整路径
    fn canonical_path(&self, file_path: &str) -> PathBuf {
        self.config
            .fileout_path
            .join(file_path.trim_start_matches('/'))
    }

    /// 扫描索引目录树，重建内存存在性索引
    ///
    /// 使 in_memory 模式在重启后与磁盘索引保持一致。
    async fn warm_index(&self) -> Result<()> {
        let index = match &self.in_memory_index {
            Some(index) => index,
            None => return Ok(()),
        };

        let mut loaded = Vec::new();

        let mut majors = match fs::read_dir(&self.config.index_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RegistryError::Io(e)),
        };
        while let Some(major) = majors.next_entry().await? {
            if !major.path().is_dir() {
                continue;
            }
            let mut minors = fs::read_dir(major.path()).await?;
            while let Some(minor) = minors.next_entry().await? {
                if !minor.path().is_dir() {
                    continue;
                }
                let mut files = fs::read_dir(minor.path()).await?;
                while let Some(file) = files.next_entry().await? {
                    if let Some(name) = file.file_name().to_str() {
                        if let Ok(bytes) = hex::decode(name) {
                            loaded.push(Fingerprint::new(bytes));
                        }
                    }
                }
            }
        }

        let count = loaded.len();
        index.write().unwrap().extend(loaded);

        info!("内存索引预热完成: {} 个基底", count);
        Ok(())
    }

    fn fingerprint_lock(&self, fingerprint: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fingerprint_locks.lock().unwrap();
        locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// 无其他等待者时回收锁条目
    fn release_fingerprint_lock(
        &self,
        fingerprint: &Fingerprint,
        guard: &Arc<tokio::sync::Mutex<()>>,
    ) {
        let mut locks = self.fingerprint_locks.lock().unwrap();
        if Arc::strong_count(guard) <= 2 {
            locks.remove(fingerprint);
        }
    }
}
