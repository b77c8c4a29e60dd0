//! Basis Store: 内容寻址去重基底存储
//!
//! 为虚拟文件系统表面提供按指纹去重的二进制片段（基底）持久化，包括：
//! - 指纹两级分片的内容寻址索引
//! - 批量存储 / 读取 / 删除与幂等去重
//! - 透明压缩（LZ4 / Zstd，逐基底记录原始长度）
//! - 整文件写入的线性版本链
//!
//! ## 架构设计
//!
//! ```text
//! basis-store/
//! |-- fingerprint  # 指纹与分片路径
//! |-- store        # 字节存储抽象
//! |-- compression  # 编解码器与基底帧
//! |-- version      # 版本链管理
//! |-- registry     # 基底注册表（顶层 API）
//! ```

mod error;

pub mod compression;
pub mod config;
pub mod fingerprint;
pub mod registry;
pub mod store;
pub mod version;

pub use error::{RegistryError, Result};

pub use compression::{
    BasisMeta, Codec, CompressionAlgorithm, CompressionConfig, Compressor, decode_frame,
    encode_frame,
};
pub use config::{
    CompressionOptions, RegistryConfig, RegistryOptions, VersioningConfig, VersioningOptions,
};
pub use fingerprint::{Fingerprint, shard_relative};
pub use registry::{BasisRegistry, RegistryStats, StoreBasesResult};
pub use store::{ByteStore, DiskStore};
pub use version::VersionStore;
