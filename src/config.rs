//! 注册表配置模块
//!
//! 原始配置（字段全部可选）经 `RegistryConfig::resolve` 一次性校验为
//! 不可变的已解析配置。校验是急切的：缺失必填项即构造失败，
//! 并在错误中指明缺失字段；之后不再出现配置类错误。

use crate::compression::{CompressionAlgorithm, CompressionConfig};
use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 默认指纹十六进制长度（SHA-256 摘要）
const DEFAULT_FINGERPRINT_HEX_LENGTH: usize = 64;

/// 原始注册表配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryOptions {
    /// 规范文件输出目录
    pub fileout_path: Option<PathBuf>,
    /// 基底索引目录
    pub index_path: Option<PathBuf>,
    /// 主分片标签长度（十六进制字符数）
    pub major_group_length: Option<usize>,
    /// 次分片标签长度（十六进制字符数）
    pub minor_group_length: Option<usize>,
    /// 使用内存存在性索引
    #[serde(default)]
    pub in_memory: bool,
    /// 指纹十六进制长度（默认 64，即 SHA-256）
    pub fingerprint_hex_length: Option<usize>,
    /// 版本管理配置
    pub versioning: Option<VersioningOptions>,
    /// 压缩配置
    pub compression: Option<CompressionOptions>,
}

/// 版本管理原始配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersioningOptions {
    /// 版本存储根目录
    pub version_path: Option<PathBuf>,
}

/// 压缩原始配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// 旧式全局未压缩大小提示（仅用于读取时交叉校验）
    pub uncompressed_size: Option<u64>,
    /// 压缩算法标识符（none / lz4 / zstd）
    pub algorithm: Option<String>,
    /// 编解码器特定配置文档
    pub configuration: Option<serde_json::Value>,
}

impl RegistryOptions {
    /// 从 JSON 文档加载
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// 从 TOML 配置文件加载
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| RegistryError::Config(format!("TOML 解析失败: {}", e)))
    }
}

/// 已解析的注册表配置
///
/// 构造后不可变。
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub fileout_path: PathBuf,
    pub index_path: PathBuf,
    pub major_group_length: usize,
    pub minor_group_length: usize,
    pub fingerprint_hex_length: usize,
    pub in_memory: bool,
    pub versioning: Option<VersioningConfig>,
    pub compression: Option<ResolvedCompression>,
}

/// 已解析的版本管理配置
#[derive(Debug, Clone)]
pub struct VersioningConfig {
    pub version_path: PathBuf,
}

/// 已解析的压缩配置
#[derive(Debug, Clone)]
pub struct ResolvedCompression {
    pub config: CompressionConfig,
    /// 旧式全局未压缩大小提示
    pub uncompressed_size: Option<u64>,
}

impl RegistryConfig {
    /// 解析并校验原始配置
    pub fn resolve(options: RegistryOptions) -> Result<Self> {
        let fileout_path = options
            .fileout_path
            .ok_or_else(|| missing("fileout_path"))?;
        let index_path = options.index_path.ok_or_else(|| missing("index_path"))?;
        let major_group_length = options
            .major_group_length
            .ok_or_else(|| missing("major_group_length"))?;
        let minor_group_length = options
            .minor_group_length
            .ok_or_else(|| missing("minor_group_length"))?;
        let fingerprint_hex_length = options
            .fingerprint_hex_length
            .unwrap_or(DEFAULT_FINGERPRINT_HEX_LENGTH);

        if major_group_length == 0 || minor_group_length == 0 {
            return Err(RegistryError::Config(
                "分片标签长度必须大于 0".to_string(),
            ));
        }
        if major_group_length + minor_group_length > fingerprint_hex_length {
            return Err(RegistryError::Config(format!(
                "分片标签长度之和超过指纹长度: {} + {} > {}",
                major_group_length, minor_group_length, fingerprint_hex_length
            )));
        }

        // versioning 节存在但缺少 version_path 时禁用版本管理
        let versioning = options
            .versioning
            .and_then(|v| v.version_path)
            .map(|version_path| VersioningConfig { version_path });

        let compression = match options.compression {
            Some(c) => Some(resolve_compression(c)?),
            None => None,
        };

        Ok(Self {
            fileout_path,
            index_path,
            major_group_length,
            minor_group_length,
            fingerprint_hex_length,
            in_memory: options.in_memory,
            versioning,
            compression,
        })
    }
}

fn missing(field: &str) -> RegistryError {
    RegistryError::Config(format!("缺少配置项: {}", field))
}

fn resolve_compression(options: CompressionOptions) -> Result<ResolvedCompression> {
    let algorithm = match options.algorithm {
        Some(name) => CompressionAlgorithm::parse(&name)?,
        None => return Err(missing("compression.algorithm")),
    };

    let mut config: CompressionConfig = match options.configuration {
        Some(value) => serde_json::from_value(value)?,
        None => CompressionConfig::default(),
    };
    config.algorithm = algorithm;

    Ok(ResolvedCompression {
        config,
        uncompressed_size: options.uncompressed_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_options() -> RegistryOptions {
        RegistryOptions {
            fileout_path: Some(PathBuf::from("/tmp/out")),
            index_path: Some(PathBuf::from("/tmp/index")),
            major_group_length: Some(2),
            minor_group_length: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_minimal() {
        let config = RegistryConfig::resolve(base_options()).unwrap();
        assert_eq!(config.major_group_length, 2);
        assert_eq!(config.fingerprint_hex_length, 64);
        assert!(!config.in_memory);
        assert!(config.versioning.is_none());
        assert!(config.compression.is_none());
    }

    #[test]
    fn test_missing_fields_are_named() {
        for field in [
            "fileout_path",
            "index_path",
            "major_group_length",
            "minor_group_length",
        ] {
            let mut options = base_options();
            match field {
                "fileout_path" => options.fileout_path = None,
                "index_path" => options.index_path = None,
                "major_group_length" => options.major_group_length = None,
                _ => options.minor_group_length = None,
            }
            let err = RegistryConfig::resolve(options).unwrap_err();
            assert!(err.to_string().contains(field), "应指明缺失字段 {}", field);
        }
    }

    #[test]
    fn test_shard_lengths_must_fit_fingerprint() {
        let mut options = base_options();
        options.fingerprint_hex_length = Some(8);
        options.major_group_length = Some(5);
        options.minor_group_length = Some(4);
        assert!(RegistryConfig::resolve(options).is_err());
    }

    #[test]
    fn test_zero_shard_length_rejected() {
        let mut options = base_options();
        options.major_group_length = Some(0);
        assert!(RegistryConfig::resolve(options).is_err());
    }

    #[test]
    fn test_versioning_without_path_disables() {
        let mut options = base_options();
        options.versioning = Some(VersioningOptions { version_path: None });
        let config = RegistryConfig::resolve(options).unwrap();
        assert!(config.versioning.is_none());
    }

    #[test]
    fn test_compression_requires_algorithm() {
        let mut options = base_options();
        options.compression = Some(CompressionOptions::default());
        let err = RegistryConfig::resolve(options).unwrap_err();
        assert!(err.to_string().contains("compression.algorithm"));
    }

    #[test]
    fn test_compression_configuration_document() {
        let mut options = base_options();
        options.compression = Some(CompressionOptions {
            uncompressed_size: Some(4096),
            algorithm: Some("zstd".to_string()),
            configuration: Some(json!({ "level": 3, "min_size": 0 })),
        });

        let config = RegistryConfig::resolve(options).unwrap();
        let compression = config.compression.unwrap();
        assert_eq!(compression.config.algorithm, CompressionAlgorithm::Zstd);
        assert_eq!(compression.config.level, 3);
        assert_eq!(compression.config.min_size, 0);
        assert_eq!(compression.uncompressed_size, Some(4096));
    }

    #[test]
    fn test_from_json_value() {
        let options = RegistryOptions::from_json_value(json!({
            "fileout_path": "/tmp/out",
            "index_path": "/tmp/index",
            "major_group_length": 2,
            "minor_group_length": 2,
            "in_memory": true,
            "versioning": { "version_path": "/tmp/versions" }
        }))
        .unwrap();

        let config = RegistryConfig::resolve(options).unwrap();
        assert!(config.in_memory);
        assert_eq!(
            config.versioning.unwrap().version_path,
            PathBuf::from("/tmp/versions")
        );
    }
}
