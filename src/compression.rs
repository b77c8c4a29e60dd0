//! 数据压缩模块
//!
//! 支持LZ4和Zstd压缩算法，提供：
//! - 多种压缩算法选择
//! - 基底帧格式（逐基底记录真实原始长度）
//! - 压缩效果不佳时自动回退为不压缩

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// 压缩算法类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// 无压缩
    None,
    /// LZ4压缩（快速）
    #[default]
    LZ4,
    /// Zstd压缩（高压缩比）
    Zstd,
}

impl CompressionAlgorithm {
    /// 算法标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::LZ4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }

    /// 由配置中的算法标识符解析
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionAlgorithm::None),
            "lz4" => Ok(CompressionAlgorithm::LZ4),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            other => Err(RegistryError::Config(format!("未知压缩算法: {}", other))),
        }
    }

    /// 帧头中的算法标记
    fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::LZ4 => 1,
            CompressionAlgorithm::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::LZ4),
            2 => Ok(CompressionAlgorithm::Zstd),
            other => Err(RegistryError::Codec {
                algorithm: "frame".to_string(),
                message: format!("未知算法标记: {}", other),
            }),
        }
    }
}

/// 压缩配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// 压缩算法
    #[serde(default)]
    pub algorithm: CompressionAlgorithm,
    /// 压缩等级（Zstd 使用，0 表示库默认）
    #[serde(default = "CompressionConfig::default_level")]
    pub level: u32,
    /// 启用压缩的最小数据大小（字节）
    #[serde(default = "CompressionConfig::default_min_size")]
    pub min_size: usize,
    /// 压缩比阈值（低于此比率回退为不压缩）
    #[serde(default = "CompressionConfig::default_min_ratio")]
    pub min_ratio: f32,
}

impl CompressionConfig {
    fn default_level() -> u32 {
        1
    }

    fn default_min_size() -> usize {
        1024
    }

    fn default_min_ratio() -> f32 {
        1.1
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::LZ4,
            level: Self::default_level(),
            min_size: Self::default_min_size(),
            min_ratio: Self::default_min_ratio(),
        }
    }
}

/// 基底帧元数据
///
/// 与压缩负载一同持久化：记录实际使用的算法与真实原始长度，
/// 解压不依赖任何全局尺寸假设。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasisMeta {
    /// 实际使用的算法（可能因回退而与配置不同）
    pub algorithm: CompressionAlgorithm,
    /// 原始（未压缩）长度
    pub original_size: u64,
}

/// 帧头长度：1 字节算法标记 + 8 字节小端原始长度
pub const FRAME_HEADER_LEN: usize = 9;

/// 编码基底帧
pub fn encode_frame(meta: &BasisMeta, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(meta.algorithm.tag());
    frame.extend_from_slice(&meta.original_size.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// 解码基底帧，返回元数据与负载
pub fn decode_frame(data: &[u8]) -> Result<(BasisMeta, &[u8])> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(RegistryError::Codec {
            algorithm: "frame".to_string(),
            message: format!("基底帧过短: {} 字节", data.len()),
        });
    }

    let algorithm = CompressionAlgorithm::from_tag(data[0])?;
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&data[1..FRAME_HEADER_LEN]);
    let original_size = u64::from_le_bytes(size_bytes);

    Ok((
        BasisMeta {
            algorithm,
            original_size,
        },
        &data[FRAME_HEADER_LEN..],
    ))
}

/// 编解码能力接口
pub trait Codec: Send + Sync {
    /// 压缩数据，返回元数据与压缩负载
    fn compress(&self, data: &[u8]) -> Result<(BasisMeta, Vec<u8>)>;

    /// 按元数据解压负载，并校验原始长度
    fn decompress(&self, meta: &BasisMeta, data: &[u8]) -> Result<Vec<u8>>;
}

/// 压缩器
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }
}

impl Codec for Compressor {
    fn compress(&self, data: &[u8]) -> Result<(BasisMeta, Vec<u8>)> {
        let original_size = data.len() as u64;

        // 小于阈值不压缩
        if data.len() < self.config.min_size {
            return Ok((
                BasisMeta {
                    algorithm: CompressionAlgorithm::None,
                    original_size,
                },
                data.to_vec(),
            ));
        }

        let compressed = match self.config.algorithm {
            CompressionAlgorithm::None => data.to_vec(),
            CompressionAlgorithm::LZ4 => compress_lz4(data),
            CompressionAlgorithm::Zstd => compress_zstd(data, self.config.level)?,
        };

        // 压缩效果不佳时回退为不压缩
        if self.config.algorithm != CompressionAlgorithm::None {
            let ratio = if compressed.is_empty() {
                1.0
            } else {
                data.len() as f32 / compressed.len() as f32
            };
            if ratio < self.config.min_ratio {
                return Ok((
                    BasisMeta {
                        algorithm: CompressionAlgorithm::None,
                        original_size,
                    },
                    data.to_vec(),
                ));
            }
        }

        Ok((
            BasisMeta {
                algorithm: self.config.algorithm,
                original_size,
            },
            compressed,
        ))
    }

    fn decompress(&self, meta: &BasisMeta, data: &[u8]) -> Result<Vec<u8>> {
        let output = match meta.algorithm {
            CompressionAlgorithm::None => data.to_vec(),
            CompressionAlgorithm::LZ4 => decompress_lz4(data, meta.original_size as usize)?,
            CompressionAlgorithm::Zstd => decompress_zstd(data)?,
        };

        if output.len() as u64 != meta.original_size {
            return Err(RegistryError::Codec {
                algorithm: meta.algorithm.as_str().to_string(),
                message: format!(
                    "解压后长度不符: 期望 {} 字节, 实际 {} 字节",
                    meta.original_size,
                    output.len()
                ),
            });
        }

        Ok(output)
    }
}

/// LZ4压缩
fn compress_lz4(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// LZ4解压缩（需要记录的原始长度）
fn decompress_lz4(data: &[u8], original_size: usize) -> Result<Vec<u8>> {
    lz4_flex::block::decompress(data, original_size).map_err(|e| RegistryError::Codec {
        algorithm: "lz4".to_string(),
        message: format!("LZ4解压缩失败: {}", e),
    })
}

/// Zstd压缩
fn compress_zstd(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder =
        zstd::Encoder::new(Vec::new(), level as i32).map_err(|e| RegistryError::Codec {
            algorithm: "zstd".to_string(),
            message: format!("Zstd压缩初始化失败: {}", e),
        })?;
    encoder.write_all(data).map_err(|e| RegistryError::Codec {
        algorithm: "zstd".to_string(),
        message: format!("Zstd压缩写入失败: {}", e),
    })?;
    encoder.finish().map_err(|e| RegistryError::Codec {
        algorithm: "zstd".to_string(),
        message: format!("Zstd压缩失败: {}", e),
    })
}

/// Zstd解压缩
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data).map_err(|e| RegistryError::Codec {
        algorithm: "zstd".to_string(),
        message: format!("Zstd解压缩初始化失败: {}", e),
    })?;
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| RegistryError::Codec {
            algorithm: "zstd".to_string(),
            message: format!("Zstd解压缩失败: {}", e),
        })?;
    Ok(decompressed)
}
