//! 指纹与分片路径模块
//!
//! 基底由内容派生的指纹唯一标识。指纹按小写十六进制渲染后
//! 映射为两级分片目录路径，限制单目录扇出。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// 内容指纹
///
/// 不透明的字节序列，按字节精确比较，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// 由内容计算 SHA-256 指纹
    pub fn from_content(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().to_vec())
    }

    /// 小写十六进制表示（无分隔符）
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Fingerprint {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 计算指纹的两级分片相对路径
///
/// `hex[0..major] / hex[major..major+minor] / hex`。纯函数，
/// 不触碰文件系统；调用方保证 `major + minor` 不超过十六进制长度
/// （注册表在构造时校验该约束）。
pub fn shard_relative(fingerprint: &Fingerprint, major: usize, minor: usize) -> PathBuf {
    let hex = fingerprint.to_hex();
    let major_part = &hex[..major];
    let minor_part = &hex[major..major + minor];
    PathBuf::from(major_part).join(minor_part).join(&hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_lowercase() {
        let fp = Fingerprint::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(fp.to_hex(), "deadbeef");
    }

    #[test]
    fn test_hex_preserves_leading_zeros() {
        let fp = Fingerprint::new(vec![0x00, 0x0a, 0xff]);
        assert_eq!(fp.to_hex(), "000aff");
    }

    #[test]
    fn test_shard_relative() {
        let fp = Fingerprint::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let path = shard_relative(&fp, 2, 2);
        assert_eq!(path, PathBuf::from("de").join("ad").join("deadbeef"));
    }

    #[test]
    fn test_shard_relative_deterministic() {
        let fp = Fingerprint::from_content(b"some basis content");
        let a = shard_relative(&fp, 3, 2);
        let b = shard_relative(&fp, 3, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_prefixes_distinct_shards() {
        let a = Fingerprint::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let b = Fingerprint::new(vec![0xca, 0xfe, 0xbe, 0xef]);
        assert_ne!(shard_relative(&a, 2, 2), shard_relative(&b, 2, 2));
    }

    #[test]
    fn test_from_content_stable() {
        let a = Fingerprint::from_content(b"hello");
        let b = Fingerprint::from_content(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32); // SHA-256
    }

    #[test]
    fn test_byte_exact_equality() {
        let a = Fingerprint::new(vec![1, 2, 3]);
        let b = Fingerprint::new(vec![1, 2, 4]);
        assert_ne!(a, b);
    }
}
