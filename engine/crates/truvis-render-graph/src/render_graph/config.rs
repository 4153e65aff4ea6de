//! RenderGraph 配置
//!
//! 可以直接构造，也可以从 TOML 加载，缺省的字段使用默认值：
//!
//! ```toml
//! [graph]
//! split_barrier_min_distance = 2
//!
//! [pool]
//! max_unused_frames = 16
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 编译相关的配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgGraphConfig {
    /// producer 与 consumer 的距离不小于该值时使用 split barrier
    pub split_barrier_min_distance: usize,
    /// 拓扑排序之后按依赖深度重新分桶
    pub depth_rebucket: bool,
    /// 剔除输出无人使用的 `CULLABLE` Pass
    pub cull_passes: bool,
}

impl Default for RgGraphConfig {
    fn default() -> Self {
        Self { split_barrier_min_distance: 2, depth_rebucket: true, cull_passes: true }
    }
}

/// 资源池相关的配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgPoolConfig {
    /// 同时在飞的帧数
    ///
    /// 本帧没有绑定过的资源，只有连续闲置了这么多帧之后才能被别的资源复用。
    pub buffered_frame_count: u32,
    /// 闲置超过该帧数的资源会被销毁
    pub max_unused_frames: u32,
}

impl Default for RgPoolConfig {
    fn default() -> Self {
        Self { buffered_frame_count: 3, max_unused_frames: 8 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgConfig {
    pub graph: RgGraphConfig,
    pub pool: RgPoolConfig,
}

impl RgConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("解析 RenderGraph 配置失败")
    }

    /// 从 TOML 文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("配置文件: {:?}", path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RgConfig::from_toml_str(
            r#"
            [graph]
            split_barrier_min_distance = 4

            [pool]
            max_unused_frames = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.split_barrier_min_distance, 4);
        assert!(config.graph.depth_rebucket);
        assert_eq!(config.pool.buffered_frame_count, 3);
        assert_eq!(config.pool.max_unused_frames, 16);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(RgConfig::from_toml_str("").unwrap(), RgConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RgConfig::from_toml_str("[graph]\nsplit_barrier_min_distance = \"far\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(RgConfig::load("/nonexistent/render_graph.toml").is_err());
    }
}
