//! 帧图（RenderGraph）
//!
//! 声明 Pass 及其资源访问，自动完成依赖排序、临时资源别名与 barrier 生成。
//! 与具体的 GPU 后端之间只通过 [`render_graph::RgDevice`] / [`render_graph::RgCommandEncoder`] 交互。

pub mod render_graph;
