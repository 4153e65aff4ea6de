//! RenderGraph - 声明式渲染图系统
//!
//! 每帧声明 Pass 与它们的资源访问，由编译器完成依赖排序、Pass 剔除、
//! 临时资源的分配与别名以及 barrier 的生成。
//!
//! # 核心概念
//!
//! - **RgImageHandle / RgBufferHandle**: 带版本号的虚拟资源句柄，写操作返回新版本
//! - **RgAccessFlags**: 语义访问标记，stage / access / usage 由它推断
//! - **split / merge**: 把图像拆成 mip / layer 子视图分别跟踪版本与 layout
//! - **RgResourcePool**: 跨帧复用物理资源，同一帧内生命周期不重叠的资源共享内存
//! - **RgDevice / RgCommandEncoder**: 与 GPU 后端之间的接口
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_render_graph::render_graph::*;
//!
//! let mut graph = RenderGraph::new(config.graph.clone());
//! let backbuffer = graph.import_image("backbuffer", image, desc, vk::ImageLayout::UNDEFINED);
//! let hdr = graph.create_image_like("hdr", backbuffer, RgImageInherit::EXTENT, hdr_desc);
//!
//! #[derive(Default)]
//! struct LightingData {
//!     hdr: RgImageHandle,
//! }
//! graph.add_pass(
//!     "lighting",
//!     RgPassFlags::empty(),
//!     |graph, data: &mut LightingData| {
//!         data.hdr = graph.write_image(hdr, RgAccessFlags::COMPUTE | RgAccessFlags::STORAGE);
//!     },
//!     |data, ctx| {
//!         let hdr = ctx.image(data.hdr);
//!         // 录制 dispatch
//!     },
//! );
//! graph.set_present_target(backbuffer);
//!
//! graph.compile(&mut pool, &mut device)?;
//! graph.execute(&mut encoder, frame_index)?;
//! graph.reset(&mut pool, &mut device);
//! ```

mod access_flags;
mod access_log;
mod barrier;
mod buffer_resource;
mod compiler;
mod config;
mod default_resources;
mod device;
mod error;
mod executor;
mod graph;
mod image_resource;
mod pass;
#[allow(clippy::module_inception)]
mod render_graph;
mod resource_handle;
mod resource_pool;
mod resource_registry;
mod resource_state;
mod watcher;

#[cfg(test)]
mod test_utils;

// Re-exports
pub use access_flags::{RgAccessError, RgAccessFlags, RgInferredAccess, infer_access};
pub use access_log::{RgAccessLog, RgAccessRecord, RgAccessType, RgBufferAccess, RgImageAccess};
pub use barrier::{
    RgBarrier, RgBarrierBatch, RgBarrierPlacement, RgDependencyKind, format_access_flags, format_pipeline_stage,
};
pub use buffer_resource::{RgBufferDesc, RgBufferResource, RgBufferSource};
pub use config::{RgConfig, RgGraphConfig, RgPoolConfig};
pub use default_resources::{RgDefaultImageKind, RgDefaultImages};
pub use device::{
    RgClearValue, RgCommandEncoder, RgDevice, RgRenderingAttachment, RgRenderingInfo, RgSplitBarrierId,
};
pub use error::RgCompileError;
pub use graph::{DependencyGraph, RgDependencyEvent, RgDependencyRole, RgProducerConflict};
pub use image_resource::{
    RgImageDesc, RgImageInference, RgImageInherit, RgImageResource, RgImageSource, RgImageSplitState,
    RgSubresourceDesc, RgSubviewExtra,
};
pub use pass::{
    RgColorAttachment, RgDepthAttachment, RgDepthBias, RgPass, RgPassContext, RgPassFlags, RgPassNode,
};
pub use render_graph::RenderGraph;
pub use resource_handle::{RgBufferHandle, RgHandleFlags, RgImageHandle, RgResourceId, RgResourceKey, RgResourceKind};
pub use resource_pool::{RgPoolAllocation, RgPoolDonor, RgPoolKey, RgPoolOwner, RgResourcePool};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::{RgImageState, infer_aspect, infer_image_layout, is_depth_format, is_write_access};
pub use watcher::{RgDotExporter, RgGraphWatcher, RgPassInfo};
