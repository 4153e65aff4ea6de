//! Barrier 描述与解析
//!
//! 编译阶段为每一个冲突生成一个 [`RgBarrier`]，执行阶段再结合物理资源解析为
//! `vk::BufferMemoryBarrier2` / `vk::ImageMemoryBarrier2`。

use std::fmt;

use ash::vk;

use super::image_resource::RgSubresourceDesc;
use super::resource_handle::RgResourceId;
use super::resource_state::infer_aspect;

/// 依赖类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgDependencyKind {
    /// 只需要 stage 之间的执行依赖（读之后写）
    Execution,
    /// 需要 access mask 的内存依赖（涉及之前的写）
    Memory,
    /// 图像 layout 转换
    Layout,
}

impl fmt::Display for RgDependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Execution => "execution",
            Self::Memory => "memory",
            Self::Layout => "layout",
        };
        f.write_str(name)
    }
}

/// Barrier 的放置方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgBarrierPlacement {
    /// 在 consumer 执行前直接等待
    Immediate,
    /// producer 执行后 signal，consumer 执行前 wait
    Split,
}

/// 编译阶段生成的 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBarrier {
    pub placement: RgBarrierPlacement,
    pub dependency: RgDependencyKind,
    pub resource: RgResourceId,
    /// 只作用于某个 split 子视图
    pub subview: Option<u8>,
    /// 子视图覆盖的范围，为空时作用于整个资源
    pub subresource: Option<RgSubresourceDesc>,

    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    /// buffer 始终为 UNDEFINED
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,

    /// 排序后的 pass 位置；为空表示资源在本帧内没有更早的访问
    pub producer: Option<usize>,
    pub consumer: usize,
}

// tools
impl RgBarrier {
    #[inline]
    pub fn is_split(&self) -> bool {
        self.placement == RgBarrierPlacement::Split
    }

    #[inline]
    pub fn is_layout_transition(&self) -> bool {
        self.old_layout != self.new_layout
    }

    fn src_stage_mask(&self) -> vk::PipelineStageFlags2 {
        if self.src_stage.is_empty() { vk::PipelineStageFlags2::NONE } else { self.src_stage }
    }

    /// 解析为 buffer barrier
    pub fn to_buffer_barrier(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(self.src_stage_mask())
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }

    /// 解析为 image barrier
    ///
    /// aspect 由格式推断；子视图的 barrier 只覆盖它自己的 subresource range。
    pub fn to_image_barrier(&self, image: vk::Image, format: vk::Format) -> vk::ImageMemoryBarrier2<'static> {
        let range = match self.subresource {
            Some(desc) => desc.to_range(format),
            None => vk::ImageSubresourceRange {
                aspect_mask: infer_aspect(format),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        };

        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage_mask())
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
    }
}

/// 一次录制的 barrier 集合
#[derive(Clone, Debug, Default)]
pub struct RgBarrierBatch {
    pub buffer_barriers: Vec<vk::BufferMemoryBarrier2<'static>>,
    pub image_barriers: Vec<vk::ImageMemoryBarrier2<'static>>,
}

impl RgBarrierBatch {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer_barriers.len() + self.image_barriers.len()
    }

    /// 用于 `vkCmdPipelineBarrier2` / `vkCmdSetEvent2` / `vkCmdWaitEvents2`
    pub fn dependency_info(&self) -> vk::DependencyInfo<'_> {
        vk::DependencyInfo::default()
            .buffer_memory_barriers(&self.buffer_barriers)
            .image_memory_barriers(&self.image_barriers)
    }
}

const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
    (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
    (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
    (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
    (vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, "VERTEX_ATTR_INPUT"),
    (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
    (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
    (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
    (vk::PipelineStageFlags2::COPY, "COPY"),
    (vk::PipelineStageFlags2::BLIT, "BLIT"),
    (vk::PipelineStageFlags2::CONDITIONAL_RENDERING_EXT, "CONDITIONAL_RENDERING"),
    (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
];

const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
    (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
    (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
    (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
    (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
    (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
    (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
    (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    (vk::AccessFlags2::CONDITIONAL_RENDERING_READ_EXT, "CONDITIONAL_READ"),
    (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
    (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
];

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<_> = STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{stage:?}") } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<_> =
        ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{access:?}") } else { names.join(" | ") }
}
