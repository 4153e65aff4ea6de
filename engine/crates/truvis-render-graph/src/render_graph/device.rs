//! RenderGraph 与 GPU 执行层之间的接口
//!
//! RenderGraph 只通过这两个 trait 创建 / 销毁物理资源以及录制同步命令，
//! 不关心具体的 device、allocator 和 command buffer 实现。

use ash::vk;

use super::barrier::RgBarrierBatch;
use super::buffer_resource::RgBufferDesc;
use super::image_resource::RgImageDesc;
use super::pass::RgDepthBias;

/// 物理资源的创建与销毁
///
/// 只有资源池会调用这里的创建 / 销毁接口。
pub trait RgDevice {
    fn create_buffer(&mut self, desc: &RgBufferDesc) -> vk::Buffer;

    /// `desc.views` 中的子视图需要一并创建
    fn create_image(&mut self, desc: &RgImageDesc) -> vk::Image;

    fn destroy_buffer(&mut self, buffer: vk::Buffer);

    fn destroy_image(&mut self, image: vk::Image);

    /// 设置 debug name
    fn set_buffer_name(&mut self, _buffer: vk::Buffer, _name: &str) {}

    fn set_image_name(&mut self, _image: vk::Image, _name: &str) {}
}

/// split barrier 的标识，执行层一般映射为一个 `vk::Event`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RgSplitBarrierId(pub u32);

/// 清除值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl RgClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue { color: vk::ClearColorValue { float32 } },
            Self::DepthStencil { depth, stencil } => {
                vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth, stencil } }
            }
        }
    }
}

/// 动态渲染的一个 attachment
#[derive(Clone, Copy, Debug)]
pub struct RgRenderingAttachment {
    pub image: vk::Image,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: RgClearValue,
}

/// 动态渲染的参数
#[derive(Clone, Debug)]
pub struct RgRenderingInfo {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<RgRenderingAttachment>,
    pub depth_attachment: Option<RgRenderingAttachment>,
}

/// 命令录制
pub trait RgCommandEncoder {
    fn cmd_pipeline_barrier(&mut self, batch: &RgBarrierBatch);

    /// split barrier 的前半部分，在 producer 执行之后录制
    fn cmd_set_split_barrier(&mut self, id: RgSplitBarrierId, batch: &RgBarrierBatch);

    /// split barrier 的后半部分，在 consumer 执行之前录制
    fn cmd_wait_split_barrier(&mut self, id: RgSplitBarrierId, batch: &RgBarrierBatch);

    fn cmd_begin_rendering(&mut self, info: &RgRenderingInfo);

    fn cmd_end_rendering(&mut self);

    /// 动态 viewport 与 scissor
    fn cmd_set_viewport_scissor(&mut self, _area: vk::Rect2D) {}

    fn cmd_set_depth_bias(&mut self, _bias: &RgDepthBias) {}

    fn begin_label(&mut self, _name: &str) {}

    fn end_label(&mut self) {}
}
