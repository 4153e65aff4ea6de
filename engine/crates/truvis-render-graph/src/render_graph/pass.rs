//! Pass 定义
//!
//! 提供 `RgPass` trait 用于声明式定义渲染 Pass，闭包形式的 Pass 见
//! [`RenderGraph::add_pass`](super::RenderGraph::add_pass)。
//! 两种形式最终都被类型擦除为 `Box<dyn RgPassExecutor>` 存放在 [`RgPassNode`] 中。

use ash::vk;

use super::buffer_resource::RgBufferDesc;
use super::device::RgCommandEncoder;
use super::image_resource::RgImageDesc;
use super::render_graph::RenderGraph;
use super::resource_handle::{RgBufferHandle, RgImageHandle};
use super::resource_registry::RgResourceRegistry;

bitflags::bitflags! {
    /// Pass 标记
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RgPassFlags: u8 {
        /// 需要开启 dynamic rendering（声明了 render target）
        const RASTERIZATION = 1 << 0;
        /// 不执行（资源推断失败时由编译器设置，也可以由用户设置）
        const DISABLED = 1 << 1;
        /// 输出无人使用时可以被剔除
        const CULLABLE = 1 << 2;
    }
}

/// color render target 的声明
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgColorAttachment {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl Default for RgColorAttachment {
    fn default() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RgColorAttachment {
    /// 保留之前的内容
    pub fn load() -> Self {
        Self { load_op: vk::AttachmentLoadOp::LOAD, ..Default::default() }
    }

    pub fn clear(clear_color: [f32; 4]) -> Self {
        Self { clear_color, ..Default::default() }
    }
}

/// depth-stencil render target 的声明
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgDepthAttachment {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl Default for RgDepthAttachment {
    fn default() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

impl RgDepthAttachment {
    /// 只做深度测试，不写入
    pub fn read_only() -> Self {
        Self { load_op: vk::AttachmentLoadOp::LOAD, store_op: vk::AttachmentStoreOp::NONE, ..Default::default() }
    }
}

/// 动态 depth bias
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RgDepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

/// Pass 执行时的上下文
///
/// 提供 Pass 执行所需的命令录制接口和物理资源查询。
pub struct RgPassContext<'c> {
    pub encoder: &'c mut dyn RgCommandEncoder,
    pub frame_index: u64,
    /// 当前 Pass 在执行顺序中的位置
    pub pass_index: usize,
    pub(crate) resources: &'c RgResourceRegistry,
}

impl RgPassContext<'_> {
    /// 获取缓冲区的物理句柄
    #[inline]
    pub fn buffer(&self, handle: RgBufferHandle) -> Option<vk::Buffer> {
        self.resources.buffer(handle).and_then(|res| res.physical)
    }

    #[inline]
    pub fn buffer_desc(&self, handle: RgBufferHandle) -> Option<&RgBufferDesc> {
        self.resources.buffer(handle).map(|res| &res.desc)
    }

    /// 获取图像的物理句柄
    #[inline]
    pub fn image(&self, handle: RgImageHandle) -> Option<vk::Image> {
        self.resources.image(handle).and_then(|res| res.physical)
    }

    #[inline]
    pub fn image_desc(&self, handle: RgImageHandle) -> Option<&RgImageDesc> {
        self.resources.image(handle).map(|res| &res.desc)
    }

    /// 图像（或子视图）当前的 layout
    pub fn image_layout(&self, handle: RgImageHandle) -> vk::ImageLayout {
        let Some(res) = self.resources.image(handle) else {
            return vk::ImageLayout::UNDEFINED;
        };
        match handle.subview.and_then(|subview| res.subviews.get(subview as usize)) {
            Some(extra) => extra.layout,
            None => res.current_layout,
        }
    }

    /// 句柄对应的 subresource range（子视图只覆盖它自己的范围）
    pub fn subresource_range(&self, handle: RgImageHandle) -> Option<vk::ImageSubresourceRange> {
        self.resources.image(handle).map(|res| res.subresource_range(handle.subview))
    }
}

/// RgPass trait
///
/// 定义渲染图中的一个 Pass。
///
/// # 示例
///
/// ```ignore
/// struct BlurPass {
///     input: RgImageHandle,
///     output: RgImageHandle,
/// }
///
/// impl RgPass for BlurPass {
///     fn setup(&mut self, graph: &mut RenderGraph<'_>) {
///         self.input = graph.read_image(self.input, RgAccessFlags::COMPUTE | RgAccessFlags::SAMPLED);
///         self.output = graph.write_image(self.output, RgAccessFlags::COMPUTE | RgAccessFlags::STORAGE);
///     }
///
///     fn execute(&self, ctx: &mut RgPassContext<'_>) {
///         let input = ctx.image(self.input);
///         // 录制 dispatch
///     }
/// }
/// ```
pub trait RgPass {
    /// 声明 Pass 的资源访问
    ///
    /// 可以在这里继续添加嵌套的 Pass。
    fn setup(&mut self, graph: &mut RenderGraph<'_>);

    /// 执行 Pass 的渲染逻辑
    fn execute(&self, ctx: &mut RgPassContext<'_>);
}

/// 类型擦除的 Pass 执行器 trait
pub(crate) trait RgPassExecutor {
    fn execute(&self, ctx: &mut RgPassContext<'_>);
}

/// 包装用户 Pass 实现的执行器
pub(crate) struct RgPassExecutorWrapper<P: RgPass> {
    pub pass: P,
}

impl<P: RgPass> RgPassExecutor for RgPassExecutorWrapper<P> {
    fn execute(&self, ctx: &mut RgPassContext<'_>) {
        self.pass.execute(ctx);
    }
}

/// 闭包形式的 Pass：setup 阶段填充的数据 + execute 闭包
pub(crate) struct RgClosureExecutor<D, F> {
    pub data: D,
    pub execute: F,
}

impl<D, F> RgPassExecutor for RgClosureExecutor<D, F>
where
    F: Fn(&D, &mut RgPassContext<'_>),
{
    fn execute(&self, ctx: &mut RgPassContext<'_>) {
        (self.execute)(&self.data, ctx);
    }
}

/// Pass 节点（内部使用）
pub struct RgPassNode<'a> {
    /// Pass 名称
    pub name: String,
    pub flags: RgPassFlags,
    /// 被剔除的 Pass 与 disabled 的 Pass 一样保留位置但不执行
    pub culled: bool,

    pub color_attachments: Vec<(RgImageHandle, RgColorAttachment)>,
    pub depth_attachment: Option<(RgImageHandle, RgDepthAttachment)>,
    pub depth_bias: Option<RgDepthBias>,

    /// 执行前等待的 barrier（索引到编译结果）
    pub wait_barriers: Vec<usize>,
    /// 执行后 signal 的 split barrier
    pub signal_barriers: Vec<usize>,

    /// setup 期间为空
    pub(crate) executor: Option<Box<dyn RgPassExecutor + 'a>>,
}

impl RgPassNode<'_> {
    pub(crate) fn new(name: String, flags: RgPassFlags) -> Self {
        Self {
            name,
            flags,
            culled: false,
            color_attachments: Vec::new(),
            depth_attachment: None,
            depth_bias: None,
            wait_barriers: Vec::new(),
            signal_barriers: Vec::new(),
            executor: None,
        }
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.flags.contains(RgPassFlags::DISABLED)
    }

    /// 是否会在 execute 阶段执行
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.is_disabled() && !self.culled
    }

    #[inline]
    pub fn is_rasterization(&self) -> bool {
        self.flags.contains(RgPassFlags::RASTERIZATION)
    }
}
