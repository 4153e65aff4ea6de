//! 资源状态定义
//!
//! 封装 Vulkan 的 pipeline stage、access mask 和 image layout，
//! 提供预定义的常用状态组合，以及根据访问推断 image layout 的规则。

use ash::vk;

/// 所有写操作的 access flags
pub(crate) const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
);

/// access 中是否包含写操作
#[inline]
pub fn is_write_access(access: vk::AccessFlags2) -> bool {
    access.intersects(WRITE_ACCESS)
}

/// 图像资源状态
///
/// barrier 的一端：stage、access 以及 layout。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for RgImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 呈现（swapchain image）
    pub const PRESENT: Self =
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR);

    /// 检查是否为写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        is_write_access(self.access)
    }

    /// 获取用于 barrier src 的 access（去掉读操作）
    ///
    /// 只读的 access 作为 src 没有意义，可见性只需要写入方提供。
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & WRITE_ACCESS
    }
}

/// 是否为深度（或深度模板）格式
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// 从格式推断 aspect
pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 根据一次访问推断图像需要处于的 layout
///
/// 规则按优先级：
/// 1. transfer 读写 -> `TRANSFER_SRC` / `TRANSFER_DST`
/// 2. compute stage 的写，或任何 storage 访问 -> `GENERAL`
/// 3. color / depth attachment 写 -> 对应的 attachment layout
/// 4. 其他写 -> `GENERAL`
/// 5. 只读的 color attachment（load 但不 store）-> `COLOR_ATTACHMENT`
/// 6. 只读：深度格式 -> `DEPTH_STENCIL_READ_ONLY`，否则 `SHADER_READ_ONLY`
pub fn infer_image_layout(
    stage: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
    format: vk::Format,
) -> vk::ImageLayout {
    let is_write = is_write_access(access);

    if access.contains(vk::AccessFlags2::TRANSFER_WRITE) {
        return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    }
    if access.contains(vk::AccessFlags2::TRANSFER_READ) && !is_write {
        return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    }
    if is_write && stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER) {
        return vk::ImageLayout::GENERAL;
    }
    if access.intersects(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE) {
        return vk::ImageLayout::GENERAL;
    }
    if access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE) {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }
    if access.contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE) {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if is_write {
        return vk::ImageLayout::GENERAL;
    }
    if access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_READ) {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }

    if is_depth_format(format) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }
}
