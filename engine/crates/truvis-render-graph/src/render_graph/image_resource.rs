use ash::vk;

use super::resource_state::infer_aspect;

/// 子资源描述
///
/// split 使用它描述子视图覆盖的 mip / layer 范围。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgSubresourceDesc {
    /// 为空时根据格式推断
    pub aspect: vk::ImageAspectFlags,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl RgSubresourceDesc {
    /// 单个 mip 的所有 layer
    pub fn mip(level: u32, layer_count: u32) -> Self {
        Self {
            aspect: vk::ImageAspectFlags::empty(),
            base_mip: level,
            mip_count: 1,
            base_layer: 0,
            layer_count,
        }
    }

    /// 单个 layer 的所有 mip
    pub fn layer(layer: u32, mip_count: u32) -> Self {
        Self {
            aspect: vk::ImageAspectFlags::empty(),
            base_mip: 0,
            mip_count,
            base_layer: layer,
            layer_count: 1,
        }
    }

    pub fn to_range(&self, format: vk::Format) -> vk::ImageSubresourceRange {
        let aspect_mask = if self.aspect.is_empty() { infer_aspect(format) } else { self.aspect };
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: self.base_mip,
            level_count: self.mip_count,
            base_array_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }
}

/// 图像资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgImageDesc {
    pub width: u32,
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    /// 编译时会与各个访问推断出的 usage 取并集
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub image_type: vk::ImageType,
    /// 默认采样过滤方式
    pub filter: vk::Filter,
    /// 物理图像需要额外创建的子视图（split 时追加）
    pub views: Vec<RgSubresourceDesc>,
}

impl Default for RgImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::empty(),
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
            filter: vk::Filter::LINEAR,
            views: Vec::new(),
        }
    }
}

// new & init & builder
impl RgImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self { width, height, format, ..Default::default() }
    }

    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    #[inline]
    pub fn with_filter(mut self, filter: vk::Filter) -> Self {
        self.filter = filter;
        self
    }
}

// tools
impl RgImageDesc {
    /// 描述是否可以用于创建物理资源
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.depth > 0
            && self.mip_levels > 0
            && self.array_layers > 0
            && self.format != vk::Format::UNDEFINED
    }

    /// 资源池复用判定
    ///
    /// 所有尺寸、mip、格式、类型、usage、过滤方式以及完整的子视图列表都必须一致。
    pub fn is_compatible(&self, other: &Self) -> bool {
        self == other
    }

    /// 从参考图像继承属性
    pub fn inherit_from(&mut self, reference: &RgImageDesc, inherit: RgImageInherit) {
        if inherit.contains(RgImageInherit::EXTENT) {
            self.width = reference.width;
            self.height = reference.height;
            self.depth = reference.depth;
        }
        if inherit.contains(RgImageInherit::MIPS) {
            self.mip_levels = reference.mip_levels;
        }
        if inherit.contains(RgImageInherit::LAYERS) {
            self.array_layers = reference.array_layers;
        }
        if inherit.contains(RgImageInherit::FORMAT) {
            self.format = reference.format;
        }
        if inherit.contains(RgImageInherit::SAMPLES) {
            self.samples = reference.samples;
        }
        if inherit.contains(RgImageInherit::KIND) {
            self.image_type = reference.image_type;
        }
        if inherit.contains(RgImageInherit::FILTER) {
            self.filter = reference.filter;
        }
        if inherit.contains(RgImageInherit::USAGE) {
            self.usage |= reference.usage;
        }
    }
}

bitflags::bitflags! {
    /// 从参考图像继承哪些属性
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RgImageInherit: u32 {
        const EXTENT = 1 << 0;
        const MIPS = 1 << 1;
        const LAYERS = 1 << 2;
        const FORMAT = 1 << 3;
        const SAMPLES = 1 << 4;
        const KIND = 1 << 5;
        const FILTER = 1 << 6;
        const USAGE = 1 << 7;
        const ALL = Self::EXTENT.bits()
            | Self::MIPS.bits()
            | Self::LAYERS.bits()
            | Self::FORMAT.bits()
            | Self::SAMPLES.bits()
            | Self::KIND.bits()
            | Self::FILTER.bits()
            | Self::USAGE.bits();
    }
}

/// 延迟到编译阶段的描述推断
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageInference {
    /// 参考图像在 registry 中的索引
    pub reference: u32,
    pub inherit: RgImageInherit,
}

/// 图像资源的来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RgImageSource {
    /// 从外部导入的图像
    Imported { image: vk::Image, initial_layout: vk::ImageLayout },
    /// 由 RenderGraph 通过资源池分配的临时图像
    Transient,
}

/// 图像的 split 状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgImageSplitState {
    /// 只有主视图有效
    Merged,
    /// 存在未 merge 的子视图，主视图不可访问
    Split,
    /// 刚 merge，各子视图的 layout 可能不一致，在下一次访问时再判定
    MaybeDivergent,
}

/// split 出来的子视图
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgSubviewExtra {
    pub desc: RgSubresourceDesc,
    /// 子视图自己的版本号
    pub version: u16,
    /// 子视图当前 layout（执行阶段更新）
    pub layout: vk::ImageLayout,
    /// 是否属于当前这一轮 split
    pub active: bool,
}

/// 图像资源条目
#[derive(Clone, Debug)]
pub struct RgImageResource {
    /// 调试名称
    pub name: String,
    pub desc: RgImageDesc,
    /// 不为空时，`desc` 还需要在编译阶段从参考图像推断
    pub inference: Option<RgImageInference>,
    pub source: RgImageSource,

    /// 主视图当前版本
    pub version: u16,
    /// 主视图与所有子视图中出现过的最大版本
    pub latest_version: u16,
    pub state: RgImageSplitState,
    pub subviews: Vec<RgSubviewExtra>,
    /// 不参与别名
    pub volatile: bool,

    /// 编译阶段计算的生命周期（排序后的 pass 索引）
    pub first_access: Option<usize>,
    pub last_access: Option<usize>,
    /// 由访问推断出的 usage
    pub required_usage: vk::ImageUsageFlags,

    /// 绑定的物理资源
    pub physical: Option<vk::Image>,
    /// 别名来源（调试用）
    pub aliased_from: Option<String>,
    /// 执行阶段跟踪的当前 layout
    pub current_layout: vk::ImageLayout,

    pub exported: bool,
    pub claimed: bool,
}

// new & init
impl RgImageResource {
    /// 创建导入的图像资源
    pub fn imported(name: impl Into<String>, image: vk::Image, desc: RgImageDesc, layout: vk::ImageLayout) -> Self {
        let mut res = Self::transient(name, desc);
        res.source = RgImageSource::Imported { image, initial_layout: layout };
        res.physical = Some(image);
        res.current_layout = layout;
        res
    }

    /// 创建临时图像资源
    pub fn transient(name: impl Into<String>, desc: RgImageDesc) -> Self {
        Self {
            name: name.into(),
            desc,
            inference: None,
            source: RgImageSource::Transient,
            version: 0,
            latest_version: 0,
            state: RgImageSplitState::Merged,
            subviews: Vec::new(),
            volatile: false,
            first_access: None,
            last_access: None,
            required_usage: vk::ImageUsageFlags::empty(),
            physical: None,
            aliased_from: None,
            current_layout: vk::ImageLayout::UNDEFINED,
            exported: false,
            claimed: false,
        }
    }
}

// getters
impl RgImageResource {
    #[inline]
    pub fn is_imported(&self) -> bool {
        matches!(self.source, RgImageSource::Imported { .. })
    }

    /// 帧开始时的 layout
    #[inline]
    pub fn initial_layout(&self) -> vk::ImageLayout {
        match self.source {
            RgImageSource::Imported { initial_layout, .. } => initial_layout,
            RgImageSource::Transient => vk::ImageLayout::UNDEFINED,
        }
    }

    #[inline]
    pub fn infer_aspect(&self) -> vk::ImageAspectFlags {
        infer_aspect(self.desc.format)
    }

    /// 物理资源创建时使用的最终描述
    pub fn physical_desc(&self) -> RgImageDesc {
        let mut desc = self.desc.clone();
        desc.usage |= self.required_usage;
        desc
    }

    #[inline]
    pub fn needs_allocation(&self) -> bool {
        self.physical.is_none() && !self.is_imported()
    }

    /// 子视图对应的 subresource range
    pub fn subresource_range(&self, subview: Option<u8>) -> vk::ImageSubresourceRange {
        match subview.and_then(|s| self.subviews.get(s as usize)) {
            Some(extra) => extra.desc.to_range(self.desc.format),
            None => vk::ImageSubresourceRange {
                aspect_mask: self.infer_aspect(),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        }
    }
}
