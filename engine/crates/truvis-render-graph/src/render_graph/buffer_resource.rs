use ash::vk;

/// 缓冲区资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途
    ///
    /// 编译时会与各个访问推断出的 usage 取并集。
    pub usage: vk::BufferUsageFlags,
}

impl Default for RgBufferDesc {
    fn default() -> Self {
        Self { size: 0, usage: vk::BufferUsageFlags::empty() }
    }
}

// new & init
impl RgBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }

    /// 描述是否可以用于创建物理资源
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.size > 0
    }

    /// 资源池复用判定：大小与 usage 完全一致
    #[inline]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.size == other.size && self.usage == other.usage
    }
}

/// 缓冲区资源的来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RgBufferSource {
    /// 从外部导入的缓冲区
    Imported { buffer: vk::Buffer },
    /// 由 RenderGraph 通过资源池分配的临时缓冲区
    Transient,
}

/// 缓冲区资源条目
#[derive(Clone, Debug)]
pub struct RgBufferResource {
    /// 调试名称
    pub name: String,
    pub desc: RgBufferDesc,
    pub source: RgBufferSource,
    /// 当前最新版本
    pub version: u16,
    /// 不参与别名
    pub volatile: bool,

    /// 编译阶段计算的生命周期（排序后的 pass 索引）
    pub first_access: Option<usize>,
    pub last_access: Option<usize>,
    /// 由访问推断出的 usage
    pub required_usage: vk::BufferUsageFlags,

    /// 绑定的物理资源
    pub physical: Option<vk::Buffer>,
    /// 别名来源（调试用）
    pub aliased_from: Option<String>,

    pub exported: bool,
    pub claimed: bool,
}

// new & init
impl RgBufferResource {
    /// 创建导入的缓冲区资源
    pub fn imported(name: impl Into<String>, buffer: vk::Buffer, desc: RgBufferDesc) -> Self {
        let mut res = Self::transient(name, desc);
        res.source = RgBufferSource::Imported { buffer };
        res.physical = Some(buffer);
        res
    }

    /// 创建临时缓冲区资源
    pub fn transient(name: impl Into<String>, desc: RgBufferDesc) -> Self {
        Self {
            name: name.into(),
            desc,
            source: RgBufferSource::Transient,
            version: 0,
            volatile: false,
            first_access: None,
            last_access: None,
            required_usage: vk::BufferUsageFlags::empty(),
            physical: None,
            aliased_from: None,
            exported: false,
            claimed: false,
        }
    }
}

// getter
impl RgBufferResource {
    #[inline]
    pub fn is_imported(&self) -> bool {
        matches!(self.source, RgBufferSource::Imported { .. })
    }

    /// 物理资源创建时使用的最终描述
    pub fn physical_desc(&self) -> RgBufferDesc {
        RgBufferDesc { size: self.desc.size, usage: self.desc.usage | self.required_usage }
    }

    /// 是否还需要资源池分配物理资源
    #[inline]
    pub fn needs_allocation(&self) -> bool {
        self.physical.is_none() && !self.is_imported()
    }
}
