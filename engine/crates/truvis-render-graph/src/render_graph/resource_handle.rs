//! RenderGraph 资源句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与物理资源（`vk::Buffer` / `vk::Image`）分离。
//! 每个句柄包含版本号，用于跟踪资源在 Pass 之间的状态变化：
//! 写操作返回版本号 +1 的新句柄，读操作不改变版本。

use std::fmt;

bitflags::bitflags! {
    /// 句柄标记
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RgHandleFlags: u8 {
        /// 外部导入的资源，永远不会参与别名
        const IMPORTED = 1 << 0;
        /// 不参与别名（包括跨帧）
        const VOLATILE = 1 << 1;
        /// 指向 split 出来的子视图
        const SPLIT = 1 << 2;
        /// merge 之后重新合并的句柄
        const MERGE = 1 << 3;
        /// 访问时自动使用资源的最新版本
        ///
        /// 适用于贯穿很多 Pass 又不方便显式串联句柄的资源，例如 backbuffer。
        const AUTO_UPDATE = 1 << 4;
    }
}

/// 资源类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RgResourceKind {
    Buffer,
    Image,
}

/// 资源标识（不带版本）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RgResourceId {
    pub kind: RgResourceKind,
    pub index: u32,
}

impl fmt::Display for RgResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RgResourceKind::Buffer => write!(f, "buffer#{}", self.index),
            RgResourceKind::Image => write!(f, "image#{}", self.index),
        }
    }
}

/// 依赖分析使用的资源身份：`{kind, index, subview, version}`
///
/// 同一个 key 最多只能有一个 producer。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RgResourceKey {
    pub kind: RgResourceKind,
    pub index: u32,
    pub subview: Option<u8>,
    pub version: u16,
}

/// Graph 内部的 Buffer 句柄
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RgBufferHandle {
    /// 资源在 ResourceRegistry 中的索引
    pub(crate) index: u32,
    /// 版本号，每次写操作后递增
    pub(crate) version: u16,
    pub(crate) flags: RgHandleFlags,
}

impl Default for RgBufferHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl RgBufferHandle {
    pub const INVALID: Self = Self { index: u32::MAX, version: 0, flags: RgHandleFlags::empty() };

    #[inline]
    pub(crate) fn new(index: u32, flags: RgHandleFlags) -> Self {
        Self { index, version: 0, flags }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn flags(&self) -> RgHandleFlags {
        self.flags
    }

    /// 标记为自动更新版本（链式调用）
    #[inline]
    pub fn auto_update(mut self) -> Self {
        self.flags |= RgHandleFlags::AUTO_UPDATE;
        self
    }

    #[inline]
    pub(crate) fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// 创建下一个版本的句柄（写操作后使用）
    #[inline]
    pub(crate) fn next_version(&self) -> Self {
        self.with_version(self.version.wrapping_add(1))
    }

    #[inline]
    pub fn id(&self) -> RgResourceId {
        RgResourceId { kind: RgResourceKind::Buffer, index: self.index }
    }

    #[inline]
    pub(crate) fn key(&self) -> RgResourceKey {
        RgResourceKey { kind: RgResourceKind::Buffer, index: self.index, subview: None, version: self.version }
    }
}

impl fmt::Debug for RgBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "RgBuffer(invalid)");
        }
        write!(f, "RgBuffer({}.v{})", self.index, self.version)
    }
}

/// Graph 内部的 Image 句柄
///
/// `subview` 不为空时表示 split 出来的子视图，子视图有独立的版本号。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RgImageHandle {
    pub(crate) index: u32,
    pub(crate) version: u16,
    pub(crate) subview: Option<u8>,
    pub(crate) flags: RgHandleFlags,
}

impl Default for RgImageHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl RgImageHandle {
    pub const INVALID: Self = Self { index: u32::MAX, version: 0, subview: None, flags: RgHandleFlags::empty() };

    #[inline]
    pub(crate) fn new(index: u32, flags: RgHandleFlags) -> Self {
        Self { index, version: 0, subview: None, flags }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn subview(&self) -> Option<u8> {
        self.subview
    }

    #[inline]
    pub fn flags(&self) -> RgHandleFlags {
        self.flags
    }

    /// 是否为 split 子视图
    #[inline]
    pub fn is_split(&self) -> bool {
        self.subview.is_some()
    }

    /// 标记为自动更新版本（链式调用）
    #[inline]
    pub fn auto_update(mut self) -> Self {
        self.flags |= RgHandleFlags::AUTO_UPDATE;
        self
    }

    #[inline]
    pub(crate) fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    #[inline]
    pub(crate) fn next_version(&self) -> Self {
        self.with_version(self.version.wrapping_add(1))
    }

    /// 对应的主视图句柄
    #[inline]
    pub(crate) fn main(&self) -> Self {
        Self {
            index: self.index,
            version: self.version,
            subview: None,
            flags: self.flags - RgHandleFlags::SPLIT,
        }
    }

    #[inline]
    pub fn id(&self) -> RgResourceId {
        RgResourceId { kind: RgResourceKind::Image, index: self.index }
    }

    #[inline]
    pub(crate) fn key(&self) -> RgResourceKey {
        RgResourceKey { kind: RgResourceKind::Image, index: self.index, subview: self.subview, version: self.version }
    }
}

impl fmt::Debug for RgImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "RgImage(invalid)");
        }
        match self.subview {
            Some(subview) => write!(f, "RgImage({}/{}.v{})", self.index, subview, self.version),
            None => write!(f, "RgImage({}.v{})", self.index, self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_keeps_identity() {
        let handle = RgImageHandle::new(3, RgHandleFlags::empty());
        let next = handle.next_version();
        assert_eq!(next.index(), 3);
        assert_eq!(next.version(), 1);
        assert_ne!(handle, next);
    }

    #[test]
    fn test_invalid_handles() {
        assert!(!RgBufferHandle::INVALID.is_valid());
        assert!(!RgImageHandle::default().is_valid());
        assert!(RgBufferHandle::new(0, RgHandleFlags::empty()).is_valid());
    }

    #[test]
    fn test_main_view_drops_split_flag() {
        let split = RgImageHandle { index: 1, version: 2, subview: Some(0), flags: RgHandleFlags::SPLIT };
        let main = split.main();
        assert_eq!(main.subview(), None);
        assert!(!main.flags().contains(RgHandleFlags::SPLIT));
        assert_eq!(main.version(), 2);
    }
}
