//! 资源访问记录
//!
//! 每一次 `read_*` / `write_*` / `split_image` / `merge_image` 调用都会追加一条记录，
//! 编译阶段的依赖分析与 barrier 生成只以这里的记录为输入。

use ash::vk;

use super::resource_handle::{RgBufferHandle, RgImageHandle, RgResourceKey};

/// 访问类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccessType {
    Read,
    Write,
    ReadWrite,
    Split,
    Merge,
}

impl RgAccessType {
    /// 是否会写入资源内容
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// 是否为普通的读写访问（非 split / merge）
    #[inline]
    pub fn is_plain(self) -> bool {
        !matches!(self, Self::Split | Self::Merge)
    }

    /// 合并同一个 pass 对同一资源的两次访问
    fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Read, Self::Read) => Self::Read,
            (Self::Write, Self::Write) => Self::Write,
            _ => Self::ReadWrite,
        }
    }
}

/// 访问记录的公共部分
pub trait RgAccessRecord {
    fn pass(&self) -> usize;
    fn set_pass(&mut self, pass: usize);
    fn ty(&self) -> RgAccessType;
    fn stage(&self) -> vk::PipelineStageFlags2;
    /// 依赖分析使用的资源身份
    fn key(&self) -> RgResourceKey;
    /// 写之前的版本（只对 Write / ReadWrite / merge 主视图有意义）
    fn prev_version(&self) -> u16;

    /// 同一个 pass、同一个资源（含子视图）的相邻记录可以合并
    fn same_target(&self, other: &Self) -> bool;
    fn absorb(&mut self, other: &Self);
}

/// 缓冲区访问记录
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferAccess {
    /// 声明阶段为 pass 的声明顺序，编译后为排序后的位置
    pub pass: usize,
    /// 读：被读取的版本；写：写入后的版本
    pub handle: RgBufferHandle,
    pub prev_version: u16,
    pub ty: RgAccessType,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl RgAccessRecord for RgBufferAccess {
    #[inline]
    fn pass(&self) -> usize {
        self.pass
    }

    #[inline]
    fn set_pass(&mut self, pass: usize) {
        self.pass = pass;
    }

    #[inline]
    fn ty(&self) -> RgAccessType {
        self.ty
    }

    #[inline]
    fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    #[inline]
    fn key(&self) -> RgResourceKey {
        self.handle.key()
    }

    #[inline]
    fn prev_version(&self) -> u16 {
        self.prev_version
    }

    fn same_target(&self, other: &Self) -> bool {
        self.pass == other.pass && self.handle.index == other.handle.index
    }

    fn absorb(&mut self, other: &Self) {
        if other.ty.is_write() {
            self.handle = other.handle;
        }
        self.ty = self.ty.combine(other.ty);
        self.stage |= other.stage;
        self.access |= other.access;
    }
}

/// 图像访问记录
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageAccess {
    pub pass: usize,
    pub handle: RgImageHandle,
    pub prev_version: u16,
    pub ty: RgAccessType,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl RgAccessRecord for RgImageAccess {
    #[inline]
    fn pass(&self) -> usize {
        self.pass
    }

    #[inline]
    fn set_pass(&mut self, pass: usize) {
        self.pass = pass;
    }

    #[inline]
    fn ty(&self) -> RgAccessType {
        self.ty
    }

    #[inline]
    fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    #[inline]
    fn key(&self) -> RgResourceKey {
        self.handle.key()
    }

    #[inline]
    fn prev_version(&self) -> u16 {
        self.prev_version
    }

    fn same_target(&self, other: &Self) -> bool {
        self.pass == other.pass
            && self.handle.index == other.handle.index
            && self.handle.subview == other.handle.subview
            && self.ty.is_plain()
            && other.ty.is_plain()
    }

    fn absorb(&mut self, other: &Self) {
        if other.ty.is_write() {
            self.handle = other.handle;
        }
        self.ty = self.ty.combine(other.ty);
        self.stage |= other.stage;
        self.access |= other.access;
    }
}

/// 追加式的访问记录表
#[derive(Clone, Debug)]
pub struct RgAccessLog<T> {
    records: Vec<T>,
}

impl<T> Default for RgAccessLog<T> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<T: RgAccessRecord + Copy> RgAccessLog<T> {
    #[inline]
    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    #[inline]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// 把声明顺序的 pass 索引重映射为排序后的位置
    ///
    /// `new_index[old] = new`。按新的 pass 位置稳定排序，同一 pass 内的记录按资源聚集，
    /// 同一资源的记录保持声明顺序。
    pub fn remap_passes(&mut self, new_index: &[usize], resource_of: impl Fn(&T) -> u32) {
        for record in &mut self.records {
            let pass = new_index[record.pass()];
            record.set_pass(pass);
        }
        self.records.sort_by_key(|record| (record.pass(), resource_of(record)));
    }

    /// 合并相邻的、同一 pass 对同一资源的记录
    ///
    /// 合并后的 stage / access 取并集；只要有写，句柄取写之后的版本。
    pub fn merge_adjacent(&mut self) {
        let mut merged: Vec<T> = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            match merged.last_mut() {
                Some(last) if last.same_target(&record) => last.absorb(&record),
                _ => merged.push(record),
            }
        }
        self.records = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::resource_handle::RgHandleFlags;

    fn buffer_access(pass: usize, version: u16, ty: RgAccessType, stage: vk::PipelineStageFlags2) -> RgBufferAccess {
        let handle = RgBufferHandle::new(0, RgHandleFlags::empty()).with_version(version);
        let prev_version = if ty.is_write() { version - 1 } else { version };
        RgBufferAccess { pass, handle, prev_version, ty, stage, access: vk::AccessFlags2::NONE }
    }

    #[test]
    fn test_remap_is_stable() {
        let mut log = RgAccessLog::default();
        log.push(buffer_access(0, 1, RgAccessType::Write, vk::PipelineStageFlags2::COPY));
        log.push(buffer_access(1, 1, RgAccessType::Read, vk::PipelineStageFlags2::VERTEX_SHADER));
        log.push(buffer_access(1, 1, RgAccessType::Read, vk::PipelineStageFlags2::FRAGMENT_SHADER));

        // pass 1 排到最前
        log.remap_passes(&[1, 0], |record| record.handle.index);
        let passes: Vec<_> = log.records().iter().map(|r| r.pass).collect();
        assert_eq!(passes, vec![0, 0, 1]);
        assert_eq!(log.records()[0].stage, vk::PipelineStageFlags2::VERTEX_SHADER);
        assert_eq!(log.records()[1].stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }

    #[test]
    fn test_merge_two_writes_in_one_pass() {
        let mut log = RgAccessLog::default();
        log.push(buffer_access(0, 1, RgAccessType::Write, vk::PipelineStageFlags2::COPY));
        log.push(buffer_access(0, 2, RgAccessType::Write, vk::PipelineStageFlags2::COMPUTE_SHADER));
        log.push(buffer_access(1, 2, RgAccessType::Read, vk::PipelineStageFlags2::VERTEX_SHADER));
        log.merge_adjacent();

        assert_eq!(log.len(), 2);
        let merged = log.records()[0];
        assert_eq!(merged.ty, RgAccessType::Write);
        assert_eq!(merged.handle.version(), 2);
        assert_eq!(merged.prev_version, 0);
        assert_eq!(merged.stage, vk::PipelineStageFlags2::COPY | vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn test_read_then_write_becomes_read_write() {
        let mut log = RgAccessLog::default();
        log.push(buffer_access(0, 0, RgAccessType::Read, vk::PipelineStageFlags2::COMPUTE_SHADER));
        log.push(buffer_access(0, 1, RgAccessType::Write, vk::PipelineStageFlags2::COMPUTE_SHADER));
        log.merge_adjacent();

        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].ty, RgAccessType::ReadWrite);
        assert_eq!(log.records()[0].handle.version(), 1);
    }
}
