//! 跨帧的物理资源池
//!
//! 池子是唯一会创建 / 销毁物理资源的地方。每一帧内，生命周期区间互不重叠且描述兼容的
//! 虚拟资源共享同一个物理资源（别名）；跨帧时，资源闲置满 `buffered_frame_count` 帧后
//! 才能复用，闲置超过 `max_unused_frames` 帧后销毁。

use ash::vk;
use slotmap::SlotMap;

use super::buffer_resource::RgBufferDesc;
use super::config::RgPoolConfig;
use super::device::RgDevice;
use super::image_resource::RgImageDesc;

slotmap::new_key_type! {
    /// 资源池条目的 key
    pub struct RgPoolKey;
}

/// 描述的兼容性判定
pub trait RgPoolDesc: Clone {
    fn is_compatible(&self, other: &Self) -> bool;
}

impl RgPoolDesc for RgBufferDesc {
    #[inline]
    fn is_compatible(&self, other: &Self) -> bool {
        RgBufferDesc::is_compatible(self, other)
    }
}

impl RgPoolDesc for RgImageDesc {
    #[inline]
    fn is_compatible(&self, other: &Self) -> bool {
        RgImageDesc::is_compatible(self, other)
    }
}

/// 申请资源的虚拟资源
#[derive(Clone, Debug)]
pub struct RgPoolOwner {
    /// 虚拟资源在本帧 registry 中的索引
    pub index: u32,
    pub name: String,
    pub volatile: bool,
}

/// 被复用的物理资源之前的主人
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPoolDonor {
    pub name: String,
    /// 同一帧内的别名：donor 在本帧 registry 中的索引
    pub same_frame_index: Option<u32>,
}

/// 分配结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPoolAllocation<P> {
    pub physical: P,
    pub key: RgPoolKey,
    /// 为空表示新创建的资源
    pub donor: Option<RgPoolDonor>,
}

struct RgPoolEntry<P, D> {
    physical: P,
    desc: D,
    /// 最近一次绑定的主人
    owner: Option<RgPoolOwner>,
    /// 本帧绑定过的所有区间 `[first, last]`
    intervals: Vec<(usize, usize)>,
    /// 本帧是否有 volatile 的主人
    volatile: bool,
    unused_frames: u32,
}

impl<P, D> RgPoolEntry<P, D> {
    fn overlaps(&self, first: usize, last: usize) -> bool {
        self.intervals.iter().any(|&(a, b)| first <= b && a <= last)
    }
}

/// 同一类物理资源的条目集合
struct RgPoolSlots<P, D> {
    entries: SlotMap<RgPoolKey, RgPoolEntry<P, D>>,
}

impl<P, D> Default for RgPoolSlots<P, D> {
    fn default() -> Self {
        Self { entries: SlotMap::with_key() }
    }
}

impl<P: Copy + PartialEq, D: RgPoolDesc> RgPoolSlots<P, D> {
    fn allocate(
        &mut self,
        config: &RgPoolConfig,
        owner: RgPoolOwner,
        desc: &D,
        interval: (usize, usize),
        create: impl FnOnce(&D) -> P,
    ) -> RgPoolAllocation<P> {
        let (first, last) = interval;

        if !owner.volatile {
            let candidate = self.entries.iter().find_map(|(key, entry)| {
                let bound_this_frame = !entry.intervals.is_empty();
                let usable = if bound_this_frame {
                    !entry.volatile && !entry.overlaps(first, last)
                } else {
                    entry.unused_frames >= config.buffered_frame_count
                        && !entry.owner.as_ref().is_some_and(|prev| prev.volatile)
                };
                (usable && entry.desc.is_compatible(desc)).then_some(key)
            });

            if let Some(key) = candidate {
                let entry = &mut self.entries[key];
                let same_frame = !entry.intervals.is_empty();
                let donor = entry.owner.take().map(|prev| RgPoolDonor {
                    name: prev.name,
                    same_frame_index: same_frame.then_some(prev.index),
                });
                entry.intervals.push(interval);
                entry.unused_frames = 0;
                entry.owner = Some(owner);
                log::trace!("resource pool: reuse entry {:?}", key);
                return RgPoolAllocation { physical: entry.physical, key, donor };
            }
        }

        let physical = create(desc);
        let key = self.entries.insert(RgPoolEntry {
            physical,
            desc: desc.clone(),
            volatile: owner.volatile,
            owner: Some(owner),
            intervals: vec![interval],
            unused_frames: 0,
        });
        log::trace!("resource pool: create entry {:?}", key);
        RgPoolAllocation { physical, key, donor: None }
    }

    fn detach(&mut self, physical: P) -> bool {
        let key = self.entries.iter().find(|(_, entry)| entry.physical == physical).map(|(key, _)| key);
        match key {
            Some(key) => {
                self.entries.remove(key);
                true
            }
            None => false,
        }
    }

    fn on_frame_end(&mut self, config: &RgPoolConfig, mut destroy: impl FnMut(P)) {
        for (_, entry) in self.entries.iter_mut() {
            entry.unused_frames += 1;
            entry.intervals.clear();
            entry.volatile = false;
        }

        self.entries.retain(|_, entry| {
            let keep = entry.unused_frames <= config.max_unused_frames;
            if !keep {
                destroy(entry.physical);
            }
            keep
        });
    }

    fn destroy_all(&mut self, mut destroy: impl FnMut(P)) {
        for (_, entry) in self.entries.drain() {
            destroy(entry.physical);
        }
    }
}

/// 资源池
///
/// 可以被多个 RenderGraph（例如不同的 frame in flight）共享，但同一时间只能有一个
/// RenderGraph 在编译。
pub struct RgResourcePool {
    config: RgPoolConfig,
    buffers: RgPoolSlots<vk::Buffer, RgBufferDesc>,
    images: RgPoolSlots<vk::Image, RgImageDesc>,
}

// new & init
impl RgResourcePool {
    pub fn new(config: RgPoolConfig) -> Self {
        Self { config, buffers: RgPoolSlots::default(), images: RgPoolSlots::default() }
    }
}

impl Default for RgResourcePool {
    fn default() -> Self {
        Self::new(RgPoolConfig::default())
    }
}

// getters
impl RgResourcePool {
    #[inline]
    pub fn config(&self) -> &RgPoolConfig {
        &self.config
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.entries.len()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.entries.len()
    }
}

// allocate
impl RgResourcePool {
    /// 为 `[first, last]` 区间内使用的缓冲区分配物理资源
    pub fn allocate_buffer(
        &mut self,
        device: &mut dyn RgDevice,
        owner: RgPoolOwner,
        desc: &RgBufferDesc,
        interval: (usize, usize),
    ) -> RgPoolAllocation<vk::Buffer> {
        self.buffers.allocate(&self.config, owner, desc, interval, |desc| device.create_buffer(desc))
    }

    /// 为 `[first, last]` 区间内使用的图像分配物理资源
    pub fn allocate_image(
        &mut self,
        device: &mut dyn RgDevice,
        owner: RgPoolOwner,
        desc: &RgImageDesc,
        interval: (usize, usize),
    ) -> RgPoolAllocation<vk::Image> {
        self.images.allocate(&self.config, owner, desc, interval, |desc| device.create_image(desc))
    }

    /// 把物理资源的所有权交给外部（导出的资源被 claim 之后）
    ///
    /// 返回 false 表示该资源不属于资源池。
    pub fn detach_buffer(&mut self, buffer: vk::Buffer) -> bool {
        self.buffers.detach(buffer)
    }

    pub fn detach_image(&mut self, image: vk::Image) -> bool {
        self.images.detach(image)
    }
}

// frame
impl RgResourcePool {
    /// 帧结束：所有条目闲置计数 +1，清空本帧的绑定，并销毁闲置过久的资源
    pub fn on_frame_end(&mut self, device: &mut dyn RgDevice) {
        self.buffers.on_frame_end(&self.config, |buffer| device.destroy_buffer(buffer));
        self.images.on_frame_end(&self.config, |image| device.destroy_image(image));
        log::debug!("resource pool: {} buffers, {} images after frame end", self.buffer_count(), self.image_count());
    }

    /// 销毁所有资源
    pub fn destroy_all(&mut self, device: &mut dyn RgDevice) {
        self.buffers.destroy_all(|buffer| device.destroy_buffer(buffer));
        self.images.destroy_all(|image| device.destroy_image(image));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::test_utils::MockDevice;

    fn owner(index: u32) -> RgPoolOwner {
        RgPoolOwner { index, name: format!("res{index}"), volatile: false }
    }

    fn desc() -> RgImageDesc {
        RgImageDesc::new_2d(256, 256, vk::Format::R8G8B8A8_UNORM).with_usage(vk::ImageUsageFlags::SAMPLED)
    }

    #[test]
    fn test_disjoint_intervals_alias() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let a = pool.allocate_image(&mut device, owner(0), &desc(), (0, 1));
        let b = pool.allocate_image(&mut device, owner(1), &desc(), (2, 3));

        assert_eq!(a.physical, b.physical);
        assert_eq!(b.donor, Some(RgPoolDonor { name: "res0".into(), same_frame_index: Some(0) }));
        assert_eq!(device.created_images(), 1);
    }

    #[test]
    fn test_overlapping_intervals_never_alias() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let a = pool.allocate_image(&mut device, owner(0), &desc(), (0, 2));
        let b = pool.allocate_image(&mut device, owner(1), &desc(), (2, 3));
        // 与 b 重叠，与 a 不重叠
        let c = pool.allocate_image(&mut device, owner(2), &desc(), (3, 4));

        assert_ne!(a.physical, b.physical);
        assert_ne!(b.physical, c.physical);
        assert_eq!(a.physical, c.physical);
        assert_eq!(device.created_images(), 2);
    }

    #[test]
    fn test_second_interval_on_same_entry() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let a = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0));
        let b = pool.allocate_image(&mut device, owner(1), &desc(), (1, 1));
        // 与 b 的区间重叠
        let c = pool.allocate_image(&mut device, owner(2), &desc(), (0, 1));

        assert_eq!(a.physical, b.physical);
        assert_ne!(a.physical, c.physical);
    }

    #[test]
    fn test_incompatible_desc() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let a = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0));
        let other = desc().with_mip_levels(2);
        let b = pool.allocate_image(&mut device, owner(1), &other, (1, 1));

        assert_ne!(a.physical, b.physical);
    }

    #[test]
    fn test_volatile_is_never_shared() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let volatile = RgPoolOwner { index: 0, name: "history".into(), volatile: true };
        let a = pool.allocate_buffer(&mut device, volatile, &RgBufferDesc::new(64, vk::BufferUsageFlags::empty()), (0, 0));
        let b = pool.allocate_buffer(&mut device, owner(1), &RgBufferDesc::new(64, vk::BufferUsageFlags::empty()), (1, 1));

        assert_ne!(a.physical, b.physical);
    }

    #[test]
    fn test_cross_frame_reuse_waits_for_buffered_frames() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::new(RgPoolConfig { buffered_frame_count: 2, max_unused_frames: 4 });

        let first = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0)).physical;
        pool.on_frame_end(&mut device);

        // 只闲置了 1 帧
        let second = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0)).physical;
        assert_ne!(first, second);
        pool.on_frame_end(&mut device);

        // first 闲置了 2 帧
        let third = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0));
        assert_eq!(third.physical, first);
        assert_eq!(third.donor.and_then(|donor| donor.same_frame_index), None);
    }

    #[test]
    fn test_eviction() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::new(RgPoolConfig { buffered_frame_count: 1, max_unused_frames: 2 });

        pool.allocate_image(&mut device, owner(0), &desc(), (0, 0));
        for _ in 0..2 {
            pool.on_frame_end(&mut device);
        }
        assert_eq!(pool.image_count(), 1);

        pool.on_frame_end(&mut device);
        assert_eq!(pool.image_count(), 0);
        assert_eq!(device.destroyed_images(), 1);
    }

    #[test]
    fn test_detach() {
        let mut device = MockDevice::default();
        let mut pool = RgResourcePool::default();

        let a = pool.allocate_image(&mut device, owner(0), &desc(), (0, 0));
        assert!(pool.detach_image(a.physical));
        assert!(!pool.detach_image(a.physical));
        assert_eq!(pool.image_count(), 0);

        pool.destroy_all(&mut device);
        assert_eq!(device.destroyed_images(), 0);
    }
}
