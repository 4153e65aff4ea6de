//! RenderGraph 编译
//!
//! 1. 解析需要推断的图像描述
//! 2. 由访问记录构建依赖图，拓扑排序（可选按深度重新分桶）
//! 3. 剔除输出无人使用的 Pass
//! 4. 按执行顺序重排 Pass 与访问记录，合并同一 Pass 对同一资源的访问
//! 5. 校验访问，无法解析的 Pass 被 disable
//! 6. 计算生命周期，从资源池分配物理资源（别名）
//! 7. 按执行顺序模拟资源状态，生成 barrier
//! 8. 通知 watcher

use ash::vk;

use super::access_log::{RgAccessRecord, RgAccessType};
use super::barrier::{RgBarrier, RgBarrierPlacement, RgDependencyKind};
use super::device::RgDevice;
use super::error::RgCompileError;
use super::graph::{DependencyGraph, RgDependencyEvent, RgDependencyRole, RgProducerConflict};
use super::image_resource::{RgImageSplitState, RgSubresourceDesc};
use super::pass::RgPassFlags;
use super::render_graph::RenderGraph;
use super::resource_handle::{RgResourceId, RgResourceKey, RgResourceKind};
use super::resource_pool::{RgPoolOwner, RgResourcePool};
use super::resource_state::{RgImageState, WRITE_ACCESS, infer_image_layout};
use super::watcher::RgPassInfo;

/// 某个 Pass 对资源的一次访问
#[derive(Clone, Copy, Debug)]
struct RgTrackedAccess {
    pass: usize,
    stage: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
}

/// 模拟执行时单个资源（或子视图）的状态
#[derive(Clone, Debug)]
struct RgAccessTracker {
    layout: vk::ImageLayout,
    /// 尚未被任何 barrier 同步过的写
    last_write: Option<RgTrackedAccess>,
    /// 上一次写（或 layout 转换）之后的读
    reads: Vec<RgTrackedAccess>,
}

/// 尚未决定放置方式的 barrier
struct RgHazard {
    dependency: RgDependencyKind,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    producer: Option<usize>,
}

impl RgAccessTracker {
    fn new(layout: vk::ImageLayout) -> Self {
        Self { layout, last_write: None, reads: Vec::new() }
    }

    /// 多个子视图状态的并集
    fn union<'t>(trackers: impl IntoIterator<Item = &'t RgAccessTracker>) -> Option<Self> {
        let mut result: Option<Self> = None;
        for tracker in trackers {
            let merged = result.get_or_insert_with(|| Self::new(tracker.layout));
            if let Some(write) = tracker.last_write {
                merged.last_write = Some(match merged.last_write {
                    Some(prev) => RgTrackedAccess {
                        pass: prev.pass.max(write.pass),
                        stage: prev.stage | write.stage,
                        access: prev.access | write.access,
                    },
                    None => write,
                });
            }
            merged.reads.extend(tracker.reads.iter().copied());
        }
        result
    }

    /// 记录一次访问，返回它与之前访问之间的冲突
    ///
    /// 同一个 Pass 内的访问之间不产生 barrier；layout 转换本身不算写。
    fn track(
        &mut self,
        pass: usize,
        ty: RgAccessType,
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        desired_layout: Option<vk::ImageLayout>,
    ) -> Option<RgHazard> {
        let prior_write = self.last_write.filter(|write| write.pass != pass);
        let prior_reads: Vec<_> = self.reads.iter().copied().filter(|read| read.pass != pass).collect();
        let old_layout = self.layout;
        let new_layout = desired_layout.unwrap_or(old_layout);

        let mut src_stage = vk::PipelineStageFlags2::NONE;
        let mut src_access = vk::AccessFlags2::NONE;
        let mut producer: Option<usize> = None;
        let wait_reads = |src_stage: &mut vk::PipelineStageFlags2, producer: &mut Option<usize>| {
            for read in &prior_reads {
                *src_stage |= read.stage;
                *producer = Some(producer.map_or(read.pass, |p| p.max(read.pass)));
            }
        };
        let wait_write =
            |src_stage: &mut vk::PipelineStageFlags2, src_access: &mut vk::AccessFlags2, producer: &mut Option<usize>| {
                if let Some(write) = prior_write {
                    *src_stage |= write.stage;
                    *src_access |= write.access & WRITE_ACCESS;
                    *producer = Some(producer.map_or(write.pass, |p| p.max(write.pass)));
                }
            };

        let dependency = if new_layout != old_layout {
            wait_reads(&mut src_stage, &mut producer);
            wait_write(&mut src_stage, &mut src_access, &mut producer);
            Some(RgDependencyKind::Layout)
        } else if ty.is_write() && !prior_reads.is_empty() {
            wait_reads(&mut src_stage, &mut producer);
            if ty == RgAccessType::ReadWrite && prior_write.is_some() {
                wait_write(&mut src_stage, &mut src_access, &mut producer);
                Some(RgDependencyKind::Memory)
            } else {
                Some(RgDependencyKind::Execution)
            }
        } else if prior_write.is_some() {
            // 写之后的写 / 写之后的读
            wait_write(&mut src_stage, &mut src_access, &mut producer);
            Some(RgDependencyKind::Memory)
        } else {
            None
        };

        let current = RgTrackedAccess { pass, stage, access };
        if ty.is_write() {
            self.last_write = Some(current);
            self.reads.clear();
        } else {
            if new_layout != old_layout {
                self.reads.clear();
            }
            // 这次读已经等待过上一次写，之后的读不再与它冲突
            if prior_write.is_some() && dependency.is_some() {
                self.last_write = None;
            }
            self.reads.push(current);
        }
        self.layout = new_layout;

        dependency.map(|dependency| RgHazard { dependency, src_stage, src_access, old_layout, new_layout, producer })
    }
}

/// 模拟执行时图像的状态，包括 split 出来的子视图
struct RgImageTracker {
    main: RgAccessTracker,
    subs: Vec<Option<RgAccessTracker>>,
    state: RgImageSplitState,
    /// 最近一次 merge 的子视图
    merged: Vec<u8>,
}

impl RgImageTracker {
    fn new(main: RgAccessTracker) -> Self {
        Self { main, subs: Vec::new(), state: RgImageSplitState::Merged, merged: Vec::new() }
    }

    /// 整个图像的状态：merge 之后为各子视图的并集
    fn collapsed(&self) -> RgAccessTracker {
        if self.state == RgImageSplitState::MaybeDivergent {
            let subs = self.merged.iter().filter_map(|&s| self.subs.get(s as usize).and_then(Option::as_ref));
            if let Some(union) = RgAccessTracker::union(subs) {
                return union;
            }
        }
        self.main.clone()
    }

    fn sub_mut(&mut self, subview: u8) -> &mut RgAccessTracker {
        let index = subview as usize;
        if self.subs.len() <= index {
            self.subs.resize(index + 1, None);
        }
        if self.subs[index].is_none() {
            // 子视图从整个图像的状态开始
            self.subs[index] = Some(self.collapsed());
        }
        self.subs[index].get_or_insert_with(|| RgAccessTracker::new(vk::ImageLayout::UNDEFINED))
    }

    fn invalidate_subs(&mut self) {
        self.subs.iter_mut().for_each(|sub| *sub = None);
        self.merged.clear();
    }
}

// compile
impl RenderGraph<'_> {
    /// 编译渲染图
    ///
    /// 成功后可以调用 [`Self::execute`]。循环依赖与重复的 producer 会让整帧编译失败；
    /// 无法推断的访问只会让对应的 Pass 被 disable。
    pub fn compile(&mut self, pool: &mut RgResourcePool, device: &mut dyn RgDevice) -> Result<(), RgCompileError> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RenderGraph::compile");

        if self.compiled {
            return Err(RgCompileError::AlreadyCompiled);
        }
        let pass_count = self.passes.len();

        let unresolved = self.resources.resolve_inferred_descs();
        for &index in &unresolved {
            log::error!("image \"{}\": cannot infer its description", self.resources.images()[index as usize].name);
        }

        // 依赖分析
        let events = self.dependency_events();
        let graph = DependencyGraph::build(pass_count, &events).map_err(|conflict| self.conflict_error(conflict))?;
        let mut order = graph
            .topological_sort()
            .map_err(|pass| RgCompileError::CyclicDependency { pass: self.passes[pass].name.clone() })?;
        if self.config.depth_rebucket {
            order = graph.rebucket_by_depth(&order);
        }
        log::debug!("render graph: {} passes, {} dependencies", pass_count, graph.edge_count());

        if self.config.cull_passes {
            self.cull_passes(&graph, &order);
        }
        self.reorder_passes(&order);
        self.validate_accesses(&unresolved);
        self.compute_lifetimes();
        self.check_imported_usage();

        let (buffer_donors, image_donors) = self.allocate_physical(pool, device);
        self.synthesize_buffer_barriers(&buffer_donors);
        self.synthesize_image_barriers(&image_donors);

        self.notify_watcher();
        self.compiled = true;
        Ok(())
    }

    fn conflict_error(&self, conflict: RgProducerConflict) -> RgCompileError {
        let resource = match conflict.key.kind {
            RgResourceKind::Buffer => self.resources.buffers().get(conflict.key.index as usize).map(|r| r.name.clone()),
            RgResourceKind::Image => self.resources.images().get(conflict.key.index as usize).map(|r| r.name.clone()),
        };
        RgCompileError::conflicting(
            resource.unwrap_or_default(),
            conflict.key,
            self.passes[conflict.first_pass].name.clone(),
            self.passes[conflict.second_pass].name.clone(),
        )
    }
}

// 依赖分析
impl RenderGraph<'_> {
    /// 把访问记录转换为依赖事件（声明顺序的 pass 索引）
    fn dependency_events(&self) -> Vec<RgDependencyEvent> {
        fn plain_role(ty: RgAccessType, key: RgResourceKey, prev_version: u16) -> RgDependencyRole {
            if ty.is_write() {
                RgDependencyRole::Produce {
                    prev: Some(RgResourceKey { version: prev_version, ..key }),
                    reads_prev: ty == RgAccessType::ReadWrite,
                }
            } else {
                RgDependencyRole::Consume
            }
        }

        let mut events = Vec::with_capacity(self.buffer_accesses.len() + self.image_accesses.len());
        for record in self.buffer_accesses.records() {
            let key = record.key();
            events.push(RgDependencyEvent {
                pass: record.pass,
                key,
                role: plain_role(record.ty, key, record.prev_version),
            });
        }

        for record in self.image_accesses.records() {
            let key = record.key();
            let role = match (record.ty, record.handle.subview) {
                (RgAccessType::Split, None) => RgDependencyRole::Consume,
                // 子视图的初始版本由 split 生成，读取主视图的内容
                (RgAccessType::Split, Some(_)) => RgDependencyRole::Produce {
                    prev: Some(RgResourceKey { subview: None, version: record.prev_version, ..key }),
                    reads_prev: true,
                },
                (RgAccessType::Merge, Some(_)) => RgDependencyRole::Retire,
                (RgAccessType::Merge, None) => RgDependencyRole::Produce {
                    prev: Some(RgResourceKey { version: record.prev_version, ..key }),
                    reads_prev: false,
                },
                (ty, _) => plain_role(ty, key, record.prev_version),
            };
            events.push(RgDependencyEvent { pass: record.pass, key, role });
        }
        events
    }

    /// 剔除输出无人使用的 `CULLABLE` Pass
    ///
    /// 不可剔除的 Pass，以及访问了导入 / 导出资源或 present 目标的 Pass 作为根。
    fn cull_passes(&mut self, graph: &DependencyGraph, order: &[usize]) {
        let mut roots: Vec<bool> =
            self.passes.iter().map(|pass| !pass.flags.contains(RgPassFlags::CULLABLE)).collect();

        for record in self.buffer_accesses.records() {
            if let Some(res) = self.resources.buffer(record.handle) {
                if res.is_imported() || res.exported {
                    roots[record.pass] = true;
                }
            }
        }
        let present = self.present_target.map(|handle| handle.index);
        for record in self.image_accesses.records() {
            if let Some(res) = self.resources.image(record.handle) {
                if res.is_imported() || res.exported || present == Some(record.handle.index) {
                    roots[record.pass] = true;
                }
            }
        }

        let live = graph.live_passes(order, &roots);
        for (pass, node) in self.passes.iter_mut().enumerate() {
            if !live[pass] {
                log::debug!("pass \"{}\" is culled", node.name);
                node.culled = true;
            }
        }
    }

    /// 按执行顺序重排 Pass，访问记录中的 pass 索引随之重映射
    fn reorder_passes(&mut self, order: &[usize]) {
        let mut new_index = vec![0; order.len()];
        for (position, &pass) in order.iter().enumerate() {
            new_index[pass] = position;
        }

        let mut slots: Vec<_> = std::mem::take(&mut self.passes).into_iter().map(Some).collect();
        self.passes = order.iter().filter_map(|&pass| slots[pass].take()).collect();

        self.buffer_accesses.remap_passes(&new_index, |record| record.handle.index);
        self.buffer_accesses.merge_adjacent();
        self.image_accesses.remap_passes(&new_index, |record| record.handle.index);
        self.image_accesses.merge_adjacent();

        self.execution_order = order.to_vec();
    }
}

// 资源解析
impl RenderGraph<'_> {
    /// 访问无法解析的 Pass 被 disable，而不是让整帧失败
    fn validate_accesses(&mut self, unresolved: &[u32]) {
        let mut invalid: Vec<(usize, String)> = Vec::new();

        for record in self.buffer_accesses.records() {
            let Some(res) = self.resources.buffer(record.handle) else { continue };
            if record.stage.is_empty() {
                invalid.push((record.pass, format!("access to buffer \"{}\" could not be inferred", res.name)));
            } else if res.physical.is_none() && !res.desc.is_valid() {
                invalid.push((record.pass, format!("buffer \"{}\" has an invalid description", res.name)));
            }
        }

        for record in self.image_accesses.records() {
            let Some(res) = self.resources.image(record.handle) else { continue };
            if unresolved.contains(&record.handle.index) {
                invalid.push((record.pass, format!("image \"{}\" has an unresolved description", res.name)));
            } else if record.ty.is_plain() && record.stage.is_empty() {
                invalid.push((record.pass, format!("access to image \"{}\" could not be inferred", res.name)));
            } else if res.physical.is_none() && !res.desc.is_valid() {
                invalid.push((record.pass, format!("image \"{}\" has an invalid description", res.name)));
            }
        }

        for (pass, reason) in invalid {
            let node = &mut self.passes[pass];
            if !node.is_disabled() {
                log::error!("pass \"{}\" is disabled: {}", node.name, reason);
                node.flags |= RgPassFlags::DISABLED;
            }
        }
    }

    /// 生命周期：第一次与最后一次被执行的 Pass 访问的位置
    ///
    /// 导出资源与 present 目标一直存活到帧结束。
    fn compute_lifetimes(&mut self) {
        let last_pass = self.passes.len().saturating_sub(1);

        for record in self.buffer_accesses.records() {
            if !self.passes[record.pass].is_active() {
                continue;
            }
            if let Some(res) = self.resources.buffer_mut(record.handle) {
                res.first_access = Some(res.first_access.map_or(record.pass, |first| first.min(record.pass)));
                res.last_access = Some(res.last_access.map_or(record.pass, |last| last.max(record.pass)));
            }
        }
        for record in self.image_accesses.records() {
            if !self.passes[record.pass].is_active() {
                continue;
            }
            if let Some(res) = self.resources.image_mut(record.handle) {
                res.first_access = Some(res.first_access.map_or(record.pass, |first| first.min(record.pass)));
                res.last_access = Some(res.last_access.map_or(record.pass, |last| last.max(record.pass)));
            }
        }

        for res in self.resources.buffers_mut().iter_mut().filter(|res| res.exported) {
            res.first_access = Some(res.first_access.unwrap_or(0));
            res.last_access = Some(last_pass);
        }
        let present = self.present_target.map(|handle| handle.index as usize);
        for (index, res) in self.resources.images_mut().iter_mut().enumerate() {
            if res.exported || present == Some(index) {
                res.first_access = Some(res.first_access.unwrap_or(0));
                res.last_access = Some(last_pass);
            }
        }
    }

    /// 导入资源的 usage 无法修改，只能警告
    fn check_imported_usage(&self) {
        for res in self.resources.buffers().iter().filter(|res| res.is_imported()) {
            if !res.desc.usage.contains(res.required_usage) {
                log::warn!(
                    "imported buffer \"{}\" is used as {:?} but was created with {:?}",
                    res.name,
                    res.required_usage,
                    res.desc.usage
                );
            }
        }
        for res in self.resources.images().iter().filter(|res| res.is_imported()) {
            if !res.desc.usage.contains(res.required_usage) {
                log::warn!(
                    "imported image \"{}\" is used as {:?} but was created with {:?}",
                    res.name,
                    res.required_usage,
                    res.desc.usage
                );
            }
        }
    }

    /// 为有生命周期的临时资源分配物理资源
    ///
    /// 按第一次访问的顺序分配。返回每个资源在本帧内的别名来源（registry 索引）。
    fn allocate_physical(
        &mut self,
        pool: &mut RgResourcePool,
        device: &mut dyn RgDevice,
    ) -> (Vec<Option<u32>>, Vec<Option<u32>>) {
        let mut buffer_donors = vec![None; self.resources.buffer_count()];
        let mut candidates: Vec<usize> = (0..self.resources.buffer_count())
            .filter(|&index| {
                let res = &self.resources.buffers()[index];
                res.needs_allocation() && res.first_access.is_some() && res.desc.is_valid()
            })
            .collect();
        candidates.sort_by_key(|&index| (self.resources.buffers()[index].first_access, index));

        for index in candidates {
            let res = &self.resources.buffers()[index];
            let owner = RgPoolOwner { index: index as u32, name: res.name.clone(), volatile: res.volatile || res.exported };
            let interval = (res.first_access.unwrap_or(0), res.last_access.unwrap_or(0));
            let allocation = pool.allocate_buffer(device, owner, &res.physical_desc(), interval);

            let res = &mut self.resources.buffers_mut()[index];
            let same_frame = allocation.donor.as_ref().and_then(|donor| donor.same_frame_index);
            match (&allocation.donor, same_frame) {
                (Some(donor), Some(_)) => {
                    device.set_buffer_name(allocation.physical, &format!("{} (aliased from {})", res.name, donor.name));
                }
                _ => device.set_buffer_name(allocation.physical, &res.name),
            }
            res.physical = Some(allocation.physical);
            res.aliased_from = allocation.donor.map(|donor| donor.name);
            buffer_donors[index] = same_frame;
        }

        let mut image_donors = vec![None; self.resources.image_count()];
        let mut candidates: Vec<usize> = (0..self.resources.image_count())
            .filter(|&index| {
                let res = &self.resources.images()[index];
                res.needs_allocation() && res.first_access.is_some() && res.desc.is_valid()
            })
            .collect();
        candidates.sort_by_key(|&index| (self.resources.images()[index].first_access, index));

        for index in candidates {
            let res = &self.resources.images()[index];
            let owner = RgPoolOwner { index: index as u32, name: res.name.clone(), volatile: res.volatile || res.exported };
            let interval = (res.first_access.unwrap_or(0), res.last_access.unwrap_or(0));
            let allocation = pool.allocate_image(device, owner, &res.physical_desc(), interval);

            let res = &mut self.resources.images_mut()[index];
            let same_frame = allocation.donor.as_ref().and_then(|donor| donor.same_frame_index);
            match (&allocation.donor, same_frame) {
                (Some(donor), Some(_)) => {
                    device.set_image_name(allocation.physical, &format!("{} (aliased from {})", res.name, donor.name));
                }
                _ => device.set_image_name(allocation.physical, &res.name),
            }
            res.physical = Some(allocation.physical);
            res.aliased_from = allocation.donor.map(|donor| donor.name);
            image_donors[index] = same_frame;
        }

        (buffer_donors, image_donors)
    }
}

// barrier
impl RenderGraph<'_> {
    /// 记录一个 barrier，并挂到 producer / consumer Pass 上
    fn emit_barrier(
        &mut self,
        hazard: RgHazard,
        resource: RgResourceId,
        subview: Option<(u8, RgSubresourceDesc)>,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
        consumer: usize,
    ) {
        let placement = match hazard.producer {
            Some(producer) if consumer - producer >= self.config.split_barrier_min_distance => {
                RgBarrierPlacement::Split
            }
            _ => RgBarrierPlacement::Immediate,
        };
        let dst_access = if hazard.dependency == RgDependencyKind::Execution { vk::AccessFlags2::NONE } else { dst_access };

        let index = self.barriers.len();
        self.barriers.push(RgBarrier {
            placement,
            dependency: hazard.dependency,
            resource,
            subview: subview.map(|(s, _)| s),
            subresource: subview.map(|(_, desc)| desc),
            src_stage: hazard.src_stage,
            src_access: hazard.src_access,
            dst_stage,
            dst_access,
            old_layout: hazard.old_layout,
            new_layout: hazard.new_layout,
            producer: hazard.producer,
            consumer,
        });

        if let (RgBarrierPlacement::Split, Some(producer)) = (placement, hazard.producer) {
            self.passes[producer].signal_barriers.push(index);
        }
        self.passes[consumer].wait_barriers.push(index);
    }

    fn synthesize_buffer_barriers(&mut self, donors: &[Option<u32>]) {
        let mut trackers: Vec<Option<RgAccessTracker>> = vec![None; self.resources.buffer_count()];

        let records = self.buffer_accesses.records().to_vec();
        for record in records {
            if !self.passes[record.pass].is_active() {
                continue;
            }
            let index = record.handle.index as usize;
            if trackers[index].is_none() {
                // 同一帧内的别名继承上一个主人的状态
                let inherited = donors[index].and_then(|donor| trackers[donor as usize].clone());
                trackers[index] = Some(inherited.unwrap_or_else(|| RgAccessTracker::new(vk::ImageLayout::UNDEFINED)));
            }
            let Some(tracker) = trackers[index].as_mut() else { continue };

            if let Some(hazard) = tracker.track(record.pass, record.ty, record.stage, record.access, None) {
                self.emit_barrier(hazard, record.handle.id(), None, record.stage, record.access, record.pass);
            }
        }
    }

    fn synthesize_image_barriers(&mut self, donors: &[Option<u32>]) {
        let image_count = self.resources.image_count();
        let formats: Vec<vk::Format> = self.resources.images().iter().map(|res| res.desc.format).collect();
        let subview_descs: Vec<Vec<RgSubresourceDesc>> =
            self.resources.images().iter().map(|res| res.subviews.iter().map(|extra| extra.desc).collect()).collect();
        let mut trackers: Vec<Option<RgImageTracker>> = (0..image_count).map(|_| None).collect();

        let records = self.image_accesses.records().to_vec();
        for record in records {
            if !self.passes[record.pass].is_active() {
                continue;
            }
            let index = record.handle.index as usize;
            if trackers[index].is_none() {
                let inherited = donors[index].and_then(|donor| trackers[donor as usize].as_ref().map(|t| t.collapsed()));
                let initial = self.resources.images()[index].initial_layout();
                trackers[index] =
                    Some(RgImageTracker::new(inherited.unwrap_or_else(|| RgAccessTracker::new(initial))));
            }
            let Some(tracker) = trackers[index].as_mut() else { continue };
            let resource = record.handle.id();

            match (record.ty, record.handle.subview) {
                (RgAccessType::Split, None) => {
                    if tracker.state == RgImageSplitState::MaybeDivergent {
                        tracker.main = tracker.collapsed();
                    }
                    tracker.state = RgImageSplitState::Split;
                    tracker.merged.clear();
                }
                (RgAccessType::Split, Some(subview)) => {
                    tracker.sub_mut(subview);
                }
                (RgAccessType::Merge, Some(subview)) => {
                    tracker.merged.push(subview);
                }
                (RgAccessType::Merge, None) => {
                    tracker.state = RgImageSplitState::MaybeDivergent;
                }
                (ty, Some(subview)) => {
                    let desired = infer_image_layout(record.stage, record.access, formats[index]);
                    let hazard = tracker.sub_mut(subview).track(record.pass, ty, record.stage, record.access, Some(desired));
                    if let Some(hazard) = hazard {
                        let desc = subview_descs[index].get(subview as usize).copied().unwrap_or_default();
                        self.emit_barrier(hazard, resource, Some((subview, desc)), record.stage, record.access, record.pass);
                    }
                }
                (ty, None) => {
                    let desired = infer_image_layout(record.stage, record.access, formats[index]);
                    let mut hazards = Vec::new();

                    let subs: Vec<(u8, RgAccessTracker)> = if tracker.state == RgImageSplitState::MaybeDivergent {
                        tracker
                            .merged
                            .iter()
                            .filter_map(|&s| Some((s, tracker.subs.get(s as usize)?.clone()?)))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    let diverged = subs.windows(2).any(|pair| pair[0].1.layout != pair[1].1.layout);

                    if diverged {
                        // 各子视图分别转换到同一个 layout
                        let mut tracked = Vec::with_capacity(subs.len());
                        for (subview, mut sub) in subs {
                            if let Some(hazard) = sub.track(record.pass, ty, record.stage, record.access, Some(desired)) {
                                hazards.push((hazard, Some(subview)));
                            }
                            tracked.push(sub);
                        }
                        if let Some(union) = RgAccessTracker::union(&tracked) {
                            tracker.main = union;
                        }
                    } else {
                        if let Some(union) = RgAccessTracker::union(subs.iter().map(|(_, sub)| sub)) {
                            tracker.main = union;
                        }
                        if let Some(hazard) =
                            tracker.main.track(record.pass, ty, record.stage, record.access, Some(desired))
                        {
                            hazards.push((hazard, None));
                        }
                    }
                    tracker.state = RgImageSplitState::Merged;
                    tracker.invalidate_subs();

                    for (hazard, subview) in hazards {
                        let subview = subview.map(|s| (s, subview_descs[index].get(s as usize).copied().unwrap_or_default()));
                        self.emit_barrier(hazard, resource, subview, record.stage, record.access, record.pass);
                    }
                }
            }
        }

        self.final_layouts = (0..image_count)
            .map(|index| match &trackers[index] {
                Some(tracker) => tracker.collapsed().layout,
                None => self.resources.images()[index].initial_layout(),
            })
            .collect();

        self.synthesize_present_barrier(&trackers);
    }

    /// 所有 Pass 之后把 present 目标转换到 `PRESENT_SRC_KHR`
    fn synthesize_present_barrier(&mut self, trackers: &[Option<RgImageTracker>]) {
        let Some(target) = self.present_target else { return };
        let index = target.index as usize;
        let Some(res) = self.resources.images().get(index) else { return };

        let mut tracker = match &trackers[index] {
            Some(tracker) if tracker.state == RgImageSplitState::Split => {
                log::error!("present target \"{}\" is still split at the end of the frame", res.name);
                return;
            }
            Some(tracker) => tracker.collapsed(),
            None => RgAccessTracker::new(res.initial_layout()),
        };

        let present = RgImageState::PRESENT;
        let consumer = self.passes.len();
        let Some(hazard) = tracker.track(consumer, RgAccessType::Read, present.stage, present.access, Some(present.layout))
        else {
            return;
        };
        self.present_barrier = Some(RgBarrier {
            placement: RgBarrierPlacement::Immediate,
            dependency: hazard.dependency,
            resource: target.id(),
            subview: None,
            subresource: None,
            src_stage: hazard.src_stage,
            src_access: hazard.src_access,
            dst_stage: present.stage,
            dst_access: present.access,
            old_layout: hazard.old_layout,
            new_layout: hazard.new_layout,
            producer: hazard.producer,
            consumer,
        });
        self.final_layouts[index] = present.layout;
    }

    fn notify_watcher(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else { return };

        let passes: Vec<RgPassInfo> = self
            .passes
            .iter()
            .zip(&self.execution_order)
            .map(|(pass, &declared_index)| RgPassInfo {
                name: pass.name.clone(),
                flags: pass.flags,
                culled: pass.culled,
                declared_index,
            })
            .collect();
        watcher.on_pass_order(&passes);
        watcher.on_buffers(self.resources.buffers());
        watcher.on_images(self.resources.images());
        watcher.on_buffer_accesses(self.buffer_accesses.records());
        watcher.on_image_accesses(self.image_accesses.records());
        for barrier in self.barriers.iter().chain(self.present_barrier.as_ref()) {
            watcher.on_barrier(barrier);
        }
    }
}
