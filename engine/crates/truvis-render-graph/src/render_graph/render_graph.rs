//! RenderGraph 声明 API
//!
//! # 使用流程
//!
//! 1. 创建: `RenderGraph::new(config)`
//! 2. 声明 / 导入资源: `create_image(...)`、`import_image(...)`
//! 3. 添加 Pass: `add_pass(name, flags, setup, execute)`，在 setup 中声明资源访问
//! 4. 编译: `compile(&mut pool, &mut device)`
//! 5. 执行: `execute(&mut encoder, frame_index)`
//! 6. 帧结束: `reset(&mut pool, &mut device)`
//!
//! # 生命周期
//!
//! `'a` 是 Pass 可以借用的外部资源的生命周期。
//! 这允许 Pass 直接引用外部的 pipeline、geometry 等资源，
//! 而不需要使用 Rc/Arc 包装。

use std::collections::HashMap;

use ash::vk;

use super::access_flags::{RgAccessFlags, RgInferredAccess, infer_access};
use super::access_log::{RgAccessLog, RgAccessType, RgBufferAccess, RgImageAccess};
use super::barrier::RgBarrier;
use super::buffer_resource::{RgBufferDesc, RgBufferResource};
use super::config::RgGraphConfig;
use super::default_resources::{RgDefaultImageKind, RgDefaultImages};
use super::device::RgDevice;
use super::image_resource::{
    RgImageDesc, RgImageInference, RgImageInherit, RgImageResource, RgImageSplitState, RgSubresourceDesc,
    RgSubviewExtra,
};
use super::pass::{
    RgClosureExecutor, RgColorAttachment, RgDepthAttachment, RgDepthBias, RgPass, RgPassContext, RgPassExecutor,
    RgPassExecutorWrapper, RgPassFlags, RgPassNode,
};
use super::resource_handle::{RgBufferHandle, RgHandleFlags, RgImageHandle, RgResourceKind};
use super::resource_pool::RgResourcePool;
use super::resource_registry::RgResourceRegistry;
use super::watcher::RgGraphWatcher;

/// 渲染图
///
/// 每帧重新声明；编译结果（执行顺序、barrier、物理资源绑定）只在当前帧有效。
pub struct RenderGraph<'a> {
    pub(crate) config: RgGraphConfig,

    /// 资源注册表
    pub(crate) resources: RgResourceRegistry,
    pub(crate) buffer_accesses: RgAccessLog<RgBufferAccess>,
    pub(crate) image_accesses: RgAccessLog<RgImageAccess>,

    /// Pass 节点列表：编译前按声明顺序，编译后按执行顺序
    pub(crate) passes: Vec<RgPassNode<'a>>,
    /// 正在 setup 的 Pass（支持嵌套）
    pass_stack: Vec<usize>,

    // 编译结果
    /// 执行顺序：位置 -> 声明顺序
    pub(crate) execution_order: Vec<usize>,
    pub(crate) barriers: Vec<RgBarrier>,
    /// 所有 Pass 之后转换到 present layout 的 barrier
    pub(crate) present_barrier: Option<RgBarrier>,
    /// 每个图像在本帧最后的 layout
    pub(crate) final_layouts: Vec<vk::ImageLayout>,
    pub(crate) compiled: bool,
    /// 编译之后才 claim 的导出资源，reset 时从资源池中摘除
    pub(crate) claimed_after_compile: Vec<(RgResourceKind, u32)>,

    pub(crate) watcher: Option<Box<dyn RgGraphWatcher + 'a>>,
    pub(crate) present_target: Option<RgImageHandle>,

    default_images: Option<RgDefaultImages>,
    default_image_handles: HashMap<RgDefaultImageKind, RgImageHandle>,
}

impl Default for RenderGraph<'_> {
    fn default() -> Self {
        Self::new(RgGraphConfig::default())
    }
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new(config: RgGraphConfig) -> Self {
        Self {
            config,
            resources: RgResourceRegistry::default(),
            buffer_accesses: RgAccessLog::default(),
            image_accesses: RgAccessLog::default(),
            passes: Vec::new(),
            pass_stack: Vec::new(),
            execution_order: Vec::new(),
            barriers: Vec::new(),
            present_barrier: None,
            final_layouts: Vec::new(),
            compiled: false,
            claimed_after_compile: Vec::new(),
            watcher: None,
            present_target: None,
            default_images: None,
            default_image_handles: HashMap::new(),
        }
    }

    /// 设置编译过程的观察者
    pub fn set_watcher(&mut self, watcher: Box<dyn RgGraphWatcher + 'a>) {
        self.watcher = Some(watcher);
    }

    /// 注入默认图像，后续通过 [`Self::default_image`] 使用
    pub fn set_default_images(&mut self, defaults: &RgDefaultImages) {
        self.default_images = Some(defaults.clone());
        self.default_image_handles.clear();
    }

    /// 执行结束后转换到 `PRESENT_SRC_KHR` 的图像
    pub fn set_present_target(&mut self, handle: RgImageHandle) {
        if self.resources.image(handle).is_none() {
            log::error!("set_present_target: invalid image handle {:?}", handle);
            return;
        }
        self.present_target = Some(handle);
    }
}

// 资源声明
impl RenderGraph<'_> {
    /// 声明临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }

    /// 声明临时图像
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgImageHandle {
        self.resources.register_image(RgImageResource::transient(name, desc))
    }

    /// 声明临时图像，`inherit` 中的属性在编译时从 `reference` 继承，其余属性取自 `base`
    pub fn create_image_like(
        &mut self,
        name: impl Into<String>,
        reference: RgImageHandle,
        inherit: RgImageInherit,
        base: RgImageDesc,
    ) -> RgImageHandle {
        let mut resource = RgImageResource::transient(name, base);
        resource.inference = Some(RgImageInference { reference: reference.index, inherit });
        self.resources.register_image(resource)
    }

    /// 导入外部缓冲区
    ///
    /// 同一帧内重复导入同一个缓冲区时返回已有的句柄。
    pub fn import_buffer(&mut self, name: impl Into<String>, buffer: vk::Buffer, desc: RgBufferDesc) -> RgBufferHandle {
        let name = name.into();
        if let Some(index) = self.resources.find_imported_buffer(buffer) {
            let handle = RgBufferHandle::new(index, RgHandleFlags::IMPORTED);
            if let Some(existing) = self.resources.buffer(handle) {
                if existing.desc != desc {
                    log::warn!("buffer \"{}\" imported again as \"{}\" with a different description", existing.name, name);
                }
                return handle.with_version(existing.version);
            }
        }
        self.resources.register_buffer(RgBufferResource::imported(name, buffer, desc))
    }

    /// 导入外部图像，`layout` 为帧开始时图像所处的 layout
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        desc: RgImageDesc,
        layout: vk::ImageLayout,
    ) -> RgImageHandle {
        let name = name.into();
        if let Some(index) = self.resources.find_imported_image(image) {
            let handle = RgImageHandle::new(index, RgHandleFlags::IMPORTED);
            if let Some(existing) = self.resources.image(handle) {
                if existing.desc != desc {
                    log::warn!("image \"{}\" imported again as \"{}\" with a different description", existing.name, name);
                }
                return handle.with_version(existing.version);
            }
        }
        self.resources.register_image(RgImageResource::imported(name, image, desc, layout))
    }

    /// 默认图像（每帧第一次使用时导入）
    pub fn default_image(&mut self, kind: RgDefaultImageKind) -> RgImageHandle {
        if let Some(handle) = self.default_image_handles.get(&kind) {
            return *handle;
        }
        let Some((image, desc)) =
            self.default_images.as_ref().and_then(|defaults| Some((defaults.image(kind)?, defaults.desc().clone())))
        else {
            log::error!("default image {:?} requested but no default images are set", kind);
            return RgImageHandle::INVALID;
        };

        let handle = self.import_image(kind.name(), image, desc, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.default_image_handles.insert(kind, handle);
        handle
    }

    /// 标记为 volatile：不参与任何别名
    pub fn mark_buffer_volatile(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        match self.resources.buffer_mut(handle) {
            Some(res) => {
                res.volatile = true;
                RgBufferHandle { flags: handle.flags | RgHandleFlags::VOLATILE, ..handle }
            }
            None => RgBufferHandle::INVALID,
        }
    }

    pub fn mark_image_volatile(&mut self, handle: RgImageHandle) -> RgImageHandle {
        match self.resources.image_mut(handle) {
            Some(res) => {
                res.volatile = true;
                RgImageHandle { flags: handle.flags | RgHandleFlags::VOLATILE, ..handle }
            }
            None => RgImageHandle::INVALID,
        }
    }
}

// 资源访问
impl RenderGraph<'_> {
    #[inline]
    fn current_pass(&self) -> Option<usize> {
        self.pass_stack.last().copied()
    }

    fn infer(
        &self,
        kind: RgResourceKind,
        flags: RgAccessFlags,
        ty: RgAccessType,
        name: &str,
    ) -> RgInferredAccess {
        let read = matches!(ty, RgAccessType::Read | RgAccessType::ReadWrite);
        let write = ty.is_write();
        match infer_access(kind, flags, read, write) {
            Ok(inferred) => inferred,
            Err(err) => {
                debug_assert!(
                    !matches!(err, super::access_flags::RgAccessError::InvalidForKind { .. }),
                    "\"{name}\": {err}"
                );
                // stage 为空的访问会在编译时让 Pass 失效
                log::error!("\"{}\": {}", name, err);
                RgInferredAccess::default()
            }
        }
    }

    pub fn read_buffer(&mut self, handle: RgBufferHandle, flags: RgAccessFlags) -> RgBufferHandle {
        self.access_buffer(handle, flags, RgAccessType::Read)
    }

    /// 写缓冲区，返回版本 +1 的句柄
    pub fn write_buffer(&mut self, handle: RgBufferHandle, flags: RgAccessFlags) -> RgBufferHandle {
        self.access_buffer(handle, flags, RgAccessType::Write)
    }

    pub fn read_write_buffer(&mut self, handle: RgBufferHandle, flags: RgAccessFlags) -> RgBufferHandle {
        self.access_buffer(handle, flags, RgAccessType::ReadWrite)
    }

    fn access_buffer(&mut self, handle: RgBufferHandle, flags: RgAccessFlags, ty: RgAccessType) -> RgBufferHandle {
        let Some(pass) = self.current_pass() else {
            log::error!("buffer access {:?} outside of a pass", handle);
            return RgBufferHandle::INVALID;
        };
        let Some(resource) = self.resources.buffer(handle) else {
            log::error!("pass \"{}\": invalid buffer handle {:?}", self.passes[pass].name, handle);
            return RgBufferHandle::INVALID;
        };

        let inferred = self.infer(RgResourceKind::Buffer, flags, ty, &resource.name);
        let version = if handle.flags.contains(RgHandleFlags::AUTO_UPDATE) { resource.version } else { handle.version };
        let read_handle = handle.with_version(version);
        let result = if ty.is_write() { read_handle.next_version() } else { read_handle };

        if let Some(resource) = self.resources.buffer_mut(handle) {
            resource.required_usage |= inferred.buffer_usage;
            if ty.is_write() {
                resource.version = resource.version.max(result.version);
            }
        }
        self.buffer_accesses.push(RgBufferAccess {
            pass,
            handle: result,
            prev_version: version,
            ty,
            stage: inferred.stage,
            access: inferred.access,
        });
        result
    }

    pub fn read_image(&mut self, handle: RgImageHandle, flags: RgAccessFlags) -> RgImageHandle {
        self.access_image(handle, flags, RgAccessType::Read)
    }

    /// 写图像，返回版本 +1 的句柄
    pub fn write_image(&mut self, handle: RgImageHandle, flags: RgAccessFlags) -> RgImageHandle {
        self.access_image(handle, flags, RgAccessType::Write)
    }

    pub fn read_write_image(&mut self, handle: RgImageHandle, flags: RgAccessFlags) -> RgImageHandle {
        self.access_image(handle, flags, RgAccessType::ReadWrite)
    }

    fn access_image(&mut self, handle: RgImageHandle, flags: RgAccessFlags, ty: RgAccessType) -> RgImageHandle {
        let Some(pass) = self.current_pass() else {
            log::error!("image access {:?} outside of a pass", handle);
            return RgImageHandle::INVALID;
        };
        let Some(resource) = self.resources.image(handle) else {
            log::error!("pass \"{}\": invalid image handle {:?}", self.passes[pass].name, handle);
            return RgImageHandle::INVALID;
        };

        let current_version = match handle.subview {
            None => {
                if resource.state == RgImageSplitState::Split {
                    log::error!(
                        "pass \"{}\": image \"{}\" is split, access its split handles or merge it first",
                        self.passes[pass].name,
                        resource.name
                    );
                    return RgImageHandle::INVALID;
                }
                resource.version
            }
            Some(subview) => match resource.subviews.get(subview as usize) {
                Some(extra) if extra.active && resource.state == RgImageSplitState::Split => extra.version,
                _ => {
                    log::error!(
                        "pass \"{}\": split handle {:?} of image \"{}\" is not active",
                        self.passes[pass].name,
                        handle,
                        resource.name
                    );
                    return RgImageHandle::INVALID;
                }
            },
        };

        let inferred = self.infer(RgResourceKind::Image, flags, ty, &resource.name);
        let version = if handle.flags.contains(RgHandleFlags::AUTO_UPDATE) { current_version } else { handle.version };
        let read_handle = handle.with_version(version);
        let result = if ty.is_write() { read_handle.next_version() } else { read_handle };

        if let Some(resource) = self.resources.image_mut(handle) {
            resource.required_usage |= inferred.image_usage;
            if handle.subview.is_none() {
                // merge 之后第一次访问主视图
                resource.state = RgImageSplitState::Merged;
            }
            if ty.is_write() {
                match handle.subview.and_then(|subview| resource.subviews.get_mut(subview as usize)) {
                    Some(extra) => extra.version = extra.version.max(result.version),
                    None => resource.version = resource.version.max(result.version),
                }
                resource.latest_version = resource.latest_version.max(result.version);
            }
        }
        self.image_accesses.push(RgImageAccess {
            pass,
            handle: result,
            prev_version: version,
            ty,
            stage: inferred.stage,
            access: inferred.access,
        });
        result
    }

    /// 作为 color attachment 使用
    ///
    /// `LOAD` 时记录读，`STORE`（或不读取时）记录写。当前 Pass 被标记为 `RASTERIZATION`。
    pub fn render_target(&mut self, handle: RgImageHandle, attachment: RgColorAttachment) -> RgImageHandle {
        let read = attachment.load_op == vk::AttachmentLoadOp::LOAD;
        let write = attachment.store_op == vk::AttachmentStoreOp::STORE || !read;
        let result = self.attachment_access(handle, RgAccessFlags::COLOR_ATTACHMENT, read, write);
        if let (true, Some(pass)) = (result.is_valid(), self.current_pass()) {
            let node = &mut self.passes[pass];
            node.flags |= RgPassFlags::RASTERIZATION;
            node.color_attachments.push((result, attachment));
        }
        result
    }

    /// 作为 depth-stencil attachment 使用
    pub fn depth_stencil_target(&mut self, handle: RgImageHandle, attachment: RgDepthAttachment) -> RgImageHandle {
        let read = attachment.load_op == vk::AttachmentLoadOp::LOAD;
        let write = attachment.store_op == vk::AttachmentStoreOp::STORE || !read;
        let result = self.attachment_access(handle, RgAccessFlags::DEPTH_STENCIL_ATTACHMENT, read, write);
        if let (true, Some(pass)) = (result.is_valid(), self.current_pass()) {
            let node = &mut self.passes[pass];
            node.flags |= RgPassFlags::RASTERIZATION;
            if node.depth_attachment.is_some() {
                log::warn!("pass \"{}\": depth-stencil target declared twice", node.name);
            }
            node.depth_attachment = Some((result, attachment));
        }
        result
    }

    fn attachment_access(&mut self, handle: RgImageHandle, flags: RgAccessFlags, read: bool, write: bool) -> RgImageHandle {
        match (read, write) {
            (true, true) => self.read_write_image(handle, flags),
            (true, false) => self.read_image(handle, flags),
            _ => self.write_image(handle, flags),
        }
    }

    /// 当前 Pass 的动态 depth bias
    pub fn set_depth_bias(&mut self, bias: RgDepthBias) {
        match self.current_pass() {
            Some(pass) => self.passes[pass].depth_bias = Some(bias),
            None => log::error!("set_depth_bias outside of a pass"),
        }
    }
}

// split & merge
impl RenderGraph<'_> {
    /// 把图像拆分出一个子视图
    ///
    /// 子视图有独立的版本与 layout。同一轮 split 中相同的描述返回同一个句柄。
    /// split 期间主视图不可访问，直到 [`Self::merge_image`]。
    pub fn split_image(&mut self, main: RgImageHandle, desc: RgSubresourceDesc) -> RgImageHandle {
        let Some(pass) = self.current_pass() else {
            log::error!("split_image {:?} outside of a pass", main);
            return RgImageHandle::INVALID;
        };
        if main.subview.is_some() {
            log::error!("split_image: {:?} is already a split handle", main);
            return RgImageHandle::INVALID;
        }
        let Some(resource) = self.resources.image_mut(main) else {
            log::error!("split_image: invalid image handle {:?}", main);
            return RgImageHandle::INVALID;
        };
        if resource.is_imported() {
            log::error!("split_image: imported image \"{}\" cannot be split", resource.name);
            return RgImageHandle::INVALID;
        }
        if resource.inference.is_none() {
            let out_of_range = desc.mip_count == 0
                || desc.layer_count == 0
                || desc.base_mip + desc.mip_count > resource.desc.mip_levels
                || desc.base_layer + desc.layer_count > resource.desc.array_layers;
            if out_of_range {
                log::error!("split_image: {:?} is out of range for image \"{}\"", desc, resource.name);
                return RgImageHandle::INVALID;
            }
        }

        if resource.state != RgImageSplitState::Split {
            // 新一轮 split
            resource.state = RgImageSplitState::Split;
            resource.subviews.iter_mut().for_each(|extra| extra.active = false);
        }
        let main_version = if main.flags.contains(RgHandleFlags::AUTO_UPDATE) { resource.version } else { main.version };
        if main_version != resource.version {
            log::warn!("split_image: image \"{}\" split from stale version v{}", resource.name, main_version);
        }
        let flags = (main.flags | RgHandleFlags::SPLIT) - RgHandleFlags::MERGE - RgHandleFlags::AUTO_UPDATE;

        let subview = match resource.subviews.iter().position(|extra| extra.desc == desc) {
            Some(subview) if resource.subviews[subview].active => {
                let extra = &resource.subviews[subview];
                return RgImageHandle { index: main.index, version: extra.version, subview: Some(subview as u8), flags };
            }
            Some(subview) => {
                let extra = &mut resource.subviews[subview];
                extra.version = main_version;
                extra.active = true;
                subview
            }
            None => {
                if resource.subviews.len() > u8::MAX as usize {
                    log::error!("split_image: too many split views on image \"{}\"", resource.name);
                    return RgImageHandle::INVALID;
                }
                resource.subviews.push(RgSubviewExtra {
                    desc,
                    version: main_version,
                    layout: vk::ImageLayout::UNDEFINED,
                    active: true,
                });
                resource.desc.views.push(desc);
                resource.subviews.len() - 1
            }
        };

        let main_handle = RgImageHandle { version: main_version, ..main };
        let split_handle =
            RgImageHandle { index: main.index, version: main_version, subview: Some(subview as u8), flags };
        for handle in [main_handle, split_handle] {
            self.image_accesses.push(RgImageAccess {
                pass,
                handle,
                prev_version: main_version,
                ty: RgAccessType::Split,
                stage: vk::PipelineStageFlags2::NONE,
                access: vk::AccessFlags2::NONE,
            });
        }
        split_handle
    }

    /// 把所有子视图合并回主视图
    ///
    /// `splits` 必须恰好包含本轮 split 出来的每一个子视图各一次，否则返回无效句柄。
    pub fn merge_image(&mut self, splits: &[RgImageHandle]) -> RgImageHandle {
        let Some(pass) = self.current_pass() else {
            log::error!("merge_image outside of a pass");
            return RgImageHandle::INVALID;
        };
        let Some(first) = splits.first() else {
            log::error!("merge_image: no split handles");
            return RgImageHandle::INVALID;
        };
        if splits.iter().any(|handle| handle.subview.is_none() || handle.index != first.index) {
            log::error!("merge_image: {:?} are not split handles of the same image", splits);
            return RgImageHandle::INVALID;
        }
        let Some(resource) = self.resources.image_mut(*first) else {
            log::error!("merge_image: invalid image handle {:?}", first);
            return RgImageHandle::INVALID;
        };
        if resource.state != RgImageSplitState::Split {
            log::error!("merge_image: image \"{}\" is not split", resource.name);
            return RgImageHandle::INVALID;
        }

        let mut provided: Vec<u8> = splits.iter().filter_map(|handle| handle.subview).collect();
        provided.sort_unstable();
        let active: Vec<u8> = resource
            .subviews
            .iter()
            .enumerate()
            .filter(|(_, extra)| extra.active)
            .map(|(subview, _)| subview as u8)
            .collect();
        if provided != active {
            log::error!(
                "merge_image: image \"{}\" has split views {:?} but {:?} were provided",
                resource.name,
                active,
                provided
            );
            return RgImageHandle::INVALID;
        }

        let mut records = Vec::with_capacity(splits.len() + 1);
        for handle in splits {
            let Some(subview) = handle.subview else { continue };
            let extra = &mut resource.subviews[subview as usize];
            let version = if handle.flags.contains(RgHandleFlags::AUTO_UPDATE) { extra.version } else { handle.version };
            extra.active = false;
            records.push((handle.with_version(version), version));
        }

        let prev_version = resource.version;
        // merge 本身是一次 produce，沿用已有版本会与该版本原来的 producer 冲突
        let version = resource.latest_version.max(resource.version).wrapping_add(1);
        resource.version = version;
        resource.latest_version = version;
        resource.state = RgImageSplitState::MaybeDivergent;

        let mut flags = (first.flags | RgHandleFlags::MERGE) - RgHandleFlags::SPLIT - RgHandleFlags::AUTO_UPDATE;
        if resource.volatile {
            flags |= RgHandleFlags::VOLATILE;
        }
        let merged = RgImageHandle { index: first.index, version, subview: None, flags };
        records.push((merged, prev_version));

        for (handle, prev_version) in records {
            self.image_accesses.push(RgImageAccess {
                pass,
                handle,
                prev_version,
                ty: RgAccessType::Merge,
                stage: vk::PipelineStageFlags2::NONE,
                access: vk::AccessFlags2::NONE,
            });
        }
        merged
    }
}

// export
impl RenderGraph<'_> {
    /// 标记为导出：资源会一直存活到帧结束，之后可以通过 [`Self::claim_buffer`] 取走
    pub fn mark_buffer_for_export(&mut self, handle: RgBufferHandle) {
        match self.resources.buffer_mut(handle) {
            Some(res) if res.is_imported() => log::warn!("imported buffer \"{}\" does not need export", res.name),
            Some(res) => res.exported = true,
            None => log::error!("mark_buffer_for_export: invalid buffer handle {:?}", handle),
        }
    }

    pub fn mark_image_for_export(&mut self, handle: RgImageHandle) {
        match self.resources.image_mut(handle) {
            Some(res) if res.is_imported() => log::warn!("imported image \"{}\" does not need export", res.name),
            Some(res) => res.exported = true,
            None => log::error!("mark_image_for_export: invalid image handle {:?}", handle),
        }
    }

    /// 取走导出的缓冲区
    ///
    /// - 编译前：把 `physical` 绑定为该资源的物理资源
    /// - 编译后：返回编译器分配的物理资源，所有权转移给调用方；重复 claim 返回同一个资源
    pub fn claim_buffer(&mut self, handle: RgBufferHandle, physical: Option<vk::Buffer>) -> Option<vk::Buffer> {
        let compiled = self.compiled;
        let Some(res) = self.resources.buffer_mut(handle) else {
            log::error!("claim_buffer: invalid buffer handle {:?}", handle);
            return None;
        };
        if !res.exported {
            log::error!("claim_buffer: buffer \"{}\" is not marked for export", res.name);
            return None;
        }

        if res.claimed {
            if physical.is_some_and(|p| Some(p) != res.physical) {
                log::warn!("claim_buffer: buffer \"{}\" is already claimed", res.name);
            }
            return res.physical;
        }
        if compiled {
            res.claimed = true;
            if res.physical.is_some() {
                self.claimed_after_compile.push((RgResourceKind::Buffer, handle.index));
            }
            return res.physical;
        }
        match physical {
            Some(buffer) => {
                res.physical = Some(buffer);
                res.claimed = true;
                Some(buffer)
            }
            None => {
                log::warn!("claim_buffer: buffer \"{}\" claimed before compile without a physical buffer", res.name);
                None
            }
        }
    }

    /// 取走导出的图像，规则同 [`Self::claim_buffer`]
    pub fn claim_image(&mut self, handle: RgImageHandle, physical: Option<vk::Image>) -> Option<vk::Image> {
        let compiled = self.compiled;
        let Some(res) = self.resources.image_mut(handle) else {
            log::error!("claim_image: invalid image handle {:?}", handle);
            return None;
        };
        if !res.exported {
            log::error!("claim_image: image \"{}\" is not marked for export", res.name);
            return None;
        }

        if res.claimed {
            if physical.is_some_and(|p| Some(p) != res.physical) {
                log::warn!("claim_image: image \"{}\" is already claimed", res.name);
            }
            return res.physical;
        }
        if compiled {
            res.claimed = true;
            if res.physical.is_some() {
                self.claimed_after_compile.push((RgResourceKind::Image, handle.index));
            }
            return res.physical;
        }
        match physical {
            Some(image) => {
                res.physical = Some(image);
                res.claimed = true;
                Some(image)
            }
            None => {
                log::warn!("claim_image: image \"{}\" claimed before compile without a physical image", res.name);
                None
            }
        }
    }
}

// pass
impl<'a> RenderGraph<'a> {
    fn begin_pass(&mut self, name: String, flags: RgPassFlags) -> usize {
        let index = self.passes.len();
        self.passes.push(RgPassNode::new(name, flags));
        self.pass_stack.push(index);
        index
    }

    fn end_pass(&mut self, index: usize, executor: Box<dyn RgPassExecutor + 'a>) {
        self.pass_stack.pop();
        self.passes[index].executor = Some(executor);
    }

    /// 添加闭包形式的 Pass
    ///
    /// - `setup`: 立即调用，声明资源访问并把句柄存入 `D`；可以嵌套添加 Pass
    /// - `execute`: 在 [`Self::execute`] 时调用
    pub fn add_pass<D, S, E>(&mut self, name: impl Into<String>, flags: RgPassFlags, setup: S, execute: E) -> &mut Self
    where
        D: Default + 'a,
        S: FnOnce(&mut Self, &mut D),
        E: Fn(&D, &mut RgPassContext<'_>) + 'a,
    {
        let name = name.into();
        if self.compiled {
            log::error!("add_pass \"{}\" after compile", name);
            return self;
        }

        let index = self.begin_pass(name, flags);
        let mut data = D::default();
        setup(self, &mut data);
        self.end_pass(index, Box::new(RgClosureExecutor { data, execute }));
        self
    }

    /// 添加实现了 [`RgPass`] 的 Pass
    pub fn add_rg_pass<P: RgPass + 'a>(&mut self, name: impl Into<String>, flags: RgPassFlags, mut pass: P) -> &mut Self {
        let name = name.into();
        if self.compiled {
            log::error!("add_rg_pass \"{}\" after compile", name);
            return self;
        }

        let index = self.begin_pass(name, flags);
        pass.setup(self);
        self.end_pass(index, Box::new(RgPassExecutorWrapper { pass }));
        self
    }
}

// frame
impl RenderGraph<'_> {
    /// 帧结束：释放本帧的声明与编译结果，并让资源池老化一帧
    ///
    /// 编译之后 claim 的导出资源在这里从资源池中摘除，所有权归调用方。
    pub fn reset(&mut self, pool: &mut RgResourcePool, device: &mut dyn RgDevice) {
        for (kind, index) in self.claimed_after_compile.drain(..) {
            let detached = match kind {
                RgResourceKind::Buffer => {
                    self.resources.buffers().get(index as usize).and_then(|res| res.physical).map(|b| pool.detach_buffer(b))
                }
                RgResourceKind::Image => {
                    self.resources.images().get(index as usize).and_then(|res| res.physical).map(|i| pool.detach_image(i))
                }
            };
            if detached != Some(true) {
                log::warn!("claimed {:?}#{} does not belong to the resource pool", kind, index);
            }
        }

        for res in self.resources.buffers().iter().filter(|res| res.exported && !res.claimed) {
            log::warn!("exported buffer \"{}\" was never claimed", res.name);
        }
        for res in self.resources.images().iter().filter(|res| res.exported && !res.claimed) {
            log::warn!("exported image \"{}\" was never claimed", res.name);
        }

        pool.on_frame_end(device);

        self.resources.clear();
        self.buffer_accesses.clear();
        self.image_accesses.clear();
        self.passes.clear();
        self.pass_stack.clear();
        self.execution_order.clear();
        self.barriers.clear();
        self.present_barrier = None;
        self.final_layouts.clear();
        self.compiled = false;
        self.present_target = None;
        self.default_image_handles.clear();
    }
}

// getters
impl<'a> RenderGraph<'a> {
    #[inline]
    pub fn config(&self) -> &RgGraphConfig {
        &self.config
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// 编译前为声明顺序，编译后为执行顺序
    #[inline]
    pub fn pass(&self, index: usize) -> Option<&RgPassNode<'a>> {
        self.passes.get(index)
    }

    pub fn pass_index(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|pass| pass.name == name)
    }

    /// 执行顺序：位置 -> 声明顺序
    #[inline]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    #[inline]
    pub fn barriers(&self) -> &[RgBarrier] {
        &self.barriers
    }

    #[inline]
    pub fn present_barrier(&self) -> Option<&RgBarrier> {
        self.present_barrier.as_ref()
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    pub fn buffer_physical(&self, handle: RgBufferHandle) -> Option<vk::Buffer> {
        self.resources.buffer(handle).and_then(|res| res.physical)
    }

    pub fn image_physical(&self, handle: RgImageHandle) -> Option<vk::Image> {
        self.resources.image(handle).and_then(|res| res.physical)
    }

    /// 编译后图像在本帧结束时的 layout
    pub fn final_image_layout(&self, handle: RgImageHandle) -> Option<vk::ImageLayout> {
        self.final_layouts.get(handle.index as usize).copied()
    }
}
