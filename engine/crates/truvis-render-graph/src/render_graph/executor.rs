//! RenderGraph 执行
//!
//! 按编译后的顺序录制命令：等待 barrier、开始 dynamic rendering、调用 Pass、
//! signal split barrier，最后把 present 目标转换到 `PRESENT_SRC_KHR`。

use ash::vk;

use super::barrier::{RgBarrier, RgBarrierBatch, format_access_flags, format_pipeline_stage};
use super::device::{RgClearValue, RgCommandEncoder, RgRenderingAttachment, RgRenderingInfo, RgSplitBarrierId};
use super::error::RgCompileError;
use super::image_resource::RgImageResource;
use super::pass::{RgPassContext, RgPassNode};
use super::render_graph::RenderGraph;
use super::resource_handle::{RgImageHandle, RgResourceKind};

// execute
impl RenderGraph<'_> {
    /// 执行渲染图
    ///
    /// # 参数
    /// - `encoder`: 命令录制接口（command buffer 已经 begin）
    /// - `frame_index`: 透传给 Pass
    pub fn execute(&mut self, encoder: &mut dyn RgCommandEncoder, frame_index: u64) -> Result<(), RgCompileError> {
        #[cfg(feature = "profiling")]
        let _span = tracy_client::span!("RenderGraph::execute");

        if !self.compiled {
            return Err(RgCompileError::NotCompiled);
        }

        // 子视图从主视图的 layout 开始
        for res in self.resources.images_mut() {
            let layout = res.current_layout;
            res.subviews.iter_mut().for_each(|extra| extra.layout = layout);
        }

        for position in 0..self.passes.len() {
            let waits = self.passes[position].wait_barriers.clone();
            let (split, immediate): (Vec<usize>, Vec<usize>) =
                waits.iter().copied().partition(|&index| self.barriers[index].is_split());

            let batch = self.resolve_barriers(&immediate);
            if !batch.is_empty() {
                encoder.cmd_pipeline_barrier(&batch);
            }
            for index in split {
                let batch = self.resolve_barriers(&[index]);
                encoder.cmd_wait_split_barrier(RgSplitBarrierId(index as u32), &batch);
            }
            for index in waits {
                let barrier = self.barriers[index];
                self.apply_layout(&barrier);
            }

            let pass = &self.passes[position];
            if pass.is_active() {
                encoder.begin_label(&pass.name);

                let rendering = if pass.is_rasterization() { self.rendering_info(pass) } else { None };
                if let Some(info) = &rendering {
                    encoder.cmd_begin_rendering(info);
                    encoder.cmd_set_viewport_scissor(info.render_area);
                    if let Some(bias) = &pass.depth_bias {
                        encoder.cmd_set_depth_bias(bias);
                    }
                }

                if let Some(executor) = &pass.executor {
                    let mut ctx = RgPassContext {
                        encoder: &mut *encoder,
                        frame_index,
                        pass_index: position,
                        resources: &self.resources,
                    };
                    executor.execute(&mut ctx);
                }

                if rendering.is_some() {
                    encoder.cmd_end_rendering();
                }
                encoder.end_label();
            }

            for &index in &self.passes[position].signal_barriers {
                let batch = self.resolve_barriers(&[index]);
                encoder.cmd_set_split_barrier(RgSplitBarrierId(index as u32), &batch);
            }
        }

        if let Some(barrier) = self.present_barrier {
            let mut batch = RgBarrierBatch::default();
            self.resolve_barrier(&barrier, &mut batch);
            if !batch.is_empty() {
                encoder.cmd_pipeline_barrier(&batch);
            }
            self.apply_layout(&barrier);
        }

        Ok(())
    }

    fn resolve_barriers(&self, indices: &[usize]) -> RgBarrierBatch {
        let mut batch = RgBarrierBatch::default();
        for &index in indices {
            self.resolve_barrier(&self.barriers[index], &mut batch);
        }
        batch
    }

    /// 结合物理资源解析 barrier
    fn resolve_barrier(&self, barrier: &RgBarrier, batch: &mut RgBarrierBatch) {
        let index = barrier.resource.index as usize;
        match barrier.resource.kind {
            RgResourceKind::Buffer => match self.resources.buffers().get(index).and_then(|res| res.physical) {
                Some(buffer) => batch.buffer_barriers.push(barrier.to_buffer_barrier(buffer)),
                None => log::warn!("barrier on {} skipped: no physical buffer", barrier.resource),
            },
            RgResourceKind::Image => match self.resources.images().get(index).and_then(|res| Some((res.physical?, res))) {
                Some((image, res)) => batch.image_barriers.push(barrier.to_image_barrier(image, res.desc.format)),
                None => log::warn!("barrier on {} skipped: no physical image", barrier.resource),
            },
        }
    }

    /// 记录 barrier 之后的 layout
    fn apply_layout(&mut self, barrier: &RgBarrier) {
        if barrier.resource.kind != RgResourceKind::Image || !barrier.is_layout_transition() {
            return;
        }
        let Some(res) = self.resources.images_mut().get_mut(barrier.resource.index as usize) else {
            return;
        };

        match barrier.subview.and_then(|subview| res.subviews.get_mut(subview as usize)) {
            Some(extra) => {
                extra.layout = barrier.new_layout;
                // 所有子视图一致时主视图随之更新
                if res.subviews.iter().all(|extra| extra.layout == barrier.new_layout) {
                    res.current_layout = barrier.new_layout;
                }
            }
            None => {
                res.current_layout = barrier.new_layout;
                res.subviews.iter_mut().for_each(|extra| extra.layout = barrier.new_layout);
            }
        }
    }

    fn image_layout(res: &RgImageResource, handle: RgImageHandle) -> vk::ImageLayout {
        match handle.subview.and_then(|subview| res.subviews.get(subview as usize)) {
            Some(extra) => extra.layout,
            None => res.current_layout,
        }
    }

    /// 渲染区域取第一个 attachment 的尺寸（子视图按 base mip 缩小）
    fn attachment_extent(res: &RgImageResource, handle: RgImageHandle) -> vk::Extent2D {
        let base_mip = handle
            .subview
            .and_then(|subview| res.subviews.get(subview as usize))
            .map_or(0, |extra| extra.desc.base_mip);
        vk::Extent2D { width: (res.desc.width >> base_mip).max(1), height: (res.desc.height >> base_mip).max(1) }
    }

    fn rendering_info(&self, pass: &RgPassNode<'_>) -> Option<RgRenderingInfo> {
        let attachment = |handle: RgImageHandle,
                          load_op: vk::AttachmentLoadOp,
                          store_op: vk::AttachmentStoreOp,
                          clear_value: RgClearValue|
         -> Option<(RgRenderingAttachment, vk::Extent2D)> {
            let Some(res) = self.resources.image(handle) else {
                log::error!("pass \"{}\": invalid render target {:?}", pass.name, handle);
                return None;
            };
            let Some(image) = res.physical else {
                log::error!("pass \"{}\": render target \"{}\" has no physical image", pass.name, res.name);
                return None;
            };
            let attachment = RgRenderingAttachment {
                image,
                format: res.desc.format,
                range: res.subresource_range(handle.subview),
                layout: Self::image_layout(res, handle),
                load_op,
                store_op,
                clear_value,
            };
            Some((attachment, Self::attachment_extent(res, handle)))
        };

        let mut extent = None;
        let mut color_attachments = Vec::with_capacity(pass.color_attachments.len());
        for (handle, color) in &pass.color_attachments {
            let (color, color_extent) =
                attachment(*handle, color.load_op, color.store_op, RgClearValue::Color(color.clear_color))?;
            extent.get_or_insert(color_extent);
            color_attachments.push(color);
        }

        let mut depth_attachment = None;
        if let Some((handle, depth)) = &pass.depth_attachment {
            let clear_value = RgClearValue::DepthStencil { depth: depth.clear_depth, stencil: depth.clear_stencil };
            let (depth, depth_extent) = attachment(*handle, depth.load_op, depth.store_op, clear_value)?;
            extent.get_or_insert(depth_extent);
            depth_attachment = Some(depth);
        }

        Some(RgRenderingInfo {
            render_area: vk::Rect2D { offset: vk::Offset2D::default(), extent: extent? },
            color_attachments,
            depth_attachment,
        })
    }
}

// 调试方法
impl RenderGraph<'_> {
    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 Pass 的执行顺序、资源访问以及 barrier 详细信息。
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            self.passes.len(),
            self.passes.iter().map(|pass| pass.name.as_str()).collect::<Vec<_>>().join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        let buffer_name = |index: u32| {
            self.resources.buffers().get(index as usize).map(|res| res.name.as_str()).unwrap_or("<unknown>")
        };
        let image_name =
            |index: u32| self.resources.images().get(index as usize).map(|res| res.name.as_str()).unwrap_or("<unknown>");

        for (position, pass) in self.passes.iter().enumerate() {
            let state = if pass.culled {
                " (culled)"
            } else if pass.is_disabled() {
                " (disabled)"
            } else {
                ""
            };
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] Pass: \"{}\"{}", position + 1, self.passes.len(), pass.name, state);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for record in self.image_accesses.records().iter().filter(|record| record.pass == position) {
                let subview = record.handle.subview.map(|s| format!("/{s}")).unwrap_or_default();
                log::info!(
                    "│   🖼  {:?} \"{}{}\" v{} (stage: {}, access: {})",
                    record.ty,
                    image_name(record.handle.index),
                    subview,
                    record.handle.version,
                    format_pipeline_stage(record.stage),
                    format_access_flags(record.access)
                );
            }
            for record in self.buffer_accesses.records().iter().filter(|record| record.pass == position) {
                log::info!(
                    "│   📦 {:?} \"{}\" v{} (stage: {}, access: {})",
                    record.ty,
                    buffer_name(record.handle.index),
                    record.handle.version,
                    format_pipeline_stage(record.stage),
                    format_access_flags(record.access)
                );
            }

            if pass.wait_barriers.is_empty() && pass.signal_barriers.is_empty() {
                continue;
            }
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            log::info!("│ Barriers: {} wait, {} signal", pass.wait_barriers.len(), pass.signal_barriers.len());
            for &index in &pass.wait_barriers {
                let barrier = &self.barriers[index];
                let name = match barrier.resource.kind {
                    RgResourceKind::Buffer => buffer_name(barrier.resource.index),
                    RgResourceKind::Image => image_name(barrier.resource.index),
                };
                let producer = barrier.producer.map(|p| self.passes[p].name.as_str()).unwrap_or("frame begin");
                log::info!("│   🔒 #{} {} \"{}\" ({:?}) after \"{}\"", index, barrier.dependency, name, barrier.placement, producer);
                if barrier.is_layout_transition() {
                    log::info!("│       Layout: {:?} → {:?}", barrier.old_layout, barrier.new_layout);
                }
                log::info!(
                    "│       Stage:  {} → {}",
                    format_pipeline_stage(barrier.src_stage),
                    format_pipeline_stage(barrier.dst_stage)
                );
                log::info!(
                    "│       Access: {} → {}",
                    format_access_flags(barrier.src_access),
                    format_access_flags(barrier.dst_access)
                );
            }
        }

        if let Some(barrier) = &self.present_barrier {
            log::info!("");
            log::info!("  present: {:?} → {:?}", barrier.old_layout, barrier.new_layout);
        }
    }
}
