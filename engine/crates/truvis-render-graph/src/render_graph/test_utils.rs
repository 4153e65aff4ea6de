//! 测试用的 mock device、命令录制器与观察者

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use super::access_log::{RgBufferAccess, RgImageAccess};
use super::barrier::{RgBarrier, RgBarrierBatch, RgDependencyKind, RgBarrierPlacement};
use super::buffer_resource::{RgBufferDesc, RgBufferResource};
use super::device::{RgCommandEncoder, RgDevice, RgRenderingInfo, RgSplitBarrierId};
use super::image_resource::{RgImageDesc, RgImageResource};
use super::pass::RgDepthBias;
use super::watcher::{RgGraphWatcher, RgPassInfo};

/// 分配递增的假句柄
#[derive(Default)]
pub struct MockDevice {
    next_handle: u64,
    pub buffers: Vec<(vk::Buffer, RgBufferDesc)>,
    pub images: Vec<(vk::Image, RgImageDesc)>,
    pub destroyed_buffers: Vec<vk::Buffer>,
    pub destroyed_images: Vec<vk::Image>,
    pub names: HashMap<u64, String>,
}

impl MockDevice {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn created_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn created_images(&self) -> usize {
        self.images.len()
    }

    pub fn destroyed_images(&self) -> usize {
        self.destroyed_images.len()
    }

    pub fn image_name(&self, image: vk::Image) -> Option<&str> {
        self.names.get(&image.as_raw()).map(String::as_str)
    }

    pub fn buffer_name(&self, buffer: vk::Buffer) -> Option<&str> {
        self.names.get(&buffer.as_raw()).map(String::as_str)
    }

    /// 物理图像创建时使用的描述
    pub fn image_desc(&self, image: vk::Image) -> Option<&RgImageDesc> {
        self.images.iter().find(|(i, _)| *i == image).map(|(_, desc)| desc)
    }

    pub fn buffer_desc(&self, buffer: vk::Buffer) -> Option<&RgBufferDesc> {
        self.buffers.iter().find(|(b, _)| *b == buffer).map(|(_, desc)| desc)
    }
}

impl RgDevice for MockDevice {
    fn create_buffer(&mut self, desc: &RgBufferDesc) -> vk::Buffer {
        let buffer = vk::Buffer::from_raw(self.next());
        self.buffers.push((buffer, desc.clone()));
        buffer
    }

    fn create_image(&mut self, desc: &RgImageDesc) -> vk::Image {
        let image = vk::Image::from_raw(self.next());
        self.images.push((image, desc.clone()));
        image
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.destroyed_buffers.push(buffer);
    }

    fn destroy_image(&mut self, image: vk::Image) {
        self.destroyed_images.push(image);
    }

    fn set_buffer_name(&mut self, buffer: vk::Buffer, name: &str) {
        self.names.insert(buffer.as_raw(), name.to_string());
    }

    fn set_image_name(&mut self, image: vk::Image, name: &str) {
        self.names.insert(image.as_raw(), name.to_string());
    }
}

/// 录制下来的命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    Barrier { buffers: usize, images: usize, layouts: Vec<(vk::ImageLayout, vk::ImageLayout)> },
    SetSplit(RgSplitBarrierId),
    WaitSplit(RgSplitBarrierId),
    BeginRendering { colors: usize, depth: bool, width: u32, height: u32 },
    EndRendering,
    Viewport,
    DepthBias,
    BeginLabel(String),
    EndLabel,
}

#[derive(Default)]
pub struct RecordingEncoder {
    pub commands: Vec<RecordedCommand>,
}

impl RecordingEncoder {
    fn barrier_command(batch: &RgBarrierBatch) -> RecordedCommand {
        RecordedCommand::Barrier {
            buffers: batch.buffer_barriers.len(),
            images: batch.image_barriers.len(),
            layouts: batch.image_barriers.iter().map(|b| (b.old_layout, b.new_layout)).collect(),
        }
    }

    /// 按 label 统计执行过的 Pass
    pub fn executed_labels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::BeginLabel(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RgCommandEncoder for RecordingEncoder {
    fn cmd_pipeline_barrier(&mut self, batch: &RgBarrierBatch) {
        self.commands.push(Self::barrier_command(batch));
    }

    fn cmd_set_split_barrier(&mut self, id: RgSplitBarrierId, _batch: &RgBarrierBatch) {
        self.commands.push(RecordedCommand::SetSplit(id));
    }

    fn cmd_wait_split_barrier(&mut self, id: RgSplitBarrierId, _batch: &RgBarrierBatch) {
        self.commands.push(RecordedCommand::WaitSplit(id));
    }

    fn cmd_begin_rendering(&mut self, info: &RgRenderingInfo) {
        self.commands.push(RecordedCommand::BeginRendering {
            colors: info.color_attachments.len(),
            depth: info.depth_attachment.is_some(),
            width: info.render_area.extent.width,
            height: info.render_area.extent.height,
        });
    }

    fn cmd_end_rendering(&mut self) {
        self.commands.push(RecordedCommand::EndRendering);
    }

    fn cmd_set_viewport_scissor(&mut self, _area: vk::Rect2D) {
        self.commands.push(RecordedCommand::Viewport);
    }

    fn cmd_set_depth_bias(&mut self, _bias: &RgDepthBias) {
        self.commands.push(RecordedCommand::DepthBias);
    }

    fn begin_label(&mut self, name: &str) {
        self.commands.push(RecordedCommand::BeginLabel(name.to_string()));
    }

    fn end_label(&mut self) {
        self.commands.push(RecordedCommand::EndLabel);
    }
}

/// 记录所有通知的观察者，通过 `Rc<RefCell<_>>` 共享
#[derive(Default)]
pub struct RecordingWatcher {
    /// 通知的先后顺序
    pub events: Vec<&'static str>,
    pub passes: Vec<RgPassInfo>,
    pub buffer_names: Vec<String>,
    pub image_names: Vec<String>,
    pub buffer_accesses: Vec<RgBufferAccess>,
    pub image_accesses: Vec<RgImageAccess>,
    pub barriers: Vec<RgBarrier>,
}

impl RecordingWatcher {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn count(&self, dependency: RgDependencyKind) -> usize {
        self.barriers.iter().filter(|b| b.dependency == dependency).count()
    }

    pub fn split_count(&self) -> usize {
        self.barriers.iter().filter(|b| b.placement == RgBarrierPlacement::Split).count()
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name.as_str()).collect()
    }

    /// 排序后的位置
    pub fn position(&self, name: &str) -> usize {
        self.passes.iter().position(|p| p.name == name).unwrap()
    }
}

impl RgGraphWatcher for RecordingWatcher {
    fn on_pass_order(&mut self, passes: &[RgPassInfo]) {
        self.events.push("passes");
        self.passes = passes.to_vec();
    }

    fn on_buffers(&mut self, buffers: &[RgBufferResource]) {
        self.events.push("buffers");
        self.buffer_names = buffers.iter().map(|b| b.name.clone()).collect();
    }

    fn on_images(&mut self, images: &[RgImageResource]) {
        self.events.push("images");
        self.image_names = images.iter().map(|i| i.name.clone()).collect();
    }

    fn on_buffer_accesses(&mut self, accesses: &[RgBufferAccess]) {
        self.events.push("buffer_accesses");
        self.buffer_accesses = accesses.to_vec();
    }

    fn on_image_accesses(&mut self, accesses: &[RgImageAccess]) {
        self.events.push("image_accesses");
        self.image_accesses = accesses.to_vec();
    }

    fn on_barrier(&mut self, barrier: &RgBarrier) {
        self.events.push("barrier");
        self.barriers.push(*barrier);
    }
}
