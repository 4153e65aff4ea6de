//! 编译过程的观察者
//!
//! 编译完成后按固定顺序通知：Pass 顺序、buffer / image 列表、buffer / image 访问记录，
//! 最后每个 barrier 通知一次。测试用它断言 barrier 的数量与类型，
//! [`RgDotExporter`] 用它导出 Graphviz 图。

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use super::access_log::{RgBufferAccess, RgImageAccess};
use super::barrier::{RgBarrier, RgBarrierPlacement};
use super::buffer_resource::RgBufferResource;
use super::image_resource::RgImageResource;
use super::pass::RgPassFlags;
use super::resource_handle::RgResourceKind;

/// 编译后 Pass 的摘要
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPassInfo {
    pub name: String,
    pub flags: RgPassFlags,
    pub culled: bool,
    /// 声明顺序
    pub declared_index: usize,
}

/// 编译过程的观察者，所有方法默认为空
pub trait RgGraphWatcher {
    /// 排序后的 Pass
    fn on_pass_order(&mut self, _passes: &[RgPassInfo]) {}

    fn on_buffers(&mut self, _buffers: &[RgBufferResource]) {}

    fn on_images(&mut self, _images: &[RgImageResource]) {}

    /// 排序、合并之后的 buffer 访问记录
    fn on_buffer_accesses(&mut self, _accesses: &[RgBufferAccess]) {}

    fn on_image_accesses(&mut self, _accesses: &[RgImageAccess]) {}

    fn on_barrier(&mut self, _barrier: &RgBarrier) {}
}

/// 共享的观察者：调用方保留一份 `Rc` 在编译之后读取结果
impl<W: RgGraphWatcher> RgGraphWatcher for Rc<RefCell<W>> {
    fn on_pass_order(&mut self, passes: &[RgPassInfo]) {
        self.borrow_mut().on_pass_order(passes);
    }

    fn on_buffers(&mut self, buffers: &[RgBufferResource]) {
        self.borrow_mut().on_buffers(buffers);
    }

    fn on_images(&mut self, images: &[RgImageResource]) {
        self.borrow_mut().on_images(images);
    }

    fn on_buffer_accesses(&mut self, accesses: &[RgBufferAccess]) {
        self.borrow_mut().on_buffer_accesses(accesses);
    }

    fn on_image_accesses(&mut self, accesses: &[RgImageAccess]) {
        self.borrow_mut().on_image_accesses(accesses);
    }

    fn on_barrier(&mut self, barrier: &RgBarrier) {
        self.borrow_mut().on_barrier(barrier);
    }
}

/// 导出 Graphviz 描述
///
/// 节点为按执行顺序排列的 Pass，边为 barrier（标注资源名与依赖类型），
/// split barrier 用虚线表示。
#[derive(Default)]
pub struct RgDotExporter {
    passes: Vec<RgPassInfo>,
    buffer_names: Vec<String>,
    image_names: Vec<String>,
    barriers: Vec<RgBarrier>,
}

impl RgGraphWatcher for RgDotExporter {
    fn on_pass_order(&mut self, passes: &[RgPassInfo]) {
        self.passes = passes.to_vec();
        self.barriers.clear();
    }

    fn on_buffers(&mut self, buffers: &[RgBufferResource]) {
        self.buffer_names = buffers.iter().map(|res| res.name.clone()).collect();
    }

    fn on_images(&mut self, images: &[RgImageResource]) {
        self.image_names = images.iter().map(|res| res.name.clone()).collect();
    }

    fn on_barrier(&mut self, barrier: &RgBarrier) {
        self.barriers.push(*barrier);
    }
}

impl RgDotExporter {
    fn resource_name(&self, barrier: &RgBarrier) -> &str {
        let names = match barrier.resource.kind {
            RgResourceKind::Buffer => &self.buffer_names,
            RgResourceKind::Image => &self.image_names,
        };
        names.get(barrier.resource.index as usize).map(String::as_str).unwrap_or("<unknown>")
    }

    /// 生成 dot 文本
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph render_graph {{");
        let _ = writeln!(dot, "    rankdir=LR;");
        let _ = writeln!(dot, "    node [shape=box];");
        let _ = writeln!(dot, "    frame_begin [shape=point];");

        for (index, pass) in self.passes.iter().enumerate() {
            let style = if pass.flags.contains(RgPassFlags::DISABLED) || pass.culled { ", style=dashed" } else { "" };
            let _ = writeln!(dot, "    p{index} [label=\"{}: {}\"{style}];", index, pass.name.replace('"', "\\\""));
        }
        for pair in (0..self.passes.len()).collect::<Vec<_>>().windows(2) {
            let _ = writeln!(dot, "    p{} -> p{} [style=invis];", pair[0], pair[1]);
        }

        for barrier in &self.barriers {
            let from = match barrier.producer {
                Some(producer) => format!("p{producer}"),
                None => "frame_begin".to_string(),
            };
            let style = match barrier.placement {
                RgBarrierPlacement::Immediate => "solid",
                RgBarrierPlacement::Split => "dashed",
            };
            let subview = barrier.subview.map(|s| format!("/{s}")).unwrap_or_default();
            let _ = writeln!(
                dot,
                "    {from} -> p{} [label=\"{}{subview} ({})\", style={style}];",
                barrier.consumer,
                self.resource_name(barrier),
                barrier.dependency
            );
        }

        dot.push_str("}\n");
        dot
    }
}
