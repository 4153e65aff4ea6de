//! 引擎级的默认图像（1x1 白 / 黑 / 平坦法线 / 透明）
//!
//! 由调用方显式 `create` / `destroy`，通过 [`RenderGraph::set_default_images`](super::RenderGraph::set_default_images)
//! 注入到每一帧的 RenderGraph 中。图像内容的上传以及转换到 `SHADER_READ_ONLY_OPTIMAL`
//! 由调用方在创建后完成，参考 [`RgDefaultImageKind::clear_color`]。

use ash::vk;

use super::device::RgDevice;
use super::image_resource::RgImageDesc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgDefaultImageKind {
    White,
    Black,
    /// 切线空间的 (0, 0, 1)
    FlatNormal,
    Transparent,
}

impl RgDefaultImageKind {
    pub const ALL: [Self; 4] = [Self::White, Self::Black, Self::FlatNormal, Self::Transparent];

    /// 图像的内容
    pub fn clear_color(self) -> [f32; 4] {
        match self {
            Self::White => [1.0, 1.0, 1.0, 1.0],
            Self::Black => [0.0, 0.0, 0.0, 1.0],
            Self::FlatNormal => [0.5, 0.5, 1.0, 1.0],
            Self::Transparent => [0.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::White => "default-white",
            Self::Black => "default-black",
            Self::FlatNormal => "default-flat-normal",
            Self::Transparent => "default-transparent",
        }
    }
}

/// 默认图像的持有者
///
/// 生命周期由调用方管理：`create` 之后必须在 device 销毁前调用 `destroy`。
#[derive(Clone, Debug)]
pub struct RgDefaultImages {
    desc: RgImageDesc,
    images: Vec<(RgDefaultImageKind, vk::Image)>,
}

impl RgDefaultImages {
    pub fn create(device: &mut dyn RgDevice) -> Self {
        let desc = RgImageDesc::new_2d(1, 1, vk::Format::R8G8B8A8_UNORM)
            .with_usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST);

        let images = RgDefaultImageKind::ALL
            .iter()
            .map(|&kind| {
                let image = device.create_image(&desc);
                device.set_image_name(image, kind.name());
                (kind, image)
            })
            .collect();

        Self { desc, images }
    }

    pub fn destroy(self, device: &mut dyn RgDevice) {
        for (_, image) in self.images {
            device.destroy_image(image);
        }
    }

    #[inline]
    pub fn desc(&self) -> &RgImageDesc {
        &self.desc
    }

    pub fn image(&self, kind: RgDefaultImageKind) -> Option<vk::Image> {
        self.images.iter().find(|(k, _)| *k == kind).map(|(_, image)| *image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::test_utils::MockDevice;

    #[test]
    fn test_create_and_destroy() {
        let mut device = MockDevice::default();
        let defaults = RgDefaultImages::create(&mut device);

        assert_eq!(device.created_images(), RgDefaultImageKind::ALL.len());
        assert!(defaults.image(RgDefaultImageKind::FlatNormal).is_some());
        assert_eq!(device.image_name(defaults.image(RgDefaultImageKind::White).unwrap()), Some("default-white"));

        defaults.destroy(&mut device);
        assert_eq!(device.destroyed_images(), RgDefaultImageKind::ALL.len());
    }
}
