//! 资源注册表
//!
//! 管理 RenderGraph 中所有声明的虚拟资源，句柄的 `index` 直接索引这里的数组。

use super::buffer_resource::RgBufferResource;
use super::image_resource::RgImageResource;
use super::resource_handle::{RgBufferHandle, RgHandleFlags, RgImageHandle};

/// 资源注册表
///
/// 每帧重新构建，`reset` 时清空。
#[derive(Default)]
pub struct RgResourceRegistry {
    buffers: Vec<RgBufferResource>,
    images: Vec<RgImageResource>,
}

// register
impl RgResourceRegistry {
    /// 注册缓冲区资源，返回版本 0 的句柄
    pub fn register_buffer(&mut self, resource: RgBufferResource) -> RgBufferHandle {
        let mut flags = RgHandleFlags::empty();
        if resource.is_imported() {
            flags |= RgHandleFlags::IMPORTED;
        }
        if resource.volatile {
            flags |= RgHandleFlags::VOLATILE;
        }
        let index = self.buffers.len() as u32;
        self.buffers.push(resource);
        RgBufferHandle::new(index, flags)
    }

    /// 注册图像资源，返回版本 0 的句柄
    pub fn register_image(&mut self, resource: RgImageResource) -> RgImageHandle {
        let mut flags = RgHandleFlags::empty();
        if resource.is_imported() {
            flags |= RgHandleFlags::IMPORTED;
        }
        if resource.volatile {
            flags |= RgHandleFlags::VOLATILE;
        }
        let index = self.images.len() as u32;
        self.images.push(resource);
        RgImageHandle::new(index, flags)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.images.clear();
    }
}

// getters
impl RgResourceRegistry {
    #[inline]
    pub fn buffer(&self, handle: RgBufferHandle) -> Option<&RgBufferResource> {
        self.buffers.get(handle.index as usize)
    }

    #[inline]
    pub fn buffer_mut(&mut self, handle: RgBufferHandle) -> Option<&mut RgBufferResource> {
        self.buffers.get_mut(handle.index as usize)
    }

    #[inline]
    pub fn image(&self, handle: RgImageHandle) -> Option<&RgImageResource> {
        self.images.get(handle.index as usize)
    }

    #[inline]
    pub fn image_mut(&mut self, handle: RgImageHandle) -> Option<&mut RgImageResource> {
        self.images.get_mut(handle.index as usize)
    }

    #[inline]
    pub fn buffers(&self) -> &[RgBufferResource] {
        &self.buffers
    }

    #[inline]
    pub fn buffers_mut(&mut self) -> &mut [RgBufferResource] {
        &mut self.buffers
    }

    #[inline]
    pub fn images(&self) -> &[RgImageResource] {
        &self.images
    }

    #[inline]
    pub fn images_mut(&mut self) -> &mut [RgImageResource] {
        &mut self.images
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// 按物理资源查找已导入的图像（同一帧内重复导入时使用）
    pub fn find_imported_image(&self, image: ash::vk::Image) -> Option<u32> {
        self.images
            .iter()
            .position(|res| res.is_imported() && res.physical == Some(image))
            .map(|index| index as u32)
    }

    pub fn find_imported_buffer(&self, buffer: ash::vk::Buffer) -> Option<u32> {
        self.buffers
            .iter()
            .position(|res| res.is_imported() && res.physical == Some(buffer))
            .map(|index| index as u32)
    }
}

// compile
impl RgResourceRegistry {
    /// 解析所有需要从参考图像推断的描述
    ///
    /// 参考图像本身也可能是推断出来的，因此反复迭代直到没有进展。
    /// 返回无法解析的图像索引（参考无效或存在环）。
    pub fn resolve_inferred_descs(&mut self) -> Vec<u32> {
        loop {
            let mut progressed = false;
            for index in 0..self.images.len() {
                let Some(inference) = self.images[index].inference else {
                    continue;
                };
                let Some(reference) = self.images.get(inference.reference as usize) else {
                    continue;
                };
                if reference.inference.is_some() {
                    continue;
                }

                let reference_desc = reference.desc.clone();
                let image = &mut self.images[index];
                image.desc.inherit_from(&reference_desc, inference.inherit);
                image.inference = None;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        self.images
            .iter()
            .enumerate()
            .filter(|(_, image)| image.inference.is_some())
            .map(|(index, _)| index as u32)
            .collect()
    }
}
