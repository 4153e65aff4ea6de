//! 语义访问标记到 stage / access / usage 的推断
//!
//! Pass 只声明语义（"在 pixel shader 中作为 uniform 读取"），
//! 具体的 `vk::PipelineStageFlags2`、`vk::AccessFlags2` 以及资源创建所需的
//! usage 由一张声明式的表 [`ACCESS_RULES`] 决定，[`infer_access`] 只负责解释这张表。

use ash::vk;

use super::resource_handle::RgResourceKind;

bitflags::bitflags! {
    /// 语义访问标记
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RgAccessFlags: u32 {
        // ---------- shader stage ----------
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const COMPUTE = 1 << 2;

        // ---------- buffer 角色 ----------
        const INDEX = 1 << 8;
        const INDIRECT = 1 << 9;
        const CONDITIONAL = 1 << 10;
        const ATTRIBUTE = 1 << 11;
        const UNIFORM = 1 << 12;

        // ---------- buffer / image 共用 ----------
        const STORAGE = 1 << 13;
        const COPY = 1 << 14;

        // ---------- image 角色 ----------
        const SAMPLED = 1 << 16;
        const BLIT = 1 << 17;
        const READBACK = 1 << 18;
        const COLOR_ATTACHMENT = 1 << 19;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 20;
    }
}

/// stage 的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RgStageSource {
    /// 固定 stage（index input、transfer 等）
    Fixed(vk::PipelineStageFlags2),
    /// 由同时声明的 shader stage 标记决定
    ShaderStages,
}

/// 一条规则在读或写方向上的效果
#[derive(Clone, Copy, Debug)]
struct RgAccessEffect {
    stage: RgStageSource,
    access: vk::AccessFlags2,
    buffer_usage: vk::BufferUsageFlags,
    image_usage: vk::ImageUsageFlags,
}

impl RgAccessEffect {
    const fn fixed(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        buffer_usage: vk::BufferUsageFlags,
        image_usage: vk::ImageUsageFlags,
    ) -> Self {
        Self { stage: RgStageSource::Fixed(stage), access, buffer_usage, image_usage }
    }

    const fn shader(
        access: vk::AccessFlags2,
        buffer_usage: vk::BufferUsageFlags,
        image_usage: vk::ImageUsageFlags,
    ) -> Self {
        Self { stage: RgStageSource::ShaderStages, access, buffer_usage, image_usage }
    }
}

/// 规则类别
#[derive(Clone, Copy, Debug)]
enum RgRuleKind {
    /// shader stage 标记，只贡献 stage
    Stage(vk::PipelineStageFlags2),
    /// 资源角色，贡献 access / usage
    Role { read: Option<RgAccessEffect>, write: Option<RgAccessEffect> },
}

/// 声明式表中的一行
#[derive(Clone, Copy, Debug)]
struct RgAccessRule {
    flag: RgAccessFlags,
    for_buffer: bool,
    for_image: bool,
    kind: RgRuleKind,
}

const NO_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::empty();
const NO_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::empty();

const DEPTH_TESTS: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// 语义标记 -> stage / access / usage 的声明式表
#[rustfmt::skip]
const ACCESS_RULES: &[RgAccessRule] = &[
    // shader stage
    RgAccessRule { flag: RgAccessFlags::VERTEX, for_buffer: true, for_image: true,
        kind: RgRuleKind::Stage(vk::PipelineStageFlags2::VERTEX_SHADER) },
    RgAccessRule { flag: RgAccessFlags::PIXEL, for_buffer: true, for_image: true,
        kind: RgRuleKind::Stage(vk::PipelineStageFlags2::FRAGMENT_SHADER) },
    RgAccessRule { flag: RgAccessFlags::COMPUTE, for_buffer: true, for_image: true,
        kind: RgRuleKind::Stage(vk::PipelineStageFlags2::COMPUTE_SHADER) },

    // buffer 角色
    RgAccessRule { flag: RgAccessFlags::INDEX, for_buffer: true, for_image: false,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ,
                vk::BufferUsageFlags::INDEX_BUFFER, NO_IMAGE_USAGE)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::INDIRECT, for_buffer: true, for_image: false,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::DRAW_INDIRECT,
                vk::AccessFlags2::INDIRECT_COMMAND_READ, vk::BufferUsageFlags::INDIRECT_BUFFER, NO_IMAGE_USAGE)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::CONDITIONAL, for_buffer: true, for_image: false,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::CONDITIONAL_RENDERING_EXT,
                vk::AccessFlags2::CONDITIONAL_RENDERING_READ_EXT, vk::BufferUsageFlags::CONDITIONAL_RENDERING_EXT,
                NO_IMAGE_USAGE)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::ATTRIBUTE, for_buffer: true, for_image: false,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, vk::BufferUsageFlags::VERTEX_BUFFER, NO_IMAGE_USAGE)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::UNIFORM, for_buffer: true, for_image: false,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::shader(vk::AccessFlags2::UNIFORM_READ, vk::BufferUsageFlags::UNIFORM_BUFFER,
                NO_IMAGE_USAGE)),
            write: None,
        } },

    // buffer / image 共用
    RgAccessRule { flag: RgAccessFlags::STORAGE, for_buffer: true, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::shader(vk::AccessFlags2::SHADER_STORAGE_READ,
                vk::BufferUsageFlags::STORAGE_BUFFER, vk::ImageUsageFlags::STORAGE)),
            write: Some(RgAccessEffect::shader(vk::AccessFlags2::SHADER_STORAGE_WRITE,
                vk::BufferUsageFlags::STORAGE_BUFFER, vk::ImageUsageFlags::STORAGE)),
        } },
    RgAccessRule { flag: RgAccessFlags::COPY, for_buffer: true, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_READ,
                vk::BufferUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC)),
            write: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_WRITE,
                vk::BufferUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST)),
        } },

    // image 角色
    RgAccessRule { flag: RgAccessFlags::SAMPLED, for_buffer: false, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::shader(vk::AccessFlags2::SHADER_SAMPLED_READ, NO_BUFFER_USAGE,
                vk::ImageUsageFlags::SAMPLED)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::BLIT, for_buffer: false, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::BLIT, vk::AccessFlags2::TRANSFER_READ,
                NO_BUFFER_USAGE, vk::ImageUsageFlags::TRANSFER_SRC)),
            write: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::BLIT, vk::AccessFlags2::TRANSFER_WRITE,
                NO_BUFFER_USAGE, vk::ImageUsageFlags::TRANSFER_DST)),
        } },
    RgAccessRule { flag: RgAccessFlags::READBACK, for_buffer: false, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_READ,
                NO_BUFFER_USAGE, vk::ImageUsageFlags::TRANSFER_SRC)),
            write: None,
        } },
    RgAccessRule { flag: RgAccessFlags::COLOR_ATTACHMENT, for_buffer: false, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ, NO_BUFFER_USAGE, vk::ImageUsageFlags::COLOR_ATTACHMENT)),
            write: Some(RgAccessEffect::fixed(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, NO_BUFFER_USAGE, vk::ImageUsageFlags::COLOR_ATTACHMENT)),
        } },
    RgAccessRule { flag: RgAccessFlags::DEPTH_STENCIL_ATTACHMENT, for_buffer: false, for_image: true,
        kind: RgRuleKind::Role {
            read: Some(RgAccessEffect::fixed(DEPTH_TESTS, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
                NO_BUFFER_USAGE, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)),
            write: Some(RgAccessEffect::fixed(DEPTH_TESTS, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                NO_BUFFER_USAGE, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)),
        } },
];

/// 推断结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgInferredAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub buffer_usage: vk::BufferUsageFlags,
    pub image_usage: vk::ImageUsageFlags,
}

/// 推断失败的原因
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RgAccessError {
    /// 标记不适用于该资源类别（例如 buffer 上的 `SAMPLED`）
    #[error("access flags {flags:?} are not valid for {kind:?}")]
    InvalidForKind { kind: RgResourceKind, flags: RgAccessFlags },
    /// 只读角色被用于写
    #[error("access flags {flags:?} contain a read-only role used for write")]
    ReadOnlyRole { flags: RgAccessFlags },
    /// shader 资源角色缺少 shader stage
    #[error("access flags {flags:?} need a shader stage")]
    MissingStage { flags: RgAccessFlags },
    /// 没有任何资源角色
    #[error("access flags {flags:?} declare no resource role")]
    MissingRole { flags: RgAccessFlags },
}

/// 解释 [`ACCESS_RULES`]，把语义标记转换为具体的 stage / access / usage
pub fn infer_access(
    kind: RgResourceKind,
    flags: RgAccessFlags,
    read: bool,
    write: bool,
) -> Result<RgInferredAccess, RgAccessError> {
    let mut shader_stages = vk::PipelineStageFlags2::NONE;
    let mut roles = Vec::new();

    for rule in ACCESS_RULES.iter().filter(|rule| flags.contains(rule.flag)) {
        let allowed = match kind {
            RgResourceKind::Buffer => rule.for_buffer,
            RgResourceKind::Image => rule.for_image,
        };
        if !allowed {
            return Err(RgAccessError::InvalidForKind { kind, flags });
        }

        match rule.kind {
            RgRuleKind::Stage(stage) => shader_stages |= stage,
            RgRuleKind::Role { read: read_effect, write: write_effect } => {
                if read {
                    // 读方向必定存在
                    roles.extend(read_effect);
                }
                if write {
                    match write_effect {
                        Some(effect) => roles.push(effect),
                        None => return Err(RgAccessError::ReadOnlyRole { flags }),
                    }
                }
            }
        }
    }

    if roles.is_empty() {
        return Err(RgAccessError::MissingRole { flags });
    }

    let mut result = RgInferredAccess::default();
    for effect in roles {
        match effect.stage {
            RgStageSource::Fixed(stage) => result.stage |= stage,
            RgStageSource::ShaderStages => {
                if shader_stages.is_empty() {
                    return Err(RgAccessError::MissingStage { flags });
                }
                result.stage |= shader_stages;
            }
        }
        result.access |= effect.access;
        result.buffer_usage |= effect.buffer_usage;
        result.image_usage |= effect.image_usage;
    }

    Ok(result)
}
