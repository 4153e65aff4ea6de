use super::resource_handle::RgResourceKey;

/// 编译 / 执行阶段的致命错误
///
/// 遇到这些错误时整帧放弃，不会产生部分生效的 barrier。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RgCompileError {
    /// 依赖图中存在环，`pass` 为环上的一个 Pass
    #[error("render graph contains a cyclic dependency through pass \"{pass}\"")]
    CyclicDependency { pass: String },
    /// 同一个资源版本被两个 Pass 同时写入
    #[error("resource \"{resource}\" v{version} is produced by both \"{first_pass}\" and \"{second_pass}\"")]
    ConflictingProducers { resource: String, version: u16, first_pass: String, second_pass: String },
    /// 同一帧内重复编译
    #[error("render graph is already compiled for this frame")]
    AlreadyCompiled,
    /// 执行前没有编译
    #[error("render graph must be compiled before execution")]
    NotCompiled,
}

impl RgCompileError {
    pub(crate) fn conflicting(resource: String, key: RgResourceKey, first_pass: String, second_pass: String) -> Self {
        let resource = match key.subview {
            Some(subview) => format!("{resource}/{subview}"),
            None => resource,
        };
        Self::ConflictingProducers { resource, version: key.version, first_pass, second_pass }
    }
}
