//! 重定向配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 新建 HandRig 时读取一次全局配置；也可通过 `HandRig::with_config` 显式传入。

use once_cell::sync::Lazy;
use std::sync::RwLock;

use super::CollisionDetection;

/// 重定向配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetConfig {
    // ========== 模拟参数 ==========
    /// 固定物理步长（秒），默认 1/60
    pub fixed_timestep: f32,

    // ========== 速度限制 ==========
    /// 每个关节的最大线速度 (m/s)，默认 5.0
    pub max_linear_velocity: f32,
    /// 每个关节的最大角速度 (rad/s)，默认 2.0
    pub max_angular_velocity: f32,
    /// 最大穿透修正速度 (m/s)，默认 3.0
    pub max_depenetration_velocity: f32,

    // ========== 刚体参数 ==========
    /// 角速度阻尼，默认 1.0
    pub angular_damping: f32,
    /// 链根质量缩放，默认 10.0
    pub root_mass_scale: f32,
    /// 碰撞检测精度，默认连续（推测式）
    pub collision_detection: CollisionDetection,

    // ========== 关节限位 ==========
    /// 球关节外展/内收限位（度），默认 ±5
    pub ball_abduction_limit_deg: f32,

    // ========== 碰撞体 ==========
    /// 手指胶囊半径 (m)，默认 0.008
    pub capsule_radius: f32,
    /// 胶囊高度 = 到子节点距离 × 该系数，默认 1.5
    pub capsule_length_factor: f32,

    // ========== 误差监测 ==========
    /// 位置误差超过此值 (m) 视为发散，默认 0.5
    pub position_error_threshold: f32,

    // ========== 写入方式 ==========
    /// 是否整条链一次性写入驱动目标，默认 false
    pub batch_drive_writes: bool,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            // ====== 模拟参数 ======
            fixed_timestep: 1.0 / 60.0,

            // ====== 速度限制 ======
            // 求解器自带的速度上限在手动设置速度时不可靠，每步手动钳制
            max_linear_velocity: 5.0,
            max_angular_velocity: 2.0,
            max_depenetration_velocity: 3.0,

            // ====== 刚体参数 ======
            angular_damping: 1.0,
            // 根质量远大于手指，手指碰撞时不会把整只手推开
            root_mass_scale: 10.0,
            collision_detection: CollisionDetection::ContinuousSpeculative,

            // ====== 关节限位 ======
            ball_abduction_limit_deg: 5.0,

            // ====== 碰撞体 ======
            capsule_radius: 0.008,
            capsule_length_factor: 1.5,

            // ====== 误差监测 ======
            position_error_threshold: 0.5,

            // ====== 写入方式 ======
            batch_drive_writes: false,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static RETARGET_CONFIG: Lazy<RwLock<RetargetConfig>> = Lazy::new(|| {
    RwLock::new(RetargetConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> RetargetConfig {
    RETARGET_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: RetargetConfig) {
    *RETARGET_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *RETARGET_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = RetargetConfig::default();
}
