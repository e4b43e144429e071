//! 重定向演示（无窗口）
//!
//! 用模板骨架构建主/从两只右手，主手做握拳动画，从手通过运动学世界追随。
//! 运行：RUST_LOG=info cargo run --features demo --bin retarget_demo

use glam::{Quat, Vec3};

use articulation_hand::hand::mapper::bone_name;
use articulation_hand::hand::template::build_hand_skeleton;
use articulation_hand::physics::get_config;
use articulation_hand::{HandJointId, HandRig, Handedness, KinematicWorld, PoseSource, TickReport};

/// 演示时长（秒）
const DURATION: f32 = 2.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let handedness = Handedness::Right;
    let (mut master, master_root) = build_hand_skeleton(handedness);
    let (slave, slave_root) = build_hand_skeleton(handedness);

    let config = get_config();
    let dt = config.fixed_timestep;
    let mut rig = HandRig::with_config(handedness, master_root, slave_root, config);
    let mut world = KinematicWorld::new();

    if let Err(e) = rig.setup(&master, &slave, &mut world) {
        log::error!("[Demo] setup 失败: {}", e);
        std::process::exit(1);
    }

    // 握拳动画涉及的骨骼
    let curl: Vec<_> = HandJointId::fingers()
        .filter(|id| !id.is_thumb())
        .filter_map(|id| master.find_child_recursive(master_root, &bone_name(id, handedness)))
        .collect();
    let wrist = master.find_child_recursive(master_root, &bone_name(HandJointId::WristRoot, handedness));

    let steps = (DURATION / dt).round() as usize;
    let mut last = TickReport::default();
    for i in 0..steps {
        let t = i as f32 * dt;
        let phase = (t / DURATION * std::f32::consts::PI).sin();

        // 右手锚点把屈伸轴对到 -Z
        for node in &curl {
            master.set_local_rotation(*node, Quat::from_rotation_z(-phase * 1.2));
        }
        if let Some(wrist) = wrist {
            master.set_local_translation(wrist, Vec3::new(0.0, 0.05 * phase, 0.0));
        }

        match rig.fixed_update(&master, &mut world, dt) {
            Ok(report) => last = report,
            Err(e) => {
                log::error!("[Demo] 第 {} 步失败: {}", i, e);
                std::process::exit(1);
            }
        }
        world.step(dt);

        if i % 30 == 0 {
            log::info!(
                "[Demo] t={:.2}s 最大位置误差 {:.4} m, 发散关节 {}",
                t,
                last.max_position_error(),
                last.diverged.len()
            );
        }
    }

    log::info!(
        "[Demo] 完成: {} 步, {} 个刚体, {} 个碰撞体, {} 对忽略接触",
        steps,
        world.body_count(),
        world.collider_count(),
        world.ignored_pairs().len()
    );
}
