//! Local control input to sail physics.
//!
//! Control flags are written by the input side and read by the physics step.
//! Each flag is its own atomic; a momentary mix of old and new flags is fine.

use crate::entity::BoatAnimation;
use glam::{Quat, Vec3};
use shared::Transform;
use std::sync::atomic::{AtomicBool, Ordering};

/// Physics tunables for a sailing boat.
///
/// The thrust and rotation floors have no physical derivation; they are kept
/// as tunables so the boat never becomes inert.
#[derive(Debug, Clone, Copy)]
pub struct BoatTuning {
    pub mass: f32,
    /// Sensitivity change per second while forward/backward is held.
    pub sensitivity_rate: f32,
    pub min_sensitivity: f32,
    pub max_sensitivity: f32,
    pub initial_sensitivity: f32,
    pub min_wind_factor: f32,
    /// Wind contribution to thrust multiplier.
    pub thrust_scale: f32,
    pub min_thrust: f32,
    pub sail_strength: f32,
    /// Steering torque as a multiple of thrust.
    pub rotation_ratio: f32,
    pub min_rotation_speed: f32,
}

impl Default for BoatTuning {
    fn default() -> Self {
        Self {
            mass: 100.0,
            sensitivity_rate: 0.4,
            min_sensitivity: 0.1,
            max_sensitivity: 1.0,
            initial_sensitivity: 0.5,
            min_wind_factor: 0.6,
            thrust_scale: 450.0 / 3.6,
            min_thrust: 8024.0,
            sail_strength: 1.0,
            rotation_ratio: 2.0,
            min_rotation_speed: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Forward,
    Backward,
    SteerLeft,
    SteerRight,
}

/// Held control flags shared between the input and physics sides.
#[derive(Debug, Default)]
pub struct BoatControls {
    forward: AtomicBool,
    backward: AtomicBool,
    steer_left: AtomicBool,
    steer_right: AtomicBool,
}

impl BoatControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, action: ControlAction, pressed: bool) {
        let flag = match action {
            ControlAction::Forward => &self.forward,
            ControlAction::Backward => &self.backward,
            ControlAction::SteerLeft => &self.steer_left,
            ControlAction::SteerRight => &self.steer_right,
        };
        flag.store(pressed, Ordering::Relaxed);
    }

    pub fn forward(&self) -> bool {
        self.forward.load(Ordering::Relaxed)
    }

    pub fn backward(&self) -> bool {
        self.backward.load(Ordering::Relaxed)
    }

    pub fn steer_left(&self) -> bool {
        self.steer_left.load(Ordering::Relaxed)
    }

    pub fn steer_right(&self) -> bool {
        self.steer_right.load(Ordering::Relaxed)
    }
}

/// What the replication core needs from the physics engine.
pub trait RigidBody {
    fn transform(&self) -> Transform;
    fn linear_velocity(&self) -> Vec3;
    fn apply_force(&mut self, force: Vec3);
    fn apply_torque(&mut self, torque: Vec3);
}

/// Turns control flags and wind into forces, and derives the animation
/// blend factors that get replicated.
#[derive(Debug, Clone)]
pub struct SailDrive {
    tuning: BoatTuning,
    sensitivity: f32,
    wind_alignment: f32,
    wind_factor: f32,
    wind_strength: f32,
}

impl SailDrive {
    pub fn new(tuning: BoatTuning) -> Self {
        Self {
            sensitivity: tuning.initial_sensitivity,
            wind_alignment: 0.0,
            wind_factor: 1.0,
            wind_strength: 1.0,
            tuning,
        }
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn wind_alignment(&self) -> f32 {
        self.wind_alignment
    }

    pub fn wind_factor(&self) -> f32 {
        self.wind_factor
    }

    /// Per-frame update: ramps sail sensitivity, measures the wind and
    /// refreshes the animation factors.
    pub fn update(
        &mut self,
        tpf: f32,
        controls: &BoatControls,
        wind: Vec3,
        rotation: Quat,
        animation: &mut BoatAnimation,
    ) {
        let step = tpf * self.tuning.sensitivity_rate;
        if controls.forward() {
            self.sensitivity = (self.sensitivity + step).min(self.tuning.max_sensitivity);
        }
        if controls.backward() {
            self.sensitivity = (self.sensitivity - step).max(self.tuning.min_sensitivity);
        }

        let heading = rotation * Vec3::Z;
        self.wind_alignment = (wind.normalize_or_zero().dot(heading) + 1.0) / 2.0;
        self.wind_factor = self.wind_alignment.max(self.tuning.min_wind_factor);
        self.wind_strength = wind.length();

        animation.set_sail(1.0 - self.sensitivity, self.wind_alignment);
        animation.set_flag(1.0 - self.wind_alignment);
    }

    /// Forward force magnitude; the floor applies before sail trim.
    pub fn thrust(&self) -> f32 {
        let wind_contribution = self.wind_strength * self.wind_factor;
        (wind_contribution * self.tuning.thrust_scale).max(self.tuning.min_thrust)
            * self.tuning.sail_strength
            * self.sensitivity
    }

    pub fn rotation_speed(&self) -> f32 {
        (self.thrust() * self.tuning.rotation_ratio).max(self.tuning.min_rotation_speed)
    }

    /// Applies steering torque and forward thrust for one physics step.
    pub fn pre_physics_tick(&self, controls: &BoatControls, body: &mut impl RigidBody) {
        let rotation_speed = self.rotation_speed();

        // Opposite inputs are independent contributions and cancel out.
        if controls.steer_left() {
            body.apply_torque(Vec3::new(0.0, rotation_speed, 0.0));
        }
        if controls.steer_right() {
            body.apply_torque(Vec3::new(0.0, -rotation_speed, 0.0));
        }

        let mut direction = body.transform().rotation * Vec3::Z;
        direction.y = 0.0;
        body.apply_force(direction.normalize_or_zero() * self.thrust());
    }
}

/// Boat speed as shown to the player.
pub fn speed_kmh(velocity: Vec3) -> f32 {
    velocity.length() * 3.6
}

/// Damped rigid body on the water plane, standing in for a physics engine.
#[derive(Debug, Clone)]
pub struct KinematicHull {
    pub mass: f32,
    pub yaw_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    transform: Transform,
    velocity: Vec3,
    yaw_rate: f32,
    force: Vec3,
    torque: Vec3,
}

impl KinematicHull {
    pub fn new(mass: f32, spawn: Transform) -> Self {
        Self {
            mass,
            yaw_inertia: mass * 40.0,
            linear_damping: 0.8,
            angular_damping: 2.0,
            transform: spawn,
            velocity: Vec3::ZERO,
            yaw_rate: 0.0,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        }
    }

    /// Advances the body by `dt` seconds and clears accumulated forces.
    pub fn integrate(&mut self, dt: f32) {
        self.velocity += self.force / self.mass * dt;
        self.velocity *= (1.0 - self.linear_damping * dt).max(0.0);
        self.yaw_rate += self.torque.y / self.yaw_inertia * dt;
        self.yaw_rate *= (1.0 - self.angular_damping * dt).max(0.0);

        self.transform.translation += self.velocity * dt;
        self.transform.rotation =
            (Quat::from_rotation_y(self.yaw_rate * dt) * self.transform.rotation).normalize();

        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}

impl RigidBody for KinematicHull {
    fn transform(&self) -> Transform {
        self.transform
    }

    fn linear_velocity(&self) -> Vec3 {
        self.velocity
    }

    fn apply_force(&mut self, force: Vec3) {
        self.force += force;
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }
}
