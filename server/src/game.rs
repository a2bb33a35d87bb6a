//! Minimal world simulation driving avatar positions and freeze state

use crate::ids::RealId;
use log::info;
use shared::{InputState, FLOOR_Y, GRAVITY, JUMP_VELOCITY, PLAYER_SIZE, PLAYER_SPEED, WORLD_WIDTH};
use std::collections::HashMap;

/// What the session layer needs to know about the world
pub trait WorldView {
    /// Position of the participant's avatar, if it has one
    fn position(&self, id: RealId) -> Option<(f32, f32)>;
    /// True while the avatar is in a state the participant may not leave
    fn is_frozen(&self, id: RealId) -> bool;
}

#[derive(Debug, Clone)]
pub struct Avatar {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub on_ground: bool,
    /// Ticks left frozen; frozen avatars ignore input
    pub frozen_ticks: u32,
}

impl Avatar {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            on_ground: true,
            frozen_ticks: 0,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_ticks > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub tick: u64,
    pub avatars: HashMap<RealId, Avatar>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_avatar(&mut self, id: RealId) {
        let spawn_x = 100.0 + (id.index() as f32 * 60.0) % (WORLD_WIDTH - 200.0);
        let spawn_y = FLOOR_Y - PLAYER_SIZE;

        info!("Spawned avatar {} at ({}, {})", id, spawn_x, spawn_y);
        self.avatars.insert(id, Avatar::new(spawn_x, spawn_y));
    }

    pub fn remove_avatar(&mut self, id: RealId) {
        if self.avatars.remove(&id).is_some() {
            info!("Removed avatar {}", id);
        }
    }

    /// Freezes an avatar for `ticks`; unknown ids are ignored
    pub fn freeze(&mut self, id: RealId, ticks: u32) -> bool {
        match self.avatars.get_mut(&id) {
            Some(avatar) => {
                avatar.frozen_ticks = ticks;
                avatar.vel_x = 0.0;
                true
            }
            None => false,
        }
    }

    pub fn apply_input(&mut self, id: RealId, input: &InputState) {
        if let Some(avatar) = self.avatars.get_mut(&id) {
            if avatar.is_frozen() {
                return;
            }

            avatar.vel_x = 0.0;
            if input.left {
                avatar.vel_x -= PLAYER_SPEED;
            }
            if input.right {
                avatar.vel_x += PLAYER_SPEED;
            }

            if input.jump && avatar.on_ground {
                avatar.vel_y = JUMP_VELOCITY;
                avatar.on_ground = false;
            }
        }
    }

    /// Advances gravity, movement and freeze timers by `dt` seconds
    pub fn update_physics(&mut self, dt: f32) {
        for avatar in self.avatars.values_mut() {
            avatar.frozen_ticks = avatar.frozen_ticks.saturating_sub(1);

            if !avatar.on_ground {
                avatar.vel_y += GRAVITY * dt;
            }

            avatar.x += avatar.vel_x * dt;
            avatar.y += avatar.vel_y * dt;

            avatar.x = avatar.x.clamp(0.0, WORLD_WIDTH - PLAYER_SIZE);

            if avatar.y + PLAYER_SIZE >= FLOOR_Y {
                avatar.y = FLOOR_Y - PLAYER_SIZE;
                avatar.vel_y = 0.0;
                avatar.on_ground = true;
            }

            if avatar.y <= 0.0 {
                avatar.y = 0.0;
                avatar.vel_y = 0.0;
            }
        }
    }
}

impl WorldView for GameState {
    fn position(&self, id: RealId) -> Option<(f32, f32)> {
        self.avatars.get(&id).map(|a| (a.x, a.y))
    }

    fn is_frozen(&self, id: RealId) -> bool {
        self.avatars.get(&id).is_some_and(Avatar::is_frozen)
    }
}
