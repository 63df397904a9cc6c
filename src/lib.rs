//! Distributed physics coordination core: a stepped rigid-body simulation
//! with per-entity motion-state mediation and a priority-bid ownership
//! arbitration protocol for a shared virtual world (see `SPEC_FULL.md`).
//!
//! This crate is a library driven by an outer application: it owns no
//! network socket, render loop, or event loop of its own. The outer driver
//! calls `PhysicalEntitySimulation` once per tick, feeds it entity-change
//! notifications, and receives built `EntityEdit` packets through an
//! `EditPacketSender` implementation it supplies.

pub mod character_controller;
pub mod collision_groups;
pub mod config;
pub mod constants;
pub mod contacts;
pub mod dynamics;
pub mod engine;
pub mod entity;
pub mod error;
pub mod motion_state;
pub mod ownership_wire;
pub mod safe_landing;
pub mod shape_cache;
pub mod shape_factory;
pub mod shape_info;
pub mod simulation;
pub mod workload;

pub use config::{CharacterControllerConfig, PhysicsCoreConfig};
pub use engine::{get_session_uuid, set_session_uuid, PhysicsEngine};
pub use entity::{DirtyFlags, Entity, SimulationOwner};
pub use error::{PhysicsCoreError, Result};
pub use ownership_wire::{EditPacketSender, EntityEdit};
pub use simulation::{PhysicalEntitySimulation, TickHost};
