//! 任务目录：观众端 key → 任务描述
//!
//! 内置两类场景（自动降落、货物投递），各有端到端（E2E）与分阶段（S2S）版本。
//! 未知 key 属于配置错误，任务不会启动。

use std::collections::HashMap;
use std::sync::Arc;

use crate::control::Pose;
use crate::core::MissionError;

use super::descriptor::{CompletionRule, MissionDescriptor};
use super::geometry::{Polygon, BRUCE_PORT, CARGO_SHIP_AREA, CARRIER_AREA, SEA_AREA_X1};
use super::prompts::{self, PromptTemplate};
use super::Mission;

/// 内置任务类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionKind {
    LandOnShip,
    FlyToSeaArea,
    SearchForShip,
    ApproachShip,
    Delivery,
    DeliveryFlyToPort,
    DeliverySearchForShip,
    DeliveryApproachShip,
}

impl MissionKind {
    pub const ALL: [MissionKind; 8] = [
        Self::LandOnShip,
        Self::FlyToSeaArea,
        Self::SearchForShip,
        Self::ApproachShip,
        Self::Delivery,
        Self::DeliveryFlyToPort,
        Self::DeliverySearchForShip,
        Self::DeliveryApproachShip,
    ];

    /// 观众端发来的任务 key
    pub fn key(&self) -> &'static str {
        match self {
            Self::LandOnShip => "drone_landing",
            Self::FlyToSeaArea => "fly_to_sea_area",
            Self::SearchForShip => "search_for_target",
            Self::ApproachShip => "approach_target",
            Self::Delivery => "delivery",
            Self::DeliveryFlyToPort => "delivery_fly_to_port",
            Self::DeliverySearchForShip => "delivery_search_for_ship",
            Self::DeliveryApproachShip => "delivery_approach_ship",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// 构建该类型的任务描述；threshold 为掩码占比阈值
    pub fn descriptor(&self, threshold: f64) -> MissionDescriptor {
        let terminal = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let both = terminal(&["task_complete", "land"]);
        let complete_only = terminal(&["task_complete"]);
        let not_above_carrier = "\n\nNOTE: The drone is currently NOT directly above the aircraft carrier, do NOT choose to perform a landing operation!!!";
        let carrier_not_in_view = "\n\nNOTE: The aircraft carrier is NOT within the current view, which means the task is not completed yet.";

        let (name, description, template, force_prompt, terminal_actions, initial_pose, completion) = match self {
            Self::LandOnShip => (
                "LandOnShip",
                "Controlling the drone to land on the aircraft carrier at Sea Area X1",
                PromptTemplate::EndToEnd(prompts::LAND_ON_SHIP_PLAN),
                not_above_carrier,
                both,
                None,
                CompletionRule::InsideArea {
                    area: Polygon::new(CARRIER_AREA),
                    require_downward: false,
                },
            ),
            Self::FlyToSeaArea => (
                "FlyToSeaAreaX1",
                "Controlling the drone to fly to Sea Area X1",
                PromptTemplate::Stage(prompts::FLY_TO_SEA_AREA),
                "\n\nNOTE: The drone is currently NOT within Sea Area X1, which means the task is not completed yet.",
                both,
                None,
                CompletionRule::NearPoint {
                    center: SEA_AREA_X1,
                    radius: 50.0,
                },
            ),
            Self::SearchForShip => (
                "SearchForShip",
                "Controlling the drone to search for an aircraft carrier in Sea Area X1",
                PromptTemplate::Stage(prompts::SEARCH_FOR_SHIP),
                carrier_not_in_view,
                both,
                None,
                CompletionRule::MaskRatio { threshold },
            ),
            Self::ApproachShip => (
                "ApproachShip",
                "Controlling the drone to approach an aircraft carrier in Sea Area X1",
                PromptTemplate::Stage(prompts::APPROACH_SHIP),
                carrier_not_in_view,
                both,
                None,
                CompletionRule::CenterMaskRatio { threshold },
            ),
            Self::Delivery => (
                "DeliveryCargo",
                "Controlling a drone to deliver cargo to a red cargo ship with many containers of goods docked in the Bruce Port",
                PromptTemplate::EndToEnd(prompts::DELIVERY_PLAN),
                "\n\nNOTE:The drone is NOT currently directly above the target cargo ship, do NOT choose to perform a landing operation!!!",
                both,
                Some(Pose::new([0.0, 0.0, -2.0], [0.0, 0.0, 1.0, 0.0])),
                CompletionRule::InsideArea {
                    area: Polygon::new(CARGO_SHIP_AREA),
                    require_downward: true,
                },
            ),
            Self::DeliveryFlyToPort => (
                "FlyToBrucePort",
                "Controlling the drone to fly to Bruce Port",
                PromptTemplate::Stage(prompts::FLY_TO_PORT),
                "\n\nNOTE: The drone is currently NOT within Bruce Port, which means the task is NOT completed yet.",
                complete_only,
                Some(Pose::new([0.0, 0.0, -2.0], [0.0, 0.0, 1.0, 0.0])),
                CompletionRule::InsideArea {
                    area: Polygon::new(BRUCE_PORT),
                    require_downward: false,
                },
            ),
            Self::DeliverySearchForShip => (
                "SearchForShip",
                "Controlling the drone to search for a ship in Bruce Port",
                PromptTemplate::Stage(prompts::SEARCH_FOR_SHIP),
                "\n\nNOTE: The cargo ship is currently NOT within the drone's view, which means the task is NOT completed yet.",
                complete_only,
                Some(Pose::new([-2400.0, 400.0, -120.0], [0.0, 0.0, 1.0, 0.0])),
                CompletionRule::MaskPixels { min: 100 },
            ),
            Self::DeliveryApproachShip => (
                "ApproachShip",
                "Controlling the drone to fly directly above the ship in Bruce Port",
                PromptTemplate::Stage(prompts::APPROACH_SHIP),
                "\n\nNOTE: The drone is currently NOT above the ship, which means the task is not completed yet. Do NOT choose to perform a landing operation!!!",
                both,
                Some(Pose::new([-2400.0, 380.0, -120.0], [0.0, 0.0, 1.0, 1.0])),
                CompletionRule::InsideArea {
                    area: Polygon::new(CARGO_SHIP_AREA),
                    require_downward: true,
                },
            ),
        };

        MissionDescriptor {
            key: self.key().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            template,
            force_prompt: force_prompt.to_string(),
            terminal_actions,
            initial_pose,
            completion,
        }
    }
}

/// 任务目录（字符串 key → 任务）
#[derive(Clone, Default)]
pub struct MissionCatalog {
    missions: HashMap<String, Arc<dyn Mission>>,
}

impl MissionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部内置任务
    pub fn builtin(threshold: f64) -> Self {
        let mut catalog = Self::new();
        for kind in MissionKind::ALL {
            catalog.register(Arc::new(kind.descriptor(threshold)));
        }
        catalog
    }

    /// 以任务自身的 key 注册（同 key 覆盖）
    pub fn register(&mut self, mission: Arc<dyn Mission>) {
        self.missions.insert(mission.key().to_string(), mission);
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Mission>, MissionError> {
        self.missions
            .get(key)
            .cloned()
            .ok_or_else(|| MissionError::UnknownMission(key.to_string()))
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.missions.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for MissionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionCatalog").field("keys", &self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip_for_every_kind() {
        for kind in MissionKind::ALL {
            assert_eq!(MissionKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(MissionKind::from_key("LandOnShip"), None);
    }

    #[test]
    fn test_builtin_catalog_resolves_all_keys() {
        let catalog = MissionCatalog::builtin(0.015);
        assert_eq!(catalog.keys().len(), 8);
        let landing = catalog.resolve("drone_landing").unwrap();
        assert_eq!(landing.name(), "LandOnShip");
        assert!(landing.is_terminal("land"));
        assert!(landing.is_terminal("task_complete"));
        assert!(!landing.is_terminal("move_forward"));
        assert!(landing.initial_pose().is_none());
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        let catalog = MissionCatalog::builtin(0.015);
        let err = catalog.resolve("rescue_cat").err().unwrap();
        assert_eq!(err, MissionError::UnknownMission("rescue_cat".to_string()));
    }

    #[test]
    fn test_delivery_stages_carry_initial_pose() {
        let port = MissionKind::DeliveryFlyToPort.descriptor(0.015);
        assert_eq!(port.terminal_actions, vec!["task_complete".to_string()]);
        let pose = port.initial_pose.unwrap();
        assert_eq!(pose.position, Some([0.0, 0.0, -2.0]));
        // 任务文件中的朝向随位姿一起下发
        assert_eq!(pose.orientation, Some([0.0, 0.0, 1.0, 0.0]));
    }
}
