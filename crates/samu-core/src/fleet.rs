//! 车辆与派遣记录模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Result, SamuError};
use crate::models::Coordinates;

/// 车辆类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VehicleType {
    Basic,      // 基础生命支持
    Advanced,   // 高级生命支持
    Icu,        // 移动ICU
    Air,        // 航空救护
    Motorcycle, // 摩托急救
}

impl VehicleType {
    /// 出车所需的最低机组角色
    pub fn minimum_crew(&self) -> &'static [CrewRole] {
        match self {
            VehicleType::Basic => &[CrewRole::Driver, CrewRole::Technician],
            VehicleType::Advanced => &[CrewRole::Driver, CrewRole::Physician, CrewRole::Nurse],
            VehicleType::Icu => &[
                CrewRole::Driver,
                CrewRole::Physician,
                CrewRole::Nurse,
                CrewRole::Technician,
            ],
            VehicleType::Air => &[CrewRole::Pilot, CrewRole::Physician, CrewRole::Nurse],
            VehicleType::Motorcycle => &[CrewRole::Technician],
        }
    }

    pub fn all() -> Vec<VehicleType> {
        vec![
            VehicleType::Basic,
            VehicleType::Advanced,
            VehicleType::Icu,
            VehicleType::Air,
            VehicleType::Motorcycle,
        ]
    }
}

/// 机组角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CrewRole {
    Driver,
    Pilot,
    Physician,
    Nurse,
    Technician,
}

/// 机组成员
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewMember {
    pub operator_id: Uuid,
    pub name: String,
    pub role: CrewRole,
    pub active: bool,
}

/// 设备状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EquipmentStatus {
    Operational,
    Maintenance,
    Expired,
    Unavailable,
}

/// 车载设备
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquipmentItem {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub status: EquipmentStatus,
    pub expires_on: Option<NaiveDate>,
    pub next_calibration_on: Option<NaiveDate>,
}

impl EquipmentItem {
    pub fn operational(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            status: EquipmentStatus::Operational,
            expires_on: None,
            next_calibration_on: None,
        }
    }

    /// 状态为可用且未过期
    pub fn is_operational(&self, today: NaiveDate) -> bool {
        self.status == EquipmentStatus::Operational
            && self.expires_on.map_or(true, |expires| expires >= today)
    }

    /// 15天内需要校准
    pub fn needs_calibration(&self, today: NaiveDate) -> bool {
        self.next_calibration_on
            .map_or(false, |date| date < today + chrono::Duration::days(15))
    }
}

/// 车辆全局状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VehicleStatus {
    Available,    // 待命
    EnRoute,      // 前往现场
    AtScene,      // 到达现场
    Transporting, // 转运中
    Maintenance,  // 维护
    Broken,       // 故障
    Unavailable,  // 暂不可用
}

impl VehicleStatus {
    /// 执行任务中的状态
    pub fn is_operating(&self) -> bool {
        matches!(
            self,
            VehicleStatus::EnRoute | VehicleStatus::AtScene | VehicleStatus::Transporting
        )
    }

    /// 行政状态，可在任何状态下设置
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            VehicleStatus::Maintenance | VehicleStatus::Broken | VehicleStatus::Unavailable
        )
    }

    /// 在该状态下的最长预期停留时间（分钟），None 表示不限
    pub fn max_dwell_minutes(&self) -> Option<i64> {
        match self {
            VehicleStatus::Available => None,
            VehicleStatus::EnRoute => Some(30),
            VehicleStatus::AtScene => Some(45),
            VehicleStatus::Transporting => Some(60),
            VehicleStatus::Maintenance => Some(480),
            VehicleStatus::Broken => None,
            VehicleStatus::Unavailable => Some(120),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "AVAILABLE",
            VehicleStatus::EnRoute => "EN_ROUTE",
            VehicleStatus::AtScene => "AT_SCENE",
            VehicleStatus::Transporting => "TRANSPORTING",
            VehicleStatus::Maintenance => "MAINTENANCE",
            VehicleStatus::Broken => "BROKEN",
            VehicleStatus::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn all() -> Vec<VehicleStatus> {
        vec![
            VehicleStatus::Available,
            VehicleStatus::EnRoute,
            VehicleStatus::AtScene,
            VehicleStatus::Transporting,
            VehicleStatus::Maintenance,
            VehicleStatus::Broken,
            VehicleStatus::Unavailable,
        ]
    }
}

/// 派遣记录本地状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssignmentStatus {
    EnRoute,
    AtScene,
    Transporting,
    Released,  // 正常释放回基地
    Withdrawn, // 因行政状态变更而撤回
}

impl AssignmentStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, AssignmentStatus::Released | AssignmentStatus::Withdrawn)
    }

    /// 执勤中对应的车辆全局状态
    pub fn vehicle_status(&self) -> Option<VehicleStatus> {
        match self {
            AssignmentStatus::EnRoute => Some(VehicleStatus::EnRoute),
            AssignmentStatus::AtScene => Some(VehicleStatus::AtScene),
            AssignmentStatus::Transporting => Some(VehicleStatus::Transporting),
            AssignmentStatus::Released | AssignmentStatus::Withdrawn => None,
        }
    }

    pub fn from_vehicle_status(status: VehicleStatus) -> Option<Self> {
        match status {
            VehicleStatus::EnRoute => Some(AssignmentStatus::EnRoute),
            VehicleStatus::AtScene => Some(AssignmentStatus::AtScene),
            VehicleStatus::Transporting => Some(AssignmentStatus::Transporting),
            _ => None,
        }
    }
}

/// 车辆当前执勤信息
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Duty {
    pub assignment_id: Uuid,
    pub occurrence_id: Uuid,
    pub status: AssignmentStatus,
}

/// 车辆档案
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub base_id: Uuid,
    pub base_location: Option<Coordinates>,
    /// 不执勤时的状态
    pub standby_status: VehicleStatus,
    pub duty: Option<Duty>,
    pub crew: Vec<CrewMember>,
    pub equipment: Vec<EquipmentItem>,
    pub odometer_km: u32,
    pub fuel_percent: f32,
    pub notes: String,
    pub active: bool,
    pub status_since: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(
        plate: impl Into<String>,
        vehicle_type: VehicleType,
        base_id: Uuid,
        base_location: Option<Coordinates>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plate: plate.into(),
            vehicle_type,
            base_id,
            base_location,
            standby_status: VehicleStatus::Available,
            duty: None,
            crew: Vec::new(),
            equipment: Vec::new(),
            odometer_km: 0,
            fuel_percent: 100.0,
            notes: String::new(),
            active: true,
            status_since: Utc::now(),
        }
    }

    /// 全局状态：执勤时由派遣记录决定，否则为待命状态
    pub fn status(&self) -> VehicleStatus {
        self.duty
            .and_then(|duty| duty.status.vehicle_status())
            .unwrap_or(self.standby_status)
    }

    pub fn is_dispatchable(&self) -> bool {
        self.active && self.duty.is_none() && self.status() == VehicleStatus::Available
    }

    pub fn active_roles(&self) -> HashSet<CrewRole> {
        self.crew.iter().filter(|c| c.active).map(|c| c.role).collect()
    }

    /// 已到岗的最低机组角色比例
    pub fn crew_completeness(&self) -> f64 {
        let required = self.vehicle_type.minimum_crew();
        if required.is_empty() {
            return 1.0;
        }
        let active = self.active_roles();
        let present = required.iter().filter(|role| active.contains(*role)).count();
        present as f64 / required.len() as f64
    }

    /// 可用设备比例，没有设备时为 None
    pub fn operational_equipment_ratio(&self, today: NaiveDate) -> Option<f64> {
        if self.equipment.is_empty() {
            return None;
        }
        let ok = self
            .equipment
            .iter()
            .filter(|item| item.is_operational(today))
            .count();
        Some(ok as f64 / self.equipment.len() as f64)
    }

    pub fn crew_member(&self, role: CrewRole) -> Option<Uuid> {
        self.crew
            .iter()
            .find(|c| c.active && c.role == role)
            .map(|c| c.operator_id)
    }
}

/// 时间线节点，按发生顺序排列
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimelineStep {
    Dispatched,
    DepartedBase,
    ArrivedAtScene,
    DepartedScene,
    ArrivedAtFacility,
    Released,
}

/// 派遣时间线
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssignmentTimeline {
    pub dispatched_at: Option<DateTime<Utc>>,
    pub departed_base_at: Option<DateTime<Utc>>,
    pub arrived_scene_at: Option<DateTime<Utc>>,
    pub departed_scene_at: Option<DateTime<Utc>>,
    pub arrived_facility_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl AssignmentTimeline {
    const STEPS: [TimelineStep; 6] = [
        TimelineStep::Dispatched,
        TimelineStep::DepartedBase,
        TimelineStep::ArrivedAtScene,
        TimelineStep::DepartedScene,
        TimelineStep::ArrivedAtFacility,
        TimelineStep::Released,
    ];

    pub fn get(&self, step: TimelineStep) -> Option<DateTime<Utc>> {
        match step {
            TimelineStep::Dispatched => self.dispatched_at,
            TimelineStep::DepartedBase => self.departed_base_at,
            TimelineStep::ArrivedAtScene => self.arrived_scene_at,
            TimelineStep::DepartedScene => self.departed_scene_at,
            TimelineStep::ArrivedAtFacility => self.arrived_facility_at,
            TimelineStep::Released => self.released_at,
        }
    }

    fn slot(&mut self, step: TimelineStep) -> &mut Option<DateTime<Utc>> {
        match step {
            TimelineStep::Dispatched => &mut self.dispatched_at,
            TimelineStep::DepartedBase => &mut self.departed_base_at,
            TimelineStep::ArrivedAtScene => &mut self.arrived_scene_at,
            TimelineStep::DepartedScene => &mut self.departed_scene_at,
            TimelineStep::ArrivedAtFacility => &mut self.arrived_facility_at,
            TimelineStep::Released => &mut self.released_at,
        }
    }

    /// 记录时间节点；已记录的节点之间必须单调不减
    pub fn stamp(&mut self, step: TimelineStep, at: DateTime<Utc>) -> Result<()> {
        if self.get(step).is_some() {
            return Err(SamuError::Validation(format!(
                "timeline step {:?} already recorded",
                step
            )));
        }
        for other in Self::STEPS {
            let Some(recorded) = self.get(other) else {
                continue;
            };
            if (other < step && recorded > at) || (other > step && recorded < at) {
                return Err(SamuError::Validation(format!(
                    "timeline step {:?} at {} conflicts with {:?} at {}",
                    step, at, other, recorded
                )));
            }
        }
        *self.slot(step) = Some(at);
        Ok(())
    }

    /// 最近一次记录的时间
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        Self::STEPS.iter().filter_map(|step| self.get(*step)).max()
    }

    pub fn is_monotonic(&self) -> bool {
        let stamps: Vec<_> = Self::STEPS.iter().filter_map(|step| self.get(*step)).collect();
        stamps.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

/// 派遣时的机组
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssignedCrew {
    pub driver: Option<Uuid>,
    pub physician: Option<Uuid>,
    pub nurse: Option<Uuid>,
    pub technician: Option<Uuid>,
}

impl AssignedCrew {
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        Self {
            driver: vehicle
                .crew_member(CrewRole::Driver)
                .or_else(|| vehicle.crew_member(CrewRole::Pilot)),
            physician: vehicle.crew_member(CrewRole::Physician),
            nurse: vehicle.crew_member(CrewRole::Nurse),
            technician: vehicle.crew_member(CrewRole::Technician),
        }
    }
}

/// 一辆车参与一个事件的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleAssignment {
    pub id: Uuid,
    pub occurrence_id: Uuid,
    pub vehicle_id: Uuid,
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub status: AssignmentStatus,
    pub timeline: AssignmentTimeline,
    pub position: Option<Coordinates>,
    pub crew: AssignedCrew,
    pub odometer_start: u32,
    pub odometer_end: Option<u32>,
    pub rating: Option<u8>, // 1-5
    pub complications: Option<String>,
}

/// 登记新车辆
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVehicle {
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub base_id: Uuid,
    pub base_location: Option<Coordinates>,
    pub crew: Vec<CrewMember>,
    pub equipment: Vec<EquipmentItem>,
    pub odometer_km: u32,
    pub fuel_percent: f32,
    pub notes: Option<String>,
}

impl NewVehicle {
    pub fn validate(&self) -> Result<()> {
        if self.plate.trim().is_empty() {
            return Err(SamuError::Validation("plate is required".to_string()));
        }
        if !(0.0..=100.0).contains(&self.fuel_percent) {
            return Err(SamuError::Validation(format!(
                "fuel level out of range: {}",
                self.fuel_percent
            )));
        }
        if let Some(location) = &self.base_location {
            location.validate()?;
        }
        Ok(())
    }

    pub fn into_vehicle(self, now: DateTime<Utc>) -> Vehicle {
        Vehicle {
            id: Uuid::new_v4(),
            plate: self.plate,
            vehicle_type: self.vehicle_type,
            base_id: self.base_id,
            base_location: self.base_location,
            standby_status: VehicleStatus::Available,
            duty: None,
            crew: self.crew,
            equipment: self.equipment,
            odometer_km: self.odometer_km,
            fuel_percent: self.fuel_percent,
            notes: self.notes.unwrap_or_default(),
            active: true,
            status_since: now,
        }
    }
}
