//! 车辆登记与就绪度评分

use chrono::{NaiveDate, Utc};
use samu_core::collaborators::Collaborators;
use samu_core::utils::haversine_km;
use samu_core::{
    Coordinates, CrewMember, EquipmentItem, NewVehicle, Result, SamuError,
    Vehicle, VehicleStatus, VehicleType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::notification::{Audience, Notification, NotificationBus};
use crate::occurrence::Cell;
use crate::settings::ReadinessSettings;

/// 就绪度评分：状态 40、机组 30、设备 20、油量 10，满分 100
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    settings: ReadinessSettings,
}

impl ReadinessPolicy {
    const STATUS_WEIGHT: f64 = 40.0;
    const CREW_WEIGHT: f64 = 30.0;
    const EQUIPMENT_WEIGHT: f64 = 20.0;
    const FUEL_WEIGHT: f64 = 10.0;

    pub fn new(settings: ReadinessSettings) -> Self {
        Self { settings }
    }

    pub fn score(&self, vehicle: &Vehicle, today: NaiveDate) -> f64 {
        if !vehicle.active {
            return 0.0;
        }

        let status = vehicle.status();
        let status_score = if status == VehicleStatus::Available {
            Self::STATUS_WEIGHT
        } else if status.is_operating() {
            Self::STATUS_WEIGHT / 2.0
        } else {
            0.0
        };

        let crew_score = Self::CREW_WEIGHT * vehicle.crew_completeness().min(1.0);

        let equipment_score = vehicle
            .operational_equipment_ratio(today)
            .map_or(0.0, |ratio| Self::EQUIPMENT_WEIGHT * ratio);

        let fuel_score = if vehicle.fuel_percent > self.settings.fuel_high_percent {
            Self::FUEL_WEIGHT
        } else if vehicle.fuel_percent > self.settings.fuel_low_percent {
            Self::FUEL_WEIGHT / 2.0
        } else {
            0.0
        };

        (status_score + crew_score + equipment_score + fuel_score).min(100.0)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(ReadinessSettings::default())
    }
}

/// 候选车辆查询
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub vehicle_type: VehicleType,
    /// 事件坐标；为空时不按距离过滤
    pub near: Option<Coordinates>,
    pub max_distance_km: f64,
}

/// 候选车辆
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub vehicle_id: Uuid,
    pub plate: String,
    pub score: f64,
    pub distance_km: Option<f64>,
}

/// 车辆列表过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleFilter {
    pub statuses: Option<Vec<VehicleStatus>>,
    pub vehicle_types: Option<Vec<VehicleType>>,
    pub base_id: Option<Uuid>,
    pub include_inactive: bool,
}

/// 车辆登记
#[derive(Debug)]
pub struct VehicleRegistry {
    cells: RwLock<HashMap<Uuid, Cell<Vehicle>>>,
    published: RwLock<HashMap<Uuid, Vehicle>>,
    readiness: ReadinessPolicy,
    bus: NotificationBus,
    collaborators: Collaborators,
}

impl VehicleRegistry {
    pub fn new(readiness: ReadinessPolicy, bus: NotificationBus, collaborators: Collaborators) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            published: RwLock::new(HashMap::new()),
            readiness,
            bus,
            collaborators,
        }
    }

    /// 登记车辆
    pub async fn register_vehicle(&self, request: NewVehicle) -> Result<Vehicle> {
        request.validate()?;
        // 车牌检查与插入在同一把写锁内完成
        let mut cells = self.cells.write().await;
        let duplicate = self
            .published
            .read()
            .await
            .values()
            .any(|v| v.active && v.plate.eq_ignore_ascii_case(&request.plate));
        if duplicate {
            return Err(SamuError::Validation(format!(
                "vehicle with plate {} already registered",
                request.plate
            )));
        }

        let vehicle = request.into_vehicle(Utc::now());
        self.persist(&vehicle).await?;

        cells.insert(vehicle.id, Arc::new(Mutex::new(vehicle.clone())));
        self.publish_snapshot(&vehicle).await;
        drop(cells);
        self.bus.publish(Notification::for_vehicle(
            &vehicle,
            "vehicle-registered",
            vec![Audience::Fleet],
        ));

        tracing::info!(
            "Registered vehicle {} ({:?}) at base {}",
            vehicle.plate,
            vehicle.vehicle_type,
            vehicle.base_id
        );
        Ok(vehicle)
    }

    /// 更新机组名单
    pub async fn update_crew(&self, vehicle_id: Uuid, crew: Vec<CrewMember>) -> Result<Vehicle> {
        self.apply(vehicle_id, "vehicle-crew-updated", |vehicle| {
            vehicle.crew = crew;
            Ok(())
        })
        .await
    }

    /// 更新设备清单
    pub async fn update_equipment(
        &self,
        vehicle_id: Uuid,
        equipment: Vec<EquipmentItem>,
    ) -> Result<Vehicle> {
        self.apply(vehicle_id, "vehicle-equipment-updated", |vehicle| {
            vehicle.equipment = equipment;
            Ok(())
        })
        .await
    }

    /// 更新油量和里程
    pub async fn update_fuel(
        &self,
        vehicle_id: Uuid,
        fuel_percent: f32,
        odometer_km: Option<u32>,
    ) -> Result<Vehicle> {
        if !(0.0..=100.0).contains(&fuel_percent) {
            return Err(SamuError::Validation(format!(
                "fuel level out of range: {}",
                fuel_percent
            )));
        }
        self.apply(vehicle_id, "vehicle-fuel-updated", |vehicle| {
            if let Some(odometer) = odometer_km {
                if odometer < vehicle.odometer_km {
                    return Err(SamuError::Validation(format!(
                        "odometer cannot go back from {} to {}",
                        vehicle.odometer_km, odometer
                    )));
                }
                vehicle.odometer_km = odometer;
            }
            vehicle.fuel_percent = fuel_percent;
            Ok(())
        })
        .await
    }

    /// 停用车辆
    pub async fn decommission(&self, vehicle_id: Uuid) -> Result<Vehicle> {
        self.apply(vehicle_id, "vehicle-decommissioned", |vehicle| {
            if vehicle.duty.is_some() {
                return Err(SamuError::vehicle_not_available(
                    vehicle.id,
                    "vehicle holds an active assignment",
                ));
            }
            vehicle.active = false;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, vehicle_id: Uuid) -> Result<Vehicle> {
        self.published
            .read()
            .await
            .get(&vehicle_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("vehicle", vehicle_id))
    }

    pub async fn list(&self, filter: &VehicleFilter) -> Vec<Vehicle> {
        let published = self.published.read().await;
        let mut vehicles: Vec<Vehicle> = published
            .values()
            .filter(|v| filter.include_inactive || v.active)
            .filter(|v| {
                filter
                    .statuses
                    .as_ref()
                    .map_or(true, |statuses| statuses.contains(&v.status()))
            })
            .filter(|v| {
                filter
                    .vehicle_types
                    .as_ref()
                    .map_or(true, |types| types.contains(&v.vehicle_type))
            })
            .filter(|v| filter.base_id.map_or(true, |base| v.base_id == base))
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| a.plate.cmp(&b.plate));
        vehicles
    }

    /// 车辆就绪度
    pub async fn readiness_score(&self, vehicle_id: Uuid) -> Result<f64> {
        let vehicle = self.get(vehicle_id).await?;
        Ok(self.readiness.score(&vehicle, Utc::now().date_naive()))
    }

    /// 按就绪度排序的候选车辆，同分时按标识升序
    pub async fn rank_candidates(&self, query: &CandidateQuery) -> Vec<Candidate> {
        let today = Utc::now().date_naive();
        let published = self.published.read().await;

        let mut candidates: Vec<Candidate> = published
            .values()
            .filter(|v| v.is_dispatchable() && v.vehicle_type == query.vehicle_type)
            .filter_map(|v| {
                let distance_km = match query.near {
                    Some(target) => {
                        let distance = haversine_km(v.base_location.as_ref()?, &target);
                        if distance > query.max_distance_km {
                            return None;
                        }
                        Some(distance)
                    }
                    None => None,
                };
                Some(Candidate {
                    vehicle_id: v.id,
                    plate: v.plate.clone(),
                    score: self.readiness.score(v, today),
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.vehicle_id.cmp(&b.vehicle_id))
        });
        candidates
    }

    /// 最佳候选车辆
    pub async fn select_candidate(&self, query: &CandidateQuery) -> Option<Candidate> {
        self.rank_candidates(query).await.into_iter().next()
    }

    pub async fn snapshots(&self) -> Vec<Vehicle> {
        self.published.read().await.values().cloned().collect()
    }

    pub async fn restore(&self, vehicles: Vec<Vehicle>) {
        let mut cells = self.cells.write().await;
        for vehicle in vehicles {
            self.publish_snapshot(&vehicle).await;
            cells.insert(vehicle.id, Arc::new(Mutex::new(vehicle)));
        }
        tracing::info!("Restored {} vehicles", cells.len());
    }

    pub(crate) async fn cell(&self, vehicle_id: Uuid) -> Result<Cell<Vehicle>> {
        self.cells
            .read()
            .await
            .get(&vehicle_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("vehicle", vehicle_id))
    }

    /// 替换内存状态并发布快照；调用方必须持有车辆锁
    pub(crate) async fn install(&self, current: &mut Vehicle, updated: Vehicle) {
        *current = updated;
        self.publish_snapshot(current).await;
    }

    pub(crate) async fn persist(&self, vehicle: &Vehicle) -> Result<()> {
        if let Err(err) = self.collaborators.store.save_vehicle(vehicle).await {
            tracing::error!("Failed to persist vehicle {}: {}", vehicle.plate, err);
            return Err(err);
        }
        Ok(())
    }

    async fn apply<F>(&self, vehicle_id: Uuid, kind: &str, mutate: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<()>,
    {
        let cell = self.cell(vehicle_id).await?;
        let mut current = cell.lock().await;

        let mut updated = current.clone();
        mutate(&mut updated)?;
        self.persist(&updated).await?;
        self.install(&mut current, updated).await;

        self.bus
            .publish(Notification::for_vehicle(&current, kind, vec![Audience::Fleet]));
        tracing::info!("Vehicle {} updated: {}", current.plate, kind);
        Ok(current.clone())
    }

    async fn publish_snapshot(&self, vehicle: &Vehicle) {
        self.published
            .write()
            .await
            .insert(vehicle.id, vehicle.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samu_core::collaborators::InMemoryDirectory;
    use samu_core::{CrewRole, EquipmentStatus};

    fn registry() -> VehicleRegistry {
        VehicleRegistry::new(
            ReadinessPolicy::default(),
            NotificationBus::new(),
            Collaborators::in_memory(Arc::new(InMemoryDirectory::new())),
        )
    }

    fn new_vehicle(plate: &str, vehicle_type: VehicleType, base: Option<Coordinates>) -> NewVehicle {
        NewVehicle {
            plate: plate.to_string(),
            vehicle_type,
            base_id: Uuid::new_v4(),
            base_location: base,
            crew: vec![],
            equipment: vec![],
            odometer_km: 1000,
            fuel_percent: 80.0,
            notes: None,
        }
    }

    fn crew(roles: &[CrewRole]) -> Vec<CrewMember> {
        roles
            .iter()
            .map(|role| CrewMember {
                operator_id: Uuid::new_v4(),
                name: format!("{:?}", role),
                role: *role,
                active: true,
            })
            .collect()
    }

    #[test]
    fn test_readiness_score_weights() {
        let policy = ReadinessPolicy::default();
        let today = Utc::now().date_naive();
        let mut vehicle = new_vehicle("AAA-0001", VehicleType::Basic, None).into_vehicle(Utc::now());

        // 状态 40 + 油量 10
        assert_eq!(policy.score(&vehicle, today), 50.0);

        vehicle.crew = crew(&[CrewRole::Driver, CrewRole::Technician]);
        vehicle.equipment = vec![EquipmentItem::operational("Oxygen", "RESPIRATORY")];
        assert_eq!(policy.score(&vehicle, today), 100.0);

        vehicle.fuel_percent = 30.0;
        assert_eq!(policy.score(&vehicle, today), 95.0);
        vehicle.fuel_percent = 10.0;
        assert_eq!(policy.score(&vehicle, today), 90.0);

        vehicle.standby_status = VehicleStatus::Maintenance;
        assert_eq!(policy.score(&vehicle, today), 50.0);

        vehicle.active = false;
        assert_eq!(policy.score(&vehicle, today), 0.0);
    }

    #[test]
    fn test_adding_operational_equipment_never_lowers_score() {
        let policy = ReadinessPolicy::default();
        let today = Utc::now().date_naive();
        let mut vehicle = new_vehicle("AAA-0002", VehicleType::Advanced, None).into_vehicle(Utc::now());
        vehicle.crew = crew(&[CrewRole::Driver]);

        let mut broken = EquipmentItem::operational("Monitor", "MONITORING");
        broken.status = EquipmentStatus::Maintenance;

        let mut previous = policy.score(&vehicle, today);
        for item in [
            broken,
            EquipmentItem::operational("Defibrillator", "MONITORING"),
            EquipmentItem::operational("Ventilator", "RESPIRATORY"),
        ] {
            let was_operational = item.is_operational(today);
            let mut with_item = vehicle.clone();
            with_item.equipment.push(item);
            let score = policy.score(&with_item, today);
            if was_operational {
                assert!(score >= previous, "{} < {}", score, previous);
            }
            vehicle = with_item;
            previous = score;
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_plate() {
        let registry = registry();
        registry
            .register_vehicle(new_vehicle("XYZ-9999", VehicleType::Basic, None))
            .await
            .unwrap();
        let duplicate = registry
            .register_vehicle(new_vehicle("xyz-9999", VehicleType::Icu, None))
            .await;
        assert!(matches!(duplicate, Err(SamuError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_keeps_plate_unique() {
        let registry = Arc::new(registry());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register_vehicle(new_vehicle("RACE-0001", VehicleType::Basic, None))
                    .await
            }));
        }

        let mut registered = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                registered += 1;
            }
        }
        assert_eq!(registered, 1);
        assert_eq!(registry.snapshots().await.len(), 1);
    }

    #[tokio::test]
    async fn test_candidate_selection() {
        let registry = registry();
        let scene = Coordinates::new(-23.55, -46.63);
        let near = Coordinates::new(-23.56, -46.64);
        let far = Coordinates::new(-22.90, -43.17);

        let ready = registry
            .register_vehicle(new_vehicle("ICU-0001", VehicleType::Icu, Some(near)))
            .await
            .unwrap();
        registry
            .update_crew(
                ready.id,
                crew(&[
                    CrewRole::Driver,
                    CrewRole::Physician,
                    CrewRole::Nurse,
                    CrewRole::Technician,
                ]),
            )
            .await
            .unwrap();
        let bare = registry
            .register_vehicle(new_vehicle("ICU-0002", VehicleType::Icu, Some(near)))
            .await
            .unwrap();
        registry
            .register_vehicle(new_vehicle("ICU-0003", VehicleType::Icu, Some(far)))
            .await
            .unwrap();
        registry
            .register_vehicle(new_vehicle("ICU-0004", VehicleType::Icu, None))
            .await
            .unwrap();
        registry
            .register_vehicle(new_vehicle("BAS-0001", VehicleType::Basic, Some(near)))
            .await
            .unwrap();

        let query = CandidateQuery {
            vehicle_type: VehicleType::Icu,
            near: Some(scene),
            max_distance_km: 50.0,
        };
        let ranked = registry.rank_candidates(&query).await;
        let ids: Vec<_> = ranked.iter().map(|c| c.vehicle_id).collect();
        assert_eq!(ids, vec![ready.id, bare.id]);
        assert!(ranked[0].distance_km.unwrap() < 5.0);

        // 无坐标时不按距离过滤
        let anywhere = CandidateQuery { near: None, ..query };
        assert_eq!(registry.rank_candidates(&anywhere).await.len(), 4);
    }

    #[tokio::test]
    async fn test_candidate_ties_broken_by_lowest_id() {
        let registry = registry();
        let a = registry
            .register_vehicle(new_vehicle("TIE-0001", VehicleType::Basic, None))
            .await
            .unwrap();
        let b = registry
            .register_vehicle(new_vehicle("TIE-0002", VehicleType::Basic, None))
            .await
            .unwrap();

        let best = registry
            .select_candidate(&CandidateQuery {
                vehicle_type: VehicleType::Basic,
                near: None,
                max_distance_km: 10.0,
            })
            .await
            .unwrap();
        assert_eq!(best.vehicle_id, a.id.min(b.id));
    }

    #[tokio::test]
    async fn test_fuel_update_validation() {
        let registry = registry();
        let vehicle = registry
            .register_vehicle(new_vehicle("FUEL-001", VehicleType::Basic, None))
            .await
            .unwrap();

        assert!(registry.update_fuel(vehicle.id, 120.0, None).await.is_err());
        assert!(registry.update_fuel(vehicle.id, 40.0, Some(10)).await.is_err());
        let updated = registry.update_fuel(vehicle.id, 40.0, Some(1500)).await.unwrap();
        assert_eq!(updated.odometer_km, 1500);
        assert_eq!(updated.fuel_percent, 40.0);
    }
}
