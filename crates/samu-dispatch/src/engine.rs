//! 调度中心
//!
//! 组合审计日志、通知总线、事件登记、车辆登记、派遣台、调节工作台与看板，
//! 对外提供统一的操作入口。

use chrono::{DateTime, Utc};
use samu_core::collaborators::Collaborators;
use samu_core::{
    CrewMember, EquipmentItem, NewOccurrence, NewPatient, NewVehicle, Occurrence,
    OccurrenceDetail, PatientRecord, Priority, Result, Vehicle, VehicleAssignment, VehicleStatus,
    VehicleType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::dashboard::{DashboardAggregator, DashboardSnapshot, TimeWindow};
use crate::dispatch::{DispatchBoard, Milestone};
use crate::event_log::EventLog;
use crate::notification::{Audience, NotificationBus, Subscription};
use crate::occurrence::{OccurrenceFilter, OccurrenceRegistry};
use crate::regulation::{PatientRegulation, RegulationWorkstation};
use crate::settings::DispatchSettings;
use crate::vehicle::{Candidate, ReadinessPolicy, VehicleFilter, VehicleRegistry};

/// 恢复结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreSummary {
    pub occurrences: usize,
    pub vehicles: usize,
    pub events: usize,
}

/// 调度中心
///
/// 协调所有调度组件，提供统一的管理接口
#[derive(Debug)]
pub struct DispatchCenter {
    event_log: Arc<EventLog>,
    bus: NotificationBus,
    occurrences: Arc<OccurrenceRegistry>,
    vehicles: Arc<VehicleRegistry>,
    dispatch: DispatchBoard,
    regulation: RegulationWorkstation,
    dashboard: DashboardAggregator,
    collaborators: Collaborators,
}

impl DispatchCenter {
    /// 创建新的调度中心
    pub fn new(collaborators: Collaborators, settings: DispatchSettings) -> Self {
        let event_log = Arc::new(EventLog::new());
        let bus = NotificationBus::with_capacity(settings.notification_capacity);

        let occurrences = Arc::new(OccurrenceRegistry::new(
            event_log.clone(),
            bus.clone(),
            collaborators.clone(),
            settings.clone(),
        ));
        let vehicles = Arc::new(VehicleRegistry::new(
            ReadinessPolicy::new(settings.readiness),
            bus.clone(),
            collaborators.clone(),
        ));
        let dispatch = DispatchBoard::new(
            occurrences.clone(),
            vehicles.clone(),
            settings.search_radius_km,
        );
        let regulation = RegulationWorkstation::new(occurrences.clone());
        let dashboard = DashboardAggregator::new(
            occurrences.clone(),
            vehicles.clone(),
            event_log.clone(),
            settings.dashboard,
        );

        Self {
            event_log,
            bus,
            occurrences,
            vehicles,
            dispatch,
            regulation,
            dashboard,
            collaborators,
        }
    }

    /// 从持久化存储恢复状态
    pub async fn restore(&self) -> Result<RestoreSummary> {
        let state = self.collaborators.store.load().await?;
        let summary = RestoreSummary {
            occurrences: state.occurrences.len(),
            vehicles: state.vehicles.len(),
            events: state.events.len(),
        };

        let ids: Vec<Uuid> = state.occurrences.iter().map(|o| o.id).collect();
        self.event_log.restore(&ids, state.events).await;
        self.dispatch.restore(&state.occurrences).await;
        self.occurrences.restore(state.occurrences).await;
        self.vehicles.restore(state.vehicles).await;

        tracing::info!(
            "Dispatch center restored: {} occurrences, {} vehicles, {} audit events",
            summary.occurrences,
            summary.vehicles,
            summary.events
        );
        Ok(summary)
    }

    // ---- 事件 ----

    pub async fn create_occurrence(&self, request: NewOccurrence, operator_id: Uuid) -> Result<Occurrence> {
        self.occurrences.create_occurrence(request, operator_id).await
    }

    pub async fn escalate_to_regulation(&self, occurrence_id: Uuid, operator_id: Uuid) -> Result<Occurrence> {
        self.occurrences
            .escalate_to_regulation(occurrence_id, operator_id)
            .await
    }

    pub async fn add_patient(
        &self,
        occurrence_id: Uuid,
        patient: NewPatient,
        operator_id: Uuid,
    ) -> Result<PatientRecord> {
        self.occurrences
            .add_patient(occurrence_id, patient, operator_id)
            .await
    }

    pub async fn update_location(
        &self,
        occurrence_id: Uuid,
        latitude: f64,
        longitude: f64,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        self.occurrences
            .update_location(occurrence_id, latitude, longitude, operator_id)
            .await
    }

    pub async fn change_priority(
        &self,
        occurrence_id: Uuid,
        priority: Priority,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        self.occurrences
            .change_priority(occurrence_id, priority, operator_id)
            .await
    }

    pub async fn list_occurrences(&self, filter: &OccurrenceFilter) -> Vec<Occurrence> {
        self.occurrences.list(filter).await
    }

    pub async fn occurrence_detail(&self, occurrence_id: Uuid) -> Result<OccurrenceDetail> {
        self.occurrences.detail(occurrence_id).await
    }

    // ---- 调节 ----

    pub async fn start_regulation(&self, occurrence_id: Uuid, regulator_id: Uuid) -> Result<Occurrence> {
        self.regulation
            .start_regulation(occurrence_id, regulator_id)
            .await
    }

    pub async fn abort_regulation(
        &self,
        occurrence_id: Uuid,
        reason: &str,
        regulator_id: Uuid,
    ) -> Result<Occurrence> {
        self.regulation
            .abort_regulation(occurrence_id, reason, regulator_id)
            .await
    }

    pub async fn regulate_patient(
        &self,
        patient_id: Uuid,
        regulation: PatientRegulation,
        regulator_id: Uuid,
    ) -> Result<PatientRecord> {
        self.regulation
            .regulate_patient(patient_id, regulation, regulator_id)
            .await
    }

    pub async fn finish_regulation(
        &self,
        occurrence_id: Uuid,
        external_support_note: Option<&str>,
        regulator_id: Uuid,
    ) -> Result<Occurrence> {
        self.regulation
            .finish_regulation(occurrence_id, external_support_note, regulator_id)
            .await
    }

    pub async fn close_occurrence(&self, occurrence_id: Uuid, operator_id: Uuid) -> Result<Occurrence> {
        self.regulation
            .close_occurrence(occurrence_id, operator_id)
            .await
    }

    pub async fn regulation_queue(&self, regulation_center_id: Option<Uuid>) -> Vec<Occurrence> {
        self.regulation.queue(regulation_center_id).await
    }

    pub async fn critical_occurrences(&self) -> Vec<Occurrence> {
        self.regulation.critical_occurrences().await
    }

    // ---- 派遣 ----

    pub async fn assign_vehicle(
        &self,
        occurrence_id: Uuid,
        vehicle_id: Uuid,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .assign_vehicle(occurrence_id, vehicle_id, operator_id)
            .await
    }

    pub async fn report_status(
        &self,
        assignment_id: Uuid,
        status: VehicleStatus,
        at: DateTime<Utc>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .report_status(assignment_id, status, at, operator_id)
            .await
    }

    pub async fn release_vehicle(
        &self,
        assignment_id: Uuid,
        odometer_end: Option<u32>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .release_vehicle(assignment_id, odometer_end, operator_id)
            .await
    }

    pub async fn record_milestone(
        &self,
        assignment_id: Uuid,
        milestone: Milestone,
        at: DateTime<Utc>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .record_milestone(assignment_id, milestone, at, operator_id)
            .await
    }

    pub async fn update_position(
        &self,
        assignment_id: Uuid,
        latitude: f64,
        longitude: f64,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .update_position(assignment_id, latitude, longitude, operator_id)
            .await
    }

    pub async fn record_quality(
        &self,
        assignment_id: Uuid,
        rating: u8,
        complications: Option<String>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        self.dispatch
            .record_quality(assignment_id, rating, complications, operator_id)
            .await
    }

    pub async fn suggest_vehicle(
        &self,
        occurrence_id: Uuid,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Option<Candidate>> {
        self.dispatch
            .suggest_vehicle(occurrence_id, vehicle_type)
            .await
    }

    pub async fn active_assignments(&self) -> Vec<VehicleAssignment> {
        self.dispatch.active_assignments().await
    }

    // ---- 车队 ----

    pub async fn register_vehicle(&self, request: NewVehicle) -> Result<Vehicle> {
        self.vehicles.register_vehicle(request).await
    }

    pub async fn update_crew(&self, vehicle_id: Uuid, crew: Vec<CrewMember>) -> Result<Vehicle> {
        self.vehicles.update_crew(vehicle_id, crew).await
    }

    pub async fn update_equipment(&self, vehicle_id: Uuid, equipment: Vec<EquipmentItem>) -> Result<Vehicle> {
        self.vehicles.update_equipment(vehicle_id, equipment).await
    }

    pub async fn update_fuel(
        &self,
        vehicle_id: Uuid,
        fuel_percent: f32,
        odometer_km: Option<u32>,
    ) -> Result<Vehicle> {
        self.vehicles
            .update_fuel(vehicle_id, fuel_percent, odometer_km)
            .await
    }

    pub async fn set_vehicle_status(
        &self,
        vehicle_id: Uuid,
        status: VehicleStatus,
        operator_id: Uuid,
    ) -> Result<Vehicle> {
        self.dispatch
            .set_vehicle_status(vehicle_id, status, operator_id)
            .await
    }

    pub async fn decommission_vehicle(&self, vehicle_id: Uuid) -> Result<Vehicle> {
        self.vehicles.decommission(vehicle_id).await
    }

    pub async fn vehicle(&self, vehicle_id: Uuid) -> Result<Vehicle> {
        self.vehicles.get(vehicle_id).await
    }

    pub async fn list_vehicles(&self, filter: &VehicleFilter) -> Vec<Vehicle> {
        self.vehicles.list(filter).await
    }

    pub async fn readiness_score(&self, vehicle_id: Uuid) -> Result<f64> {
        self.vehicles.readiness_score(vehicle_id).await
    }

    // ---- 看板与通知 ----

    pub async fn dashboard(&self, window: TimeWindow) -> DashboardSnapshot {
        self.dashboard.snapshot(window).await
    }

    pub fn subscribe(&self, audiences: &[Audience]) -> Subscription {
        self.bus.subscribe(audiences)
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use samu_core::collaborators::{Geocoder, InMemoryDirectory, Persistence, StoredState};
    use samu_core::{
        AssignmentStatus, AuditEvent, AuditEventKind, Coordinates, CrewRole, OccurrenceState,
        PatientAge, RiskClassification, SamuError, Sex,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        center: Arc<DispatchCenter>,
        operator: Uuid,
        regulator: Uuid,
        regulation_center: Uuid,
        facility: Uuid,
    }

    struct FixedGeocoder(Coordinates);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn resolve(&self, _address: &str) -> Result<Option<Coordinates>> {
            Ok(Some(self.0))
        }
    }

    /// 可切换为失败的存储
    #[derive(Default)]
    struct FlakyStore {
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(SamuError::Storage("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Persistence for FlakyStore {
        async fn save_occurrence(&self, _o: &Occurrence, _e: &AuditEvent) -> Result<()> {
            self.check()
        }
        async fn save_vehicle(&self, _v: &Vehicle) -> Result<()> {
            self.check()
        }
        async fn save_dispatch(&self, _o: &Occurrence, _v: &Vehicle, _e: &AuditEvent) -> Result<()> {
            self.check()
        }
        async fn load(&self) -> Result<StoredState> {
            Ok(StoredState::default())
        }
    }

    const SCENE: Coordinates = Coordinates {
        latitude: -23.5614,
        longitude: -46.6559,
    };

    async fn harness_with(store: Option<Arc<FlakyStore>>) -> Harness {
        let directory = Arc::new(InMemoryDirectory::new());
        let operator = Uuid::new_v4();
        let regulator = Uuid::new_v4();
        let regulation_center = Uuid::new_v4();
        let facility = Uuid::new_v4();
        directory.add_operator(operator, "Dispatcher Ana").await;
        directory.add_operator(regulator, "Dr. Bruno").await;
        directory.add_center(regulation_center, "Central Regulation").await;
        directory.add_facility(facility, "Hospital das Clinicas").await;

        let mut collaborators =
            Collaborators::in_memory(directory).with_geocoder(Arc::new(FixedGeocoder(SCENE)));
        if let Some(store) = store {
            collaborators = collaborators.with_store(store);
        }

        Harness {
            center: Arc::new(DispatchCenter::new(collaborators, DispatchSettings::default())),
            operator,
            regulator,
            regulation_center,
            facility,
        }
    }

    async fn harness() -> Harness {
        harness_with(None).await
    }

    impl Harness {
        fn request(&self, priority: Priority) -> NewOccurrence {
            NewOccurrence {
                call_type: "MEDICAL".to_string(),
                priority: Some(priority),
                caller_phone: "(11) 3333-4444".to_string(),
                caller_name: Some("Carlos".to_string()),
                location_text: "Av. Paulista, 1578".to_string(),
                coordinates: None,
                description: "Man collapsed on sidewalk".to_string(),
                notes: None,
                regulation_center_id: Some(self.regulation_center),
                patients: vec![NewPatient {
                    name: None,
                    age: Some(PatientAge::Years(58)),
                    sex: Sex::Male,
                    chief_complaint: "chest pain".to_string(),
                }],
            }
        }

        async fn open(&self, priority: Priority) -> Occurrence {
            self.center
                .create_occurrence(self.request(priority), self.operator)
                .await
                .unwrap()
        }

        async fn vehicle(&self, plate: &str) -> Vehicle {
            let vehicle = self
                .center
                .register_vehicle(NewVehicle {
                    plate: plate.to_string(),
                    vehicle_type: VehicleType::Advanced,
                    base_id: Uuid::new_v4(),
                    base_location: Some(Coordinates::new(-23.55, -46.64)),
                    crew: vec![],
                    equipment: vec![],
                    odometer_km: 12000,
                    fuel_percent: 90.0,
                    notes: None,
                })
                .await
                .unwrap();
            let crew = [CrewRole::Driver, CrewRole::Physician, CrewRole::Nurse]
                .iter()
                .map(|role| CrewMember {
                    operator_id: Uuid::new_v4(),
                    name: format!("{:?}", role),
                    role: *role,
                    active: true,
                })
                .collect();
            self.center.update_crew(vehicle.id, crew).await.unwrap()
        }

        async fn kinds(&self, occurrence_id: Uuid) -> Vec<AuditEventKind> {
            self.center
                .occurrence_detail(occurrence_id)
                .await
                .unwrap()
                .events
                .into_iter()
                .map(|e| e.kind)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_scenario_a_emergency_intake() {
        let h = harness().await;
        let mut dispatch = h.center.subscribe(&[Audience::Dispatch, Audience::Regulation]);

        let occurrence = h.open(Priority::Emergency).await;

        assert_eq!(occurrence.state, OccurrenceState::Open);
        assert_eq!(occurrence.coordinates, Some(SCENE));
        assert!(samu_core::utils::is_valid_display_code(&occurrence.code));
        assert_eq!(h.kinds(occurrence.id).await, vec![AuditEventKind::Creation]);

        let notification = dispatch.recv().await.unwrap();
        assert_eq!(notification.kind, "creation");
        assert!(notification.is_for(Audience::Regulation));
        assert!(dispatch.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_scenario_b_regulation_workflow() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let patient_id = occurrence.patients[0].id;

        h.center
            .escalate_to_regulation(occurrence.id, h.operator)
            .await
            .unwrap();
        let started = h
            .center
            .start_regulation(occurrence.id, h.regulator)
            .await
            .unwrap();
        assert_eq!(started.regulator_id, Some(h.regulator));

        let patient = h
            .center
            .regulate_patient(
                patient_id,
                PatientRegulation {
                    hypothesis: Some("acute myocardial infarction".to_string()),
                    risk: Some(RiskClassification::Critical),
                    destination_facility_id: Some(h.facility),
                    ..Default::default()
                },
                h.regulator,
            )
            .await
            .unwrap();
        assert!(patient.is_regulated());
        assert!(patient.regulated_at.is_some());

        let finished = h
            .center
            .finish_regulation(occurrence.id, Some("Fire brigade on scene"), h.regulator)
            .await
            .unwrap();
        assert_eq!(finished.state, OccurrenceState::Regulated);
        assert!(finished.notes.contains("[SUPPORT] Fire brigade on scene"));
        assert!(finished.patients[0].is_regulated());
        assert!(!finished.patients[0].follow_up);

        assert_eq!(
            h.kinds(occurrence.id).await,
            vec![
                AuditEventKind::Creation,
                AuditEventKind::EscalatedToRegulation,
                AuditEventKind::RegulationStarted,
                AuditEventKind::PatientRegulated,
                AuditEventKind::RegulationFinished,
            ]
        );
        assert_eq!(h.center.critical_occurrences().await.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_no_double_dispatch() {
        let h = harness().await;
        let first = h.open(Priority::Emergency).await;
        let second = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0001").await;

        let assignment = h
            .center
            .assign_vehicle(first.id, vehicle.id, h.operator)
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::EnRoute);
        assert!(assignment.timeline.dispatched_at.is_some());
        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::EnRoute
        );

        let events_before = h.kinds(second.id).await.len();
        let result = h
            .center
            .assign_vehicle(second.id, vehicle.id, h.operator)
            .await;
        assert!(matches!(result, Err(SamuError::VehicleNotAvailable { .. })));
        assert_eq!(h.kinds(second.id).await.len(), events_before);
    }

    #[tokio::test]
    async fn test_scenario_d_cannot_skip_to_transporting() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0002").await;

        // 车辆待命时不能直接转运
        let result = h
            .center
            .set_vehicle_status(vehicle.id, VehicleStatus::Transporting, h.operator)
            .await;
        assert!(matches!(result, Err(SamuError::IllegalStateTransition { .. })));
        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::Available
        );

        // 派遣后仍须先到达现场
        let assignment = h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();
        let events_before = h.kinds(occurrence.id).await.len();
        let result = h
            .center
            .report_status(assignment.id, VehicleStatus::Transporting, Utc::now(), h.operator)
            .await;
        assert!(matches!(result, Err(SamuError::IllegalStateTransition { .. })));
        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::EnRoute
        );
        assert_eq!(h.kinds(occurrence.id).await.len(), events_before);
    }

    #[tokio::test]
    async fn test_scenario_e_close_without_regulation() {
        let h = harness().await;
        let occurrence = h.open(Priority::NonUrgent).await;

        let closed = h
            .center
            .close_occurrence(occurrence.id, h.operator)
            .await
            .unwrap();
        assert_eq!(closed.state, OccurrenceState::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(
            h.center.close_occurrence(occurrence.id, h.operator).await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
        assert!(matches!(
            h.center.escalate_to_regulation(occurrence.id, h.operator).await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_occurrence_rejects_changes() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0011").await;
        h.center
            .close_occurrence(occurrence.id, h.operator)
            .await
            .unwrap();
        let events_before = h.kinds(occurrence.id).await.len();

        let patient = NewPatient {
            name: None,
            age: Some(PatientAge::Years(30)),
            sex: Sex::Female,
            chief_complaint: "dizziness".to_string(),
        };
        assert!(matches!(
            h.center.add_patient(occurrence.id, patient, h.operator).await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
        assert!(matches!(
            h.center
                .update_location(occurrence.id, -23.50, -46.60, h.operator)
                .await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
        assert!(matches!(
            h.center
                .change_priority(occurrence.id, Priority::Emergency, h.operator)
                .await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
        assert!(matches!(
            h.center
                .assign_vehicle(occurrence.id, vehicle.id, h.operator)
                .await,
            Err(SamuError::IllegalStateTransition { .. })
        ));

        assert_eq!(h.kinds(occurrence.id).await.len(), events_before);
        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::Available
        );
    }

    #[tokio::test]
    async fn test_decommissioned_vehicle_rejects_status_change() {
        let h = harness().await;
        let vehicle = h.vehicle("USA-0012").await;
        h.center.decommission_vehicle(vehicle.id).await.unwrap();
        let mut fleet = h.center.subscribe(&[Audience::Fleet]);

        assert!(matches!(
            h.center
                .set_vehicle_status(vehicle.id, VehicleStatus::Maintenance, h.operator)
                .await,
            Err(SamuError::VehicleNotAvailable { .. })
        ));
        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::Available
        );
        assert!(fleet.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_future_report_does_not_postpone_dwell() {
        let h = harness().await;
        let occurrence = h.open(Priority::Emergency).await;
        let vehicle = h.vehicle("USA-0013").await;
        let assignment = h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();

        let reported_at = Utc::now() + Duration::hours(3);
        let at_scene = h
            .center
            .report_status(assignment.id, VehicleStatus::AtScene, reported_at, h.operator)
            .await
            .unwrap();
        assert_eq!(at_scene.timeline.arrived_scene_at, Some(reported_at));

        let vehicle = h.center.vehicle(vehicle.id).await.unwrap();
        assert_eq!(vehicle.status(), VehicleStatus::AtScene);
        assert!(vehicle.status_since <= Utc::now());
    }

    #[tokio::test]
    async fn test_full_dispatch_cycle_keeps_timeline_monotonic() {
        let h = harness().await;
        let occurrence = h.open(Priority::Emergency).await;
        let vehicle = h.vehicle("USA-0003").await;
        let assignment = h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();
        let t0 = assignment.timeline.dispatched_at.unwrap();

        h.center
            .record_milestone(assignment.id, Milestone::DepartedBase, t0 + Duration::minutes(1), h.operator)
            .await
            .unwrap();
        h.center
            .update_position(assignment.id, -23.558, -46.650, h.operator)
            .await
            .unwrap();
        h.center
            .report_status(assignment.id, VehicleStatus::AtScene, t0 + Duration::minutes(9), h.operator)
            .await
            .unwrap();

        // 早于到达现场的离开时间被拒绝
        assert!(h
            .center
            .report_status(assignment.id, VehicleStatus::Transporting, t0 + Duration::minutes(5), h.operator)
            .await
            .is_err());
        h.center
            .report_status(assignment.id, VehicleStatus::Transporting, t0 + Duration::minutes(25), h.operator)
            .await
            .unwrap();
        h.center
            .record_milestone(assignment.id, Milestone::ArrivedAtFacility, t0 + Duration::minutes(40), h.operator)
            .await
            .unwrap();

        assert!(matches!(
            h.center.release_vehicle(assignment.id, Some(100), h.operator).await,
            Err(SamuError::Validation(_))
        ));
        let released = h
            .center
            .release_vehicle(assignment.id, Some(12018), h.operator)
            .await
            .unwrap();
        assert_eq!(released.status, AssignmentStatus::Released);
        assert!(released.timeline.is_monotonic());
        assert!(released.timeline.released_at.is_some());

        let vehicle = h.center.vehicle(vehicle.id).await.unwrap();
        assert_eq!(vehicle.status(), VehicleStatus::Available);
        assert_eq!(vehicle.odometer_km, 12018);
        assert!(vehicle.duty.is_none());

        // 释放后仍可评价
        let rated = h
            .center
            .record_quality(assignment.id, 5, None, h.operator)
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(5));
        assert!(h
            .center
            .record_quality(assignment.id, 6, None, h.operator)
            .await
            .is_err());

        let events = h
            .center
            .event_log()
            .list_by_assignment(occurrence.id, assignment.id)
            .await
            .unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventKind::VehicleAssigned,
                AuditEventKind::VehicleMilestone,
                AuditEventKind::VehiclePositionUpdated,
                AuditEventKind::VehicleStatusChanged,
                AuditEventKind::VehicleStatusChanged,
                AuditEventKind::VehicleMilestone,
                AuditEventKind::VehicleReleased,
                AuditEventKind::QualityRecorded,
            ]
        );

        // 释放后可再次派遣
        let next = h.open(Priority::Urgent).await;
        assert!(h
            .center
            .assign_vehicle(next.id, vehicle.id, h.operator)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_only_from_transporting() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0004").await;
        let assignment = h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();

        assert!(matches!(
            h.center.release_vehicle(assignment.id, None, h.operator).await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
        assert!(matches!(
            h.center
                .report_status(assignment.id, VehicleStatus::Available, Utc::now(), h.operator)
                .await,
            Err(SamuError::IllegalStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_breakdown_withdraws_assignment() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0005").await;
        let assignment = h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();

        let broken = h
            .center
            .set_vehicle_status(vehicle.id, VehicleStatus::Broken, h.operator)
            .await
            .unwrap();
        assert_eq!(broken.status(), VehicleStatus::Broken);
        assert!(broken.duty.is_none());

        let withdrawn = h.center.dispatch.assignment(assignment.id).await.unwrap();
        assert_eq!(withdrawn.status, AssignmentStatus::Withdrawn);
        assert!(withdrawn.timeline.released_at.is_some());
        assert!(h.center.active_assignments().await.is_empty());

        // 故障车辆只能进入维护
        assert!(h
            .center
            .set_vehicle_status(vehicle.id, VehicleStatus::Available, h.operator)
            .await
            .is_err());
        h.center
            .set_vehicle_status(vehicle.id, VehicleStatus::Maintenance, h.operator)
            .await
            .unwrap();
        let restored = h
            .center
            .set_vehicle_status(vehicle.id, VehicleStatus::Available, h.operator)
            .await
            .unwrap();
        assert!(restored.is_dispatchable());

        let kinds = h.kinds(occurrence.id).await;
        assert_eq!(kinds.last(), Some(&AuditEventKind::VehicleStatusChanged));
    }

    #[tokio::test]
    async fn test_abort_regulation_returns_to_queue() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        h.center
            .escalate_to_regulation(occurrence.id, h.operator)
            .await
            .unwrap();
        h.center
            .start_regulation(occurrence.id, h.regulator)
            .await
            .unwrap();

        let aborted = h
            .center
            .abort_regulation(occurrence.id, "regulator called to another case", h.regulator)
            .await
            .unwrap();
        assert_eq!(aborted.state, OccurrenceState::AwaitingRegulation);
        assert!(aborted.regulator_id.is_none());
        assert_eq!(h.center.regulation_queue(None).await.len(), 1);
        assert_eq!(
            h.center
                .regulation_queue(Some(Uuid::new_v4()))
                .await
                .len(),
            0
        );

        // 中止后可重新开始
        h.center
            .start_regulation(occurrence.id, h.regulator)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_finish_flags_unregulated_patients() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let second = h
            .center
            .add_patient(
                occurrence.id,
                NewPatient {
                    name: Some("Lia".to_string()),
                    age: Some(PatientAge::Months(10)),
                    sex: Sex::Female,
                    chief_complaint: "fever".to_string(),
                },
                h.operator,
            )
            .await
            .unwrap();
        h.center
            .escalate_to_regulation(occurrence.id, h.operator)
            .await
            .unwrap();

        // 调节开始前不能调节患者
        assert!(matches!(
            h.center
                .regulate_patient(second.id, PatientRegulation::default(), h.regulator)
                .await,
            Err(SamuError::IllegalStateTransition { .. })
        ));

        h.center
            .start_regulation(occurrence.id, h.regulator)
            .await
            .unwrap();
        assert!(matches!(
            h.center
                .regulate_patient(
                    second.id,
                    PatientRegulation {
                        destination_facility_id: Some(Uuid::new_v4()),
                        ..Default::default()
                    },
                    h.regulator
                )
                .await,
            Err(SamuError::ReferenceNotFound { .. })
        ));
        h.center
            .regulate_patient(
                second.id,
                PatientRegulation {
                    hypothesis: Some("febrile seizure".to_string()),
                    risk: Some(RiskClassification::Moderate),
                    ..Default::default()
                },
                h.regulator,
            )
            .await
            .unwrap();

        let finished = h
            .center
            .finish_regulation(occurrence.id, None, h.regulator)
            .await
            .unwrap();
        let first = finished.patient(occurrence.patients[0].id).unwrap();
        assert!(first.follow_up);
        assert!(!finished.patient(second.id).unwrap().follow_up);
    }

    #[tokio::test]
    async fn test_audit_states_follow_lifecycle() {
        let h = harness().await;
        let occurrence = h.open(Priority::Urgent).await;
        let id = occurrence.id;

        h.center.escalate_to_regulation(id, h.operator).await.unwrap();
        h.center.start_regulation(id, h.regulator).await.unwrap();
        h.center
            .abort_regulation(id, "line dropped", h.regulator)
            .await
            .unwrap();
        h.center.start_regulation(id, h.regulator).await.unwrap();
        h.center.finish_regulation(id, None, h.regulator).await.unwrap();
        h.center.close_occurrence(id, h.operator).await.unwrap();

        let events = h.center.occurrence_detail(id).await.unwrap().events;
        let mut previous = OccurrenceState::Open;
        for event in &events {
            let state = event.occurrence_state;
            let backwards = state < previous;
            if backwards {
                // 唯一允许的回退是中止调节
                assert_eq!(event.kind, AuditEventKind::RegulationAborted);
                assert_eq!(state, OccurrenceState::AwaitingRegulation);
            }
            previous = state;
        }
        assert_eq!(previous, OccurrenceState::Closed);
        assert!(events.windows(2).all(|w| (w[0].timestamp, w[0].sequence) < (w[1].timestamp, w[1].sequence)));
    }

    #[tokio::test]
    async fn test_concurrent_assignment_single_winner() {
        let h = harness().await;
        let vehicle = h.vehicle("USA-0006").await;
        let mut occurrences = Vec::new();
        for _ in 0..8 {
            occurrences.push(h.open(Priority::Emergency).await);
        }

        let mut handles = Vec::new();
        for occurrence in &occurrences {
            let center = h.center.clone();
            let occurrence_id = occurrence.id;
            let vehicle_id = vehicle.id;
            let operator = h.operator;
            handles.push(tokio::spawn(async move {
                center.assign_vehicle(occurrence_id, vehicle_id, operator).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(SamuError::VehicleNotAvailable { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(h.center.active_assignments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_state_untouched() {
        let store = Arc::new(FlakyStore::default());
        let h = harness_with(Some(store.clone())).await;
        let occurrence = h.open(Priority::Urgent).await;
        let vehicle = h.vehicle("USA-0007").await;

        store.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            h.center.assign_vehicle(occurrence.id, vehicle.id, h.operator).await,
            Err(SamuError::Storage(_))
        ));
        assert!(matches!(
            h.center.escalate_to_regulation(occurrence.id, h.operator).await,
            Err(SamuError::Storage(_))
        ));
        store.failing.store(false, Ordering::SeqCst);

        assert_eq!(
            h.center.vehicle(vehicle.id).await.unwrap().status(),
            VehicleStatus::Available
        );
        let detail = h.center.occurrence_detail(occurrence.id).await.unwrap();
        assert_eq!(detail.occurrence.state, OccurrenceState::Open);
        assert!(detail.occurrence.assignments.is_empty());
        assert_eq!(detail.events.len(), 1);

        assert!(h
            .center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_suggest_vehicle_uses_patient_risk() {
        let h = harness().await;
        let occurrence = h.open(Priority::Emergency).await;
        let advanced = h.vehicle("USA-0008").await;

        h.center
            .escalate_to_regulation(occurrence.id, h.operator)
            .await
            .unwrap();
        h.center
            .start_regulation(occurrence.id, h.regulator)
            .await
            .unwrap();
        h.center
            .regulate_patient(
                occurrence.patients[0].id,
                PatientRegulation {
                    hypothesis: Some("stroke".to_string()),
                    risk: Some(RiskClassification::High),
                    ..Default::default()
                },
                h.regulator,
            )
            .await
            .unwrap();

        let candidate = h
            .center
            .suggest_vehicle(occurrence.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.vehicle_id, advanced.id);
        assert!(h
            .center
            .suggest_vehicle(occurrence.id, Some(VehicleType::Icu))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dashboard_reflects_fleet() {
        let h = harness().await;
        let occurrence = h.open(Priority::Emergency).await;
        let vehicle = h.vehicle("USA-0009").await;
        h.vehicle("USA-0010").await;
        h.center
            .assign_vehicle(occurrence.id, vehicle.id, h.operator)
            .await
            .unwrap();

        let snapshot = h.center.dashboard(TimeWindow::last_hours(24)).await;
        assert_eq!(snapshot.total_vehicles, 2);
        assert_eq!(snapshot.vehicles_by_status[&VehicleStatus::EnRoute], 1);
        assert_eq!(snapshot.availability_percent, 50.0);
        assert_eq!(snapshot.most_urgent[0].id, occurrence.id);
        assert_eq!(snapshot.occurrences_by_state[&OccurrenceState::Open], 1);
    }
}
