//! 派遣调度台
//!
//! 车辆派遣、状态上报、释放与撤回。派遣记录与车辆全局状态同步修改：
//! 车辆的全局状态由其唯一的执勤记录推导。加锁顺序固定为先事件后车辆。

use chrono::{DateTime, Utc};
use samu_core::collaborators::DirectoryEntry;
use samu_core::{
    AssignedCrew, AssignmentStatus, AssignmentTimeline, AuditEvent, AuditEventKind, Coordinates,
    Duty, NewAuditEvent, Occurrence, Result, RiskClassification, SamuError, TimelineStep, Vehicle,
    VehicleAssignment, VehicleStatus, VehicleType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::notification::{Audience, Notification};
use crate::occurrence::{ensure_open, OccurrenceRegistry};
use crate::state_machine::VehicleStatusMachine;
use crate::vehicle::{Candidate, CandidateQuery, VehicleRegistry};

const MAX_LOCK_ATTEMPTS: usize = 5;

/// 不改变状态的时间节点
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Milestone {
    DepartedBase,
    ArrivedAtFacility,
}

impl Milestone {
    fn step(&self) -> TimelineStep {
        match self {
            Milestone::DepartedBase => TimelineStep::DepartedBase,
            Milestone::ArrivedAtFacility => TimelineStep::ArrivedAtFacility,
        }
    }

    /// 允许记录该节点的派遣状态
    fn expected_status(&self) -> AssignmentStatus {
        match self {
            Milestone::DepartedBase => AssignmentStatus::EnRoute,
            Milestone::ArrivedAtFacility => AssignmentStatus::Transporting,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AssignmentRef {
    occurrence_id: Uuid,
    vehicle_id: Uuid,
}

/// 派遣结束方式
#[derive(Debug, Clone, Copy)]
enum Closing {
    Released { odometer_end: Option<u32> },
    Withdrawn { status: VehicleStatus },
}

/// 派遣调度台
#[derive(Debug)]
pub struct DispatchBoard {
    occurrences: Arc<OccurrenceRegistry>,
    vehicles: Arc<VehicleRegistry>,
    status_machine: VehicleStatusMachine,
    assignments: RwLock<HashMap<Uuid, AssignmentRef>>,
    search_radius_km: f64,
}

impl DispatchBoard {
    pub fn new(
        occurrences: Arc<OccurrenceRegistry>,
        vehicles: Arc<VehicleRegistry>,
        search_radius_km: f64,
    ) -> Self {
        Self {
            occurrences,
            vehicles,
            status_machine: VehicleStatusMachine::new(),
            assignments: RwLock::new(HashMap::new()),
            search_radius_km,
        }
    }

    /// 派遣车辆
    pub async fn assign_vehicle(
        &self,
        occurrence_id: Uuid,
        vehicle_id: Uuid,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        let operator = self.occurrences.operator(operator_id).await?;
        let occurrence_cell = self.occurrences.cell(occurrence_id).await?;
        let vehicle_cell = self.vehicles.cell(vehicle_id).await?;
        let mut occurrence = occurrence_cell.lock().await;
        let mut vehicle = vehicle_cell.lock().await;

        ensure_open(&occurrence, AuditEventKind::VehicleAssigned)?;
        if !vehicle.active {
            return Err(SamuError::vehicle_not_available(vehicle.id, "vehicle is decommissioned"));
        }
        if let Some(duty) = vehicle.duty {
            return Err(SamuError::vehicle_not_available(
                vehicle.id,
                format!(
                    "active assignment {} on occurrence {}",
                    duty.assignment_id, duty.occurrence_id
                ),
            ));
        }
        let status = vehicle.status();
        if status != VehicleStatus::Available {
            return Err(SamuError::vehicle_not_available(
                vehicle.id,
                format!("status is {}", status.as_str()),
            ));
        }
        self.status_machine.transition(status, VehicleStatus::EnRoute)?;

        let now = Utc::now();
        let mut timeline = AssignmentTimeline::default();
        timeline.stamp(TimelineStep::Dispatched, now)?;
        let assignment = VehicleAssignment {
            id: Uuid::new_v4(),
            occurrence_id,
            vehicle_id,
            plate: vehicle.plate.clone(),
            vehicle_type: vehicle.vehicle_type,
            status: AssignmentStatus::EnRoute,
            timeline,
            position: vehicle.base_location,
            crew: AssignedCrew::from_vehicle(&vehicle),
            odometer_start: vehicle.odometer_km,
            odometer_end: None,
            rating: None,
            complications: None,
        };

        let mut updated_vehicle = vehicle.clone();
        updated_vehicle.duty = Some(Duty {
            assignment_id: assignment.id,
            occurrence_id,
            status: AssignmentStatus::EnRoute,
        });
        updated_vehicle.status_since = now;

        let mut updated_occurrence = occurrence.clone();
        updated_occurrence.assignments.push(assignment.clone());

        let event = NewAuditEvent::new(
            occurrence_id,
            AuditEventKind::VehicleAssigned,
            occurrence.state,
            format!("Vehicle {} dispatched by {}", vehicle.plate, operator.name),
        )
        .by(operator.id, Some(operator.name.clone()))
        .for_assignment(assignment.id)
        .with_payload(serde_json::json!({
            "vehicle_id": vehicle.id,
            "plate": vehicle.plate,
            "type": vehicle.vehicle_type,
        }));

        self.commit(
            &mut occurrence,
            updated_occurrence,
            &mut vehicle,
            updated_vehicle,
            event,
            now,
        )
        .await?;
        self.assignments.write().await.insert(
            assignment.id,
            AssignmentRef {
                occurrence_id,
                vehicle_id,
            },
        );

        tracing::info!(
            "Vehicle {} assigned to occurrence {} (assignment {})",
            vehicle.plate,
            occurrence.code,
            assignment.id
        );
        Ok(assignment)
    }

    /// 上报车辆状态
    pub async fn report_status(
        &self,
        assignment_id: Uuid,
        new_status: VehicleStatus,
        at: DateTime<Utc>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        let operator = self.occurrences.operator(operator_id).await?;
        let reference = self.locate(assignment_id).await?;
        let occurrence_cell = self.occurrences.cell(reference.occurrence_id).await?;
        let vehicle_cell = self.vehicles.cell(reference.vehicle_id).await?;
        let mut occurrence = occurrence_cell.lock().await;
        let mut vehicle = vehicle_cell.lock().await;

        let assignment = occurrence
            .assignment(assignment_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
        if !assignment.status.is_active() {
            return Err(SamuError::illegal_transition(
                "assignment",
                assignment.status,
                new_status,
            ));
        }

        let from = vehicle.status();
        self.status_machine.transition(from, new_status)?;

        if new_status == VehicleStatus::Available {
            self.close_assignment(
                &mut occurrence,
                &mut vehicle,
                assignment_id,
                Closing::Released { odometer_end: None },
                at,
                &operator,
            )
            .await
        } else if new_status.is_operating() {
            self.progress_assignment(
                &mut occurrence,
                &mut vehicle,
                assignment_id,
                new_status,
                at,
                &operator,
            )
            .await
        } else {
            self.close_assignment(
                &mut occurrence,
                &mut vehicle,
                assignment_id,
                Closing::Withdrawn { status: new_status },
                at,
                &operator,
            )
            .await
        }
    }

    /// 释放车辆回基地
    pub async fn release_vehicle(
        &self,
        assignment_id: Uuid,
        odometer_end: Option<u32>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        let operator = self.occurrences.operator(operator_id).await?;
        let reference = self.locate(assignment_id).await?;
        let occurrence_cell = self.occurrences.cell(reference.occurrence_id).await?;
        let vehicle_cell = self.vehicles.cell(reference.vehicle_id).await?;
        let mut occurrence = occurrence_cell.lock().await;
        let mut vehicle = vehicle_cell.lock().await;

        let assignment = occurrence
            .assignment(assignment_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
        if assignment.status != AssignmentStatus::Transporting {
            return Err(SamuError::illegal_transition(
                "assignment",
                assignment.status,
                "Release",
            ));
        }
        self.status_machine
            .transition(vehicle.status(), VehicleStatus::Available)?;

        let now = Utc::now();
        let at = assignment.timeline.latest().map_or(now, |latest| latest.max(now));
        self.close_assignment(
            &mut occurrence,
            &mut vehicle,
            assignment_id,
            Closing::Released { odometer_end },
            at,
            &operator,
        )
        .await
    }

    /// 记录出发/到院等不改变状态的时间节点
    pub async fn record_milestone(
        &self,
        assignment_id: Uuid,
        milestone: Milestone,
        at: DateTime<Utc>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        let reference = self.locate(assignment_id).await?;
        let occurrence = self
            .occurrences
            .apply_update(
                reference.occurrence_id,
                operator_id,
                vec![Audience::Dispatch],
                |occurrence, operator, _now| {
                    let state = occurrence.state;
                    let assignment = occurrence
                        .assignment_mut(assignment_id)
                        .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
                    if assignment.status != milestone.expected_status() {
                        return Err(SamuError::illegal_transition(
                            "assignment",
                            assignment.status,
                            milestone,
                        ));
                    }
                    assignment.timeline.stamp(milestone.step(), at)?;
                    Ok(NewAuditEvent::new(
                        reference.occurrence_id,
                        AuditEventKind::VehicleMilestone,
                        state,
                        format!(
                            "Vehicle {} {:?} (reported by {})",
                            assignment.plate, milestone, operator.name
                        ),
                    )
                    .for_assignment(assignment_id)
                    .with_payload(serde_json::json!({
                        "milestone": milestone,
                        "at": at,
                    })))
                },
            )
            .await?;
        Self::find_assignment(&occurrence, assignment_id)
    }

    /// 更新车辆当前位置
    pub async fn update_position(
        &self,
        assignment_id: Uuid,
        latitude: f64,
        longitude: f64,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        let position = Coordinates::new(latitude, longitude);
        position.validate()?;
        let reference = self.locate(assignment_id).await?;

        let occurrence = self
            .occurrences
            .apply_update(
                reference.occurrence_id,
                operator_id,
                vec![Audience::Dispatch],
                |occurrence, operator, _now| {
                    let state = occurrence.state;
                    let assignment = occurrence
                        .assignment_mut(assignment_id)
                        .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
                    if !assignment.status.is_active() {
                        return Err(SamuError::illegal_transition(
                            "assignment",
                            assignment.status,
                            "UpdatePosition",
                        ));
                    }
                    assignment.position = Some(position);
                    Ok(NewAuditEvent::new(
                        reference.occurrence_id,
                        AuditEventKind::VehiclePositionUpdated,
                        state,
                        format!("Vehicle {} position updated by {}", assignment.plate, operator.name),
                    )
                    .for_assignment(assignment_id)
                    .with_payload(serde_json::json!({
                        "latitude": latitude,
                        "longitude": longitude,
                    })))
                },
            )
            .await?;
        Self::find_assignment(&occurrence, assignment_id)
    }

    /// 记录服务质量评价，释放后也可记录
    pub async fn record_quality(
        &self,
        assignment_id: Uuid,
        rating: u8,
        complications: Option<String>,
        operator_id: Uuid,
    ) -> Result<VehicleAssignment> {
        if !(1..=5).contains(&rating) {
            return Err(SamuError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }
        let reference = self.locate(assignment_id).await?;

        let occurrence = self
            .occurrences
            .apply_update(
                reference.occurrence_id,
                operator_id,
                vec![Audience::Dispatch],
                |occurrence, operator, _now| {
                    let state = occurrence.state;
                    let assignment = occurrence
                        .assignment_mut(assignment_id)
                        .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
                    assignment.rating = Some(rating);
                    assignment.complications = complications;
                    Ok(NewAuditEvent::new(
                        reference.occurrence_id,
                        AuditEventKind::QualityRecorded,
                        state,
                        format!(
                            "Quality rating {} recorded for vehicle {} by {}",
                            rating, assignment.plate, operator.name
                        ),
                    )
                    .for_assignment(assignment_id))
                },
            )
            .await?;
        Self::find_assignment(&occurrence, assignment_id)
    }

    /// 行政状态变更：维护、故障、暂不可用、恢复服务。
    /// 执勤中的车辆会被撤回。
    pub async fn set_vehicle_status(
        &self,
        vehicle_id: Uuid,
        status: VehicleStatus,
        operator_id: Uuid,
    ) -> Result<Vehicle> {
        let operator = self.occurrences.operator(operator_id).await?;

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let snapshot = self.vehicles.get(vehicle_id).await?;
            if !snapshot.active {
                return Err(SamuError::vehicle_not_available(
                    vehicle_id,
                    "vehicle is decommissioned",
                ));
            }
            match snapshot.duty {
                None => {
                    let vehicle_cell = self.vehicles.cell(vehicle_id).await?;
                    let mut vehicle = vehicle_cell.lock().await;
                    if vehicle.duty.is_some() {
                        continue;
                    }
                    if !vehicle.active {
                        return Err(SamuError::vehicle_not_available(
                            vehicle.id,
                            "vehicle is decommissioned",
                        ));
                    }

                    let from = vehicle.status();
                    self.status_machine.transition(from, status)?;
                    ensure_administrative(status)?;
                    let mut updated = vehicle.clone();
                    updated.standby_status = status;
                    updated.status_since = Utc::now();
                    self.vehicles.persist(&updated).await?;
                    self.vehicles.install(&mut vehicle, updated).await;

                    let mut audiences = vec![Audience::Fleet];
                    if status == VehicleStatus::Broken {
                        audiences.push(Audience::Alerts);
                    }
                    self.occurrences.bus().publish(Notification::for_vehicle(
                        &vehicle,
                        AuditEventKind::VehicleStatusChanged.as_str(),
                        audiences,
                    ));
                    tracing::info!(
                        "Vehicle {} status {} -> {} by {}",
                        vehicle.plate,
                        from.as_str(),
                        status.as_str(),
                        operator.name
                    );
                    return Ok(vehicle.clone());
                }
                Some(duty) => {
                    if status == VehicleStatus::Available {
                        return Err(SamuError::illegal_transition(
                            "vehicle",
                            snapshot.status(),
                            status,
                        ));
                    }
                    let occurrence_cell = self.occurrences.cell(duty.occurrence_id).await?;
                    let vehicle_cell = self.vehicles.cell(vehicle_id).await?;
                    let mut occurrence = occurrence_cell.lock().await;
                    let mut vehicle = vehicle_cell.lock().await;
                    if vehicle.duty.map(|d| d.assignment_id) != Some(duty.assignment_id) {
                        continue;
                    }

                    self.status_machine.transition(vehicle.status(), status)?;
                    ensure_administrative(status)?;
                    let now = Utc::now();
                    let at = occurrence
                        .assignment(duty.assignment_id)
                        .and_then(|a| a.timeline.latest())
                        .map_or(now, |latest| latest.max(now));
                    self.close_assignment(
                        &mut occurrence,
                        &mut vehicle,
                        duty.assignment_id,
                        Closing::Withdrawn { status },
                        at,
                        &operator,
                    )
                    .await?;
                    return Ok(vehicle.clone());
                }
            }
        }

        Err(SamuError::Internal(format!(
            "vehicle {} kept changing while its status was being set",
            vehicle_id
        )))
    }

    /// 为事件推荐车辆；未指定类型时按最严重患者的风险建议
    pub async fn suggest_vehicle(
        &self,
        occurrence_id: Uuid,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Option<Candidate>> {
        let occurrence = self.occurrences.get(occurrence_id).await?;
        let vehicle_type = vehicle_type.unwrap_or_else(|| {
            occurrence
                .patients
                .iter()
                .filter_map(|p| p.risk)
                .min()
                .unwrap_or(RiskClassification::None)
                .suggested_vehicle_type()
        });

        let query = CandidateQuery {
            vehicle_type,
            near: occurrence.coordinates,
            max_distance_km: self.search_radius_km,
        };
        Ok(self.vehicles.select_candidate(&query).await)
    }

    pub async fn assignment(&self, assignment_id: Uuid) -> Result<VehicleAssignment> {
        let reference = self.locate(assignment_id).await?;
        let occurrence = self.occurrences.get(reference.occurrence_id).await?;
        Self::find_assignment(&occurrence, assignment_id)
    }

    /// 所有进行中的派遣
    pub async fn active_assignments(&self) -> Vec<VehicleAssignment> {
        self.occurrences
            .snapshots()
            .await
            .into_iter()
            .flat_map(|o| o.assignments.into_iter().filter(|a| a.status.is_active()))
            .collect()
    }

    /// 从事件快照重建派遣索引
    pub async fn restore(&self, occurrences: &[Occurrence]) {
        let mut index = self.assignments.write().await;
        for occurrence in occurrences {
            for assignment in &occurrence.assignments {
                index.insert(
                    assignment.id,
                    AssignmentRef {
                        occurrence_id: occurrence.id,
                        vehicle_id: assignment.vehicle_id,
                    },
                );
            }
        }
    }

    async fn progress_assignment(
        &self,
        occurrence: &mut Occurrence,
        vehicle: &mut Vehicle,
        assignment_id: Uuid,
        new_status: VehicleStatus,
        at: DateTime<Utc>,
        operator: &DirectoryEntry,
    ) -> Result<VehicleAssignment> {
        let step = match new_status {
            VehicleStatus::AtScene => TimelineStep::ArrivedAtScene,
            VehicleStatus::Transporting => TimelineStep::DepartedScene,
            other => {
                return Err(SamuError::illegal_transition("assignment", vehicle.status(), other))
            }
        };
        let assignment_status = AssignmentStatus::from_vehicle_status(new_status)
            .ok_or_else(|| SamuError::illegal_transition("assignment", vehicle.status(), new_status))?;
        let from = vehicle.status();

        let mut updated_occurrence = occurrence.clone();
        let assignment = updated_occurrence
            .assignment_mut(assignment_id)
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;
        assignment.timeline.stamp(step, at)?;
        assignment.status = assignment_status;
        let result = assignment.clone();

        let mut updated_vehicle = vehicle.clone();
        updated_vehicle.duty = Some(Duty {
            assignment_id,
            occurrence_id: occurrence.id,
            status: assignment_status,
        });
        updated_vehicle.status_since = at.min(Utc::now());

        let event = NewAuditEvent::new(
            occurrence.id,
            AuditEventKind::VehicleStatusChanged,
            occurrence.state,
            format!(
                "Vehicle {} {} -> {} (reported by {})",
                vehicle.plate,
                from.as_str(),
                new_status.as_str(),
                operator.name
            ),
        )
        .by(operator.id, Some(operator.name.clone()))
        .for_assignment(assignment_id)
        .with_payload(serde_json::json!({
            "from": from.as_str(),
            "to": new_status.as_str(),
            "at": at,
        }));

        self.commit(occurrence, updated_occurrence, vehicle, updated_vehicle, event, Utc::now())
            .await?;
        tracing::info!(
            "Vehicle {} {} -> {} on occurrence {}",
            vehicle.plate,
            from.as_str(),
            new_status.as_str(),
            occurrence.code
        );
        Ok(result)
    }

    async fn close_assignment(
        &self,
        occurrence: &mut Occurrence,
        vehicle: &mut Vehicle,
        assignment_id: Uuid,
        closing: Closing,
        at: DateTime<Utc>,
        operator: &DirectoryEntry,
    ) -> Result<VehicleAssignment> {
        let from = vehicle.status();
        let mut updated_occurrence = occurrence.clone();
        let assignment = updated_occurrence
            .assignment_mut(assignment_id)
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))?;

        let mut updated_vehicle = vehicle.clone();
        updated_vehicle.duty = None;
        updated_vehicle.status_since = at.min(Utc::now());

        assignment.timeline.stamp(TimelineStep::Released, at)?;
        let (kind, description, to) = match closing {
            Closing::Released { odometer_end } => {
                if let Some(end) = odometer_end {
                    if end < assignment.odometer_start {
                        return Err(SamuError::Validation(format!(
                            "odometer end {} is lower than start {}",
                            end, assignment.odometer_start
                        )));
                    }
                    assignment.odometer_end = Some(end);
                    updated_vehicle.odometer_km = updated_vehicle.odometer_km.max(end);
                }
                assignment.status = AssignmentStatus::Released;
                updated_vehicle.standby_status = VehicleStatus::Available;
                (
                    AuditEventKind::VehicleReleased,
                    format!("Vehicle {} released by {}", vehicle.plate, operator.name),
                    VehicleStatus::Available,
                )
            }
            Closing::Withdrawn { status } => {
                assignment.status = AssignmentStatus::Withdrawn;
                updated_vehicle.standby_status = status;
                (
                    AuditEventKind::VehicleStatusChanged,
                    format!(
                        "Vehicle {} withdrawn: {} -> {} by {}",
                        vehicle.plate,
                        from.as_str(),
                        status.as_str(),
                        operator.name
                    ),
                    status,
                )
            }
        };
        let result = assignment.clone();

        let event = NewAuditEvent::new(occurrence.id, kind, occurrence.state, description)
            .by(operator.id, Some(operator.name.clone()))
            .for_assignment(assignment_id)
            .with_payload(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "withdrawn": matches!(closing, Closing::Withdrawn { .. }),
                "odometer_end": result.odometer_end,
            }));

        self.commit(occurrence, updated_occurrence, vehicle, updated_vehicle, event, Utc::now())
            .await?;
        tracing::info!(
            "Assignment {} of vehicle {} closed as {:?}; vehicle now {}",
            assignment_id,
            vehicle.plate,
            result.status,
            vehicle.status().as_str()
        );
        Ok(result)
    }

    /// 事件与车辆作为一个单元提交
    async fn commit(
        &self,
        occurrence: &mut Occurrence,
        updated_occurrence: Occurrence,
        vehicle: &mut Vehicle,
        updated_vehicle: Vehicle,
        event: NewAuditEvent,
        now: DateTime<Utc>,
    ) -> Result<AuditEvent> {
        let event_log = self.occurrences.event_log();
        let event = event_log.stamp(event, now).await;

        let store = &self.occurrences.collaborators().store;
        if let Err(err) = store
            .save_dispatch(&updated_occurrence, &updated_vehicle, &event)
            .await
        {
            tracing::error!(
                "Failed to persist {} for vehicle {}: {}",
                event.kind.as_str(),
                updated_vehicle.plate,
                err
            );
            return Err(err);
        }
        event_log.append(event.clone()).await?;
        self.occurrences.install(occurrence, updated_occurrence).await;
        self.vehicles.install(vehicle, updated_vehicle).await;

        let bus = self.occurrences.bus();
        bus.publish(
            Notification::for_occurrence(occurrence, &event, vec![Audience::Dispatch])
                .with_vehicle(vehicle.id),
        );
        bus.publish(Notification::for_vehicle(
            vehicle,
            event.kind.as_str(),
            vec![Audience::Fleet],
        ));
        Ok(event)
    }

    async fn locate(&self, assignment_id: Uuid) -> Result<AssignmentRef> {
        self.assignments
            .read()
            .await
            .get(&assignment_id)
            .copied()
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))
    }

    fn find_assignment(occurrence: &Occurrence, assignment_id: Uuid) -> Result<VehicleAssignment> {
        occurrence
            .assignment(assignment_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("assignment", assignment_id))
    }
}

/// 运行状态只能通过派遣任务上报
fn ensure_administrative(status: VehicleStatus) -> Result<()> {
    if status.is_operating() {
        return Err(SamuError::Validation(format!(
            "{} is reported through an assignment",
            status.as_str()
        )));
    }
    Ok(())
}
