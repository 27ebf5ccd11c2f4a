//! 数据库模型
//!
//! 聚合整体以 JSONB 文档保存，常用查询字段单独成列。

use chrono::{DateTime, Utc};
use samu_core::{AuditEvent, Occurrence, Result, SamuError, Vehicle};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// 数据库事件表
#[derive(Debug, FromRow)]
pub struct DbOccurrence {
    pub id: Uuid,
    pub code: String,
    pub state: String,
    pub priority: i16,
    pub regulation_center_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub document: Json<serde_json::Value>,
}

impl DbOccurrence {
    pub fn from_occurrence(occurrence: &Occurrence) -> Result<Self> {
        Ok(Self {
            id: occurrence.id,
            code: occurrence.code.clone(),
            state: occurrence.state.as_str().to_string(),
            priority: i16::from(occurrence.priority.level()),
            regulation_center_id: occurrence.regulation_center_id,
            created_at: occurrence.created_at,
            document: Json(serde_json::to_value(occurrence)?),
        })
    }
}

impl TryFrom<DbOccurrence> for Occurrence {
    type Error = SamuError;

    fn try_from(row: DbOccurrence) -> Result<Self> {
        Ok(serde_json::from_value(row.document.0)?)
    }
}

/// 数据库车辆表
#[derive(Debug, FromRow)]
pub struct DbVehicle {
    pub id: Uuid,
    pub plate: String,
    pub status: String,
    pub active: bool,
    pub document: Json<serde_json::Value>,
}

impl DbVehicle {
    pub fn from_vehicle(vehicle: &Vehicle) -> Result<Self> {
        Ok(Self {
            id: vehicle.id,
            plate: vehicle.plate.clone(),
            status: vehicle.status().as_str().to_string(),
            active: vehicle.active,
            document: Json(serde_json::to_value(vehicle)?),
        })
    }
}

impl TryFrom<DbVehicle> for Vehicle {
    type Error = SamuError;

    fn try_from(row: DbVehicle) -> Result<Self> {
        Ok(serde_json::from_value(row.document.0)?)
    }
}

/// 数据库审计表
#[derive(Debug, FromRow)]
pub struct DbAuditEvent {
    pub id: Uuid,
    pub sequence: i64,
    pub occurrence_id: Uuid,
    pub kind: String,
    pub assignment_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub document: Json<serde_json::Value>,
}

impl DbAuditEvent {
    pub fn from_event(event: &AuditEvent) -> Result<Self> {
        let sequence = i64::try_from(event.sequence)
            .map_err(|_| SamuError::Storage(format!("sequence {} out of range", event.sequence)))?;
        Ok(Self {
            id: event.id,
            sequence,
            occurrence_id: event.occurrence_id,
            kind: event.kind.as_str().to_string(),
            assignment_id: event.assignment_id,
            patient_id: event.patient_id,
            recorded_at: event.timestamp,
            document: Json(serde_json::to_value(event)?),
        })
    }
}

impl TryFrom<DbAuditEvent> for AuditEvent {
    type Error = SamuError;

    fn try_from(row: DbAuditEvent) -> Result<Self> {
        Ok(serde_json::from_value(row.document.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samu_core::{AuditEventKind, OccurrenceState, Priority, VehicleStatus, VehicleType};

    fn occurrence() -> Occurrence {
        let now = Utc::now();
        Occurrence {
            id: Uuid::new_v4(),
            code: "20261018-00042".to_string(),
            call_type: "MEDICAL".to_string(),
            state: OccurrenceState::AwaitingRegulation,
            priority: Priority::Urgent,
            caller_phone: "11987654321".to_string(),
            caller_name: None,
            location_text: "Rua Augusta, 200".to_string(),
            coordinates: None,
            description: "fall from ladder".to_string(),
            notes: String::new(),
            created_at: now,
            closed_at: None,
            state_since: now,
            regulation_center_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            regulator_id: None,
            patients: vec![],
            assignments: vec![],
        }
    }

    #[test]
    fn test_occurrence_columns() {
        let occurrence = occurrence();
        let row = DbOccurrence::from_occurrence(&occurrence).unwrap();

        assert_eq!(row.state, "AWAITING_REGULATION");
        assert_eq!(row.priority, 2);
        assert_eq!(row.code, occurrence.code);
        assert_eq!(Occurrence::try_from(row).unwrap(), occurrence);
    }

    #[test]
    fn test_vehicle_columns_use_derived_status() {
        let vehicle = Vehicle::new("ABC1D23", VehicleType::Basic, Uuid::new_v4(), None);
        let row = DbVehicle::from_vehicle(&vehicle).unwrap();
        assert_eq!(row.status, VehicleStatus::Available.as_str());
        assert!(row.active);
    }

    #[test]
    fn test_audit_event_columns() {
        let occurrence = occurrence();
        let assignment_id = Uuid::new_v4();
        let event = AuditEvent {
            id: Uuid::new_v4(),
            sequence: 7,
            occurrence_id: occurrence.id,
            kind: AuditEventKind::VehicleAssigned,
            description: "Vehicle dispatched".to_string(),
            operator_id: None,
            operator_name: None,
            assignment_id: Some(assignment_id),
            patient_id: None,
            occurrence_state: occurrence.state,
            timestamp: Utc::now(),
            payload: None,
        };

        let row = DbAuditEvent::from_event(&event).unwrap();
        assert_eq!(row.kind, "vehicle-assigned");
        assert_eq!(row.assignment_id, Some(assignment_id));
        assert_eq!(row.sequence, 7);
        assert_eq!(AuditEvent::try_from(row).unwrap(), event);
    }
}
