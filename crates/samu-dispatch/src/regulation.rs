//! 医疗调节工作台
//!
//! 调节医生接手事件、为患者给出诊断假设、风险分级与目的医院，结束调节并关闭事件。

use samu_core::{
    AuditEventKind, NewAuditEvent, Occurrence, OccurrenceState, PatientRecord,
    RiskClassification, Result, SamuError, VitalSigns,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::notification::Audience;
use crate::occurrence::OccurrenceRegistry;
use crate::state_machine::OccurrenceEvent;

/// 患者调节内容；为空的字段保持原值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRegulation {
    pub hypothesis: Option<String>,
    pub risk: Option<RiskClassification>,
    pub destination_facility_id: Option<Uuid>,
    pub clinical_picture: Option<String>,
    pub history: Option<String>,
    pub vitals: Option<VitalSigns>,
}

/// 医疗调节工作台
#[derive(Debug)]
pub struct RegulationWorkstation {
    occurrences: Arc<OccurrenceRegistry>,
}

impl RegulationWorkstation {
    pub fn new(occurrences: Arc<OccurrenceRegistry>) -> Self {
        Self { occurrences }
    }

    /// 开始调节
    pub async fn start_regulation(&self, occurrence_id: Uuid, regulator_id: Uuid) -> Result<Occurrence> {
        self.occurrences
            .apply_transition(
                occurrence_id,
                regulator_id,
                OccurrenceEvent::StartRegulation,
                vec![Audience::Dispatch, Audience::Regulation],
                |occurrence, regulator, _now| {
                    occurrence.regulator_id = Some(regulator.id);
                    Ok(NewAuditEvent::new(
                        occurrence.id,
                        AuditEventKind::RegulationStarted,
                        occurrence.state,
                        format!("Regulation started by {}", regulator.name),
                    ))
                },
            )
            .await
    }

    /// 中止调节，事件回到等待调节队列
    pub async fn abort_regulation(
        &self,
        occurrence_id: Uuid,
        reason: &str,
        regulator_id: Uuid,
    ) -> Result<Occurrence> {
        if reason.trim().is_empty() {
            return Err(SamuError::Validation("abort reason is required".to_string()));
        }
        self.occurrences
            .apply_transition(
                occurrence_id,
                regulator_id,
                OccurrenceEvent::AbortRegulation,
                vec![Audience::Dispatch, Audience::Regulation],
                |occurrence, regulator, _now| {
                    let previous = occurrence.regulator_id.take();
                    Ok(NewAuditEvent::new(
                        occurrence.id,
                        AuditEventKind::RegulationAborted,
                        occurrence.state,
                        format!("Regulation aborted by {}: {}", regulator.name, reason),
                    )
                    .with_payload(serde_json::json!({
                        "reason": reason,
                        "previous_regulator": previous,
                    })))
                },
            )
            .await
    }

    /// 调节患者
    pub async fn regulate_patient(
        &self,
        patient_id: Uuid,
        regulation: PatientRegulation,
        regulator_id: Uuid,
    ) -> Result<PatientRecord> {
        if let Some(vitals) = &regulation.vitals {
            vitals.validate()?;
        }
        if let Some(facility_id) = regulation.destination_facility_id {
            self.occurrences
                .collaborators()
                .facilities
                .find_facility(facility_id)
                .await?
                .ok_or_else(|| SamuError::not_found("facility", facility_id))?;
        }
        let occurrence_id = self.occurrences.occurrence_for_patient(patient_id).await?;

        let occurrence = self
            .occurrences
            .apply_update(
                occurrence_id,
                regulator_id,
                vec![Audience::Regulation],
                |occurrence, regulator, now| {
                    if !matches!(
                        occurrence.state,
                        OccurrenceState::InRegulation | OccurrenceState::Regulated
                    ) {
                        return Err(SamuError::illegal_transition(
                            "occurrence",
                            occurrence.state,
                            AuditEventKind::PatientRegulated.as_str(),
                        ));
                    }
                    let state = occurrence.state;
                    let patient = occurrence
                        .patient_mut(patient_id)
                        .ok_or_else(|| SamuError::not_found("patient", patient_id))?;

                    let PatientRegulation {
                        hypothesis,
                        risk,
                        destination_facility_id,
                        clinical_picture,
                        history,
                        vitals,
                    } = regulation;
                    if let Some(hypothesis) = hypothesis {
                        patient.hypothesis = Some(hypothesis);
                    }
                    if risk.is_some() {
                        patient.risk = risk;
                    }
                    if destination_facility_id.is_some() {
                        patient.destination_facility_id = destination_facility_id;
                    }
                    if clinical_picture.is_some() {
                        patient.clinical_picture = clinical_picture;
                    }
                    if history.is_some() {
                        patient.history = history;
                    }
                    if let Some(vitals) = vitals {
                        patient.vitals = vitals;
                    }

                    let regulated = patient.is_regulated();
                    if regulated {
                        patient.follow_up = false;
                        if patient.regulated_at.is_none() {
                            patient.regulated_at = Some(now);
                        }
                    }

                    Ok(NewAuditEvent::new(
                        occurrence_id,
                        AuditEventKind::PatientRegulated,
                        state,
                        format!(
                            "Patient {} regulated by {} (risk {:?})",
                            patient.name.as_deref().unwrap_or("unidentified"),
                            regulator.name,
                            patient.risk
                        ),
                    )
                    .for_patient(patient_id)
                    .with_payload(serde_json::json!({
                        "risk": patient.risk,
                        "destination_facility_id": patient.destination_facility_id,
                        "regulated": regulated,
                    })))
                },
            )
            .await?;

        occurrence
            .patient(patient_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("patient", patient_id))
    }

    /// 结束调节；未调节的患者标记为需跟进
    pub async fn finish_regulation(
        &self,
        occurrence_id: Uuid,
        external_support_note: Option<&str>,
        regulator_id: Uuid,
    ) -> Result<Occurrence> {
        self.occurrences
            .apply_transition(
                occurrence_id,
                regulator_id,
                OccurrenceEvent::FinishRegulation,
                vec![Audience::Dispatch, Audience::Regulation],
                |occurrence, regulator, _now| {
                    let follow_up = occurrence.unregulated_patients();
                    for patient in occurrence.patients.iter_mut() {
                        patient.follow_up = follow_up.contains(&patient.id);
                    }
                    if let Some(note) = external_support_note.map(str::trim).filter(|n| !n.is_empty()) {
                        occurrence.append_note(&format!("[SUPPORT] {}", note));
                    }
                    if !follow_up.is_empty() {
                        tracing::warn!(
                            "Occurrence {} regulated with {} patients pending follow-up",
                            occurrence.code,
                            follow_up.len()
                        );
                    }

                    Ok(NewAuditEvent::new(
                        occurrence.id,
                        AuditEventKind::RegulationFinished,
                        occurrence.state,
                        format!("Regulation finished by {}", regulator.name),
                    )
                    .with_payload(serde_json::json!({
                        "follow_up": follow_up,
                        "support_note": external_support_note,
                    })))
                },
            )
            .await
    }

    /// 关闭事件，任何非终态均可关闭
    pub async fn close_occurrence(&self, occurrence_id: Uuid, operator_id: Uuid) -> Result<Occurrence> {
        let occurrence = self
            .occurrences
            .apply_transition(
                occurrence_id,
                operator_id,
                OccurrenceEvent::Close,
                vec![Audience::Dispatch, Audience::Regulation],
                |occurrence, operator, now| {
                    occurrence.closed_at = Some(now);
                    Ok(NewAuditEvent::new(
                        occurrence.id,
                        AuditEventKind::Closed,
                        occurrence.state,
                        format!("Occurrence closed by {}", operator.name),
                    )
                    .with_payload(serde_json::json!({
                        "active_assignments": occurrence.active_assignments().len(),
                    })))
                },
            )
            .await?;

        let active = occurrence.active_assignments().len();
        if active > 0 {
            tracing::warn!(
                "Occurrence {} closed with {} vehicles still on duty",
                occurrence.code,
                active
            );
        }
        Ok(occurrence)
    }

    /// 调节队列，按优先级与等待时间排序
    pub async fn queue(&self, regulation_center_id: Option<Uuid>) -> Vec<Occurrence> {
        self.occurrences.regulation_queue(regulation_center_id).await
    }

    /// 含危重/高风险患者的事件
    pub async fn critical_occurrences(&self) -> Vec<Occurrence> {
        self.occurrences.critical_occurrences().await
    }
}
