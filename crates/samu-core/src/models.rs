//! 核心数据模型定义
//!
//! 急救事件（Occurrence）、事件内患者记录与审计事件。车辆相关模型见 [`crate::fleet`]。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SamuError};
use crate::fleet::{VehicleAssignment, VehicleType};

/// 地理坐标
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// 纬度在 [-90, 90]，经度在 [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SamuError::Validation(format!(
                "invalid coordinates: {}, {}",
                self.latitude, self.longitude
            )))
        }
    }
}

/// 事件优先级，数值越小越紧急
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Emergency,  // 紧急
    Urgent,     // 急
    LessUrgent, // 次急
    NonUrgent,  // 非紧急
}

impl Priority {
    /// 优先级等级（1 = 最紧急）
    pub fn level(&self) -> u8 {
        match self {
            Priority::Emergency => 1,
            Priority::Urgent => 2,
            Priority::LessUrgent => 3,
            Priority::NonUrgent => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::Emergency),
            2 => Some(Priority::Urgent),
            3 => Some(Priority::LessUrgent),
            4 => Some(Priority::NonUrgent),
            _ => None,
        }
    }

    /// 是否属于最紧急的两个等级
    pub fn is_urgent(&self) -> bool {
        self.level() <= 2
    }

    pub fn all() -> Vec<Priority> {
        vec![
            Priority::Emergency,
            Priority::Urgent,
            Priority::LessUrgent,
            Priority::NonUrgent,
        ]
    }
}

/// 事件生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OccurrenceState {
    Open,               // 已开立
    AwaitingRegulation, // 等待医疗调节
    InRegulation,       // 调节中
    Regulated,          // 已调节
    Closed,             // 已关闭
}

impl OccurrenceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OccurrenceState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceState::Open => "OPEN",
            OccurrenceState::AwaitingRegulation => "AWAITING_REGULATION",
            OccurrenceState::InRegulation => "IN_REGULATION",
            OccurrenceState::Regulated => "REGULATED",
            OccurrenceState::Closed => "CLOSED",
        }
    }

    pub fn all() -> Vec<OccurrenceState> {
        vec![
            OccurrenceState::Open,
            OccurrenceState::AwaitingRegulation,
            OccurrenceState::InRegulation,
            OccurrenceState::Regulated,
            OccurrenceState::Closed,
        ]
    }
}

/// 风险分级（电话评估的推定风险）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskClassification {
    Critical, // 危重
    High,     // 高
    Moderate, // 中
    Low,      // 低
    None,     // 无法评估
}

impl RiskClassification {
    /// 建议最长响应时间（分钟）
    pub fn max_response_minutes(&self) -> i64 {
        match self {
            RiskClassification::Critical => 8,
            RiskClassification::High => 15,
            RiskClassification::Moderate => 30,
            RiskClassification::Low => 60,
            RiskClassification::None => 20,
        }
    }

    /// 建议派遣的车辆类型
    pub fn suggested_vehicle_type(&self) -> VehicleType {
        match self {
            RiskClassification::Critical => VehicleType::Icu,
            RiskClassification::High => VehicleType::Advanced,
            _ => VehicleType::Basic,
        }
    }

    pub fn is_severe(&self) -> bool {
        matches!(self, RiskClassification::Critical | RiskClassification::High)
    }
}

/// 性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// 患者年龄，婴儿以月计
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatientAge {
    Years(u16),
    Months(u16),
}

/// 生命体征
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VitalSigns {
    pub blood_pressure: Option<String>, // 血压，如 "120/80"
    pub heart_rate: Option<u16>,
    pub respiratory_rate: Option<u16>,
    pub oxygen_saturation: Option<u8>,
    pub temperature: Option<f32>,
    pub glasgow: Option<u8>, // 格拉斯哥昏迷评分
}

impl VitalSigns {
    pub fn validate(&self) -> Result<()> {
        if let Some(spo2) = self.oxygen_saturation {
            if spo2 > 100 {
                return Err(SamuError::Validation(format!(
                    "oxygen saturation out of range: {}",
                    spo2
                )));
            }
        }
        if let Some(glasgow) = self.glasgow {
            if !(3..=15).contains(&glasgow) {
                return Err(SamuError::Validation(format!(
                    "glasgow score out of range: {}",
                    glasgow
                )));
            }
        }
        if let Some(temperature) = self.temperature {
            if !(20.0..=45.0).contains(&temperature) {
                return Err(SamuError::Validation(format!(
                    "temperature out of range: {}",
                    temperature
                )));
            }
        }
        Ok(())
    }
}

/// 事件内的患者记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub id: Uuid,
    pub occurrence_id: Uuid,
    pub name: Option<String>, // 报告的姓名
    pub age: Option<PatientAge>,
    pub sex: Sex,
    pub chief_complaint: String, // 主诉
    pub hypothesis: Option<String>, // 诊断假设
    pub risk: Option<RiskClassification>,
    pub destination_facility_id: Option<Uuid>,
    pub clinical_picture: Option<String>,
    pub history: Option<String>,
    pub vitals: VitalSigns,
    /// 调节结束时仍未调节，需要后续跟进
    pub follow_up: bool,
    pub created_at: DateTime<Utc>,
    pub regulated_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// 诊断假设与风险分级均已设置
    pub fn is_regulated(&self) -> bool {
        self.hypothesis.as_deref().map_or(false, |h| !h.trim().is_empty()) && self.risk.is_some()
    }
}

/// 新增患者请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: Option<String>,
    pub age: Option<PatientAge>,
    pub sex: Sex,
    pub chief_complaint: String,
}

impl NewPatient {
    pub fn validate(&self) -> Result<()> {
        if self.chief_complaint.trim().is_empty() {
            return Err(SamuError::Validation("chief complaint is required".to_string()));
        }
        Ok(())
    }

    pub fn into_record(self, occurrence_id: Uuid, now: DateTime<Utc>) -> PatientRecord {
        PatientRecord {
            id: Uuid::new_v4(),
            occurrence_id,
            name: self.name,
            age: self.age,
            sex: self.sex,
            chief_complaint: self.chief_complaint,
            hypothesis: None,
            risk: None,
            destination_facility_id: None,
            clinical_picture: None,
            history: None,
            vitals: VitalSigns::default(),
            follow_up: false,
            created_at: now,
            regulated_at: None,
        }
    }
}

/// 急救事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Occurrence {
    pub id: Uuid,
    pub code: String, // 显示用流水号
    pub call_type: String,
    pub state: OccurrenceState,
    pub priority: Priority,
    pub caller_phone: String,
    pub caller_name: Option<String>,
    pub location_text: String,
    pub coordinates: Option<Coordinates>,
    pub description: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// 进入当前状态的时间
    pub state_since: DateTime<Utc>,
    pub regulation_center_id: Uuid,
    pub created_by: Uuid,
    pub regulator_id: Option<Uuid>,
    pub patients: Vec<PatientRecord>,
    pub assignments: Vec<VehicleAssignment>,
}

impl Occurrence {
    pub fn patient(&self, patient_id: Uuid) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == patient_id)
    }

    pub fn patient_mut(&mut self, patient_id: Uuid) -> Option<&mut PatientRecord> {
        self.patients.iter_mut().find(|p| p.id == patient_id)
    }

    pub fn assignment(&self, assignment_id: Uuid) -> Option<&VehicleAssignment> {
        self.assignments.iter().find(|a| a.id == assignment_id)
    }

    pub fn assignment_mut(&mut self, assignment_id: Uuid) -> Option<&mut VehicleAssignment> {
        self.assignments.iter_mut().find(|a| a.id == assignment_id)
    }

    pub fn active_assignments(&self) -> Vec<&VehicleAssignment> {
        self.assignments.iter().filter(|a| a.status.is_active()).collect()
    }

    pub fn unregulated_patients(&self) -> Vec<Uuid> {
        self.patients
            .iter()
            .filter(|p| !p.is_regulated())
            .map(|p| p.id)
            .collect()
    }

    pub fn has_severe_patient(&self) -> bool {
        self.patients
            .iter()
            .any(|p| p.risk.map_or(false, |r| r.is_severe()))
    }

    /// 追加一行备注
    pub fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

/// 创建事件请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOccurrence {
    pub call_type: String,
    pub priority: Option<Priority>,
    pub caller_phone: String,
    pub caller_name: Option<String>,
    pub location_text: String,
    pub coordinates: Option<Coordinates>,
    pub description: String,
    pub notes: Option<String>,
    pub regulation_center_id: Option<Uuid>,
    pub patients: Vec<NewPatient>,
}

impl NewOccurrence {
    /// 必填字段校验
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.call_type.trim().is_empty() {
            missing.push("call_type");
        }
        if self.priority.is_none() {
            missing.push("priority");
        }
        if self.caller_phone.trim().is_empty() {
            missing.push("caller_phone");
        }
        if self.location_text.trim().is_empty() {
            missing.push("location_text");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.regulation_center_id.is_none() {
            missing.push("regulation_center_id");
        }
        if !missing.is_empty() {
            return Err(SamuError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        if !crate::utils::is_valid_phone(&self.caller_phone) {
            return Err(SamuError::Validation(format!(
                "invalid caller phone: {}",
                self.caller_phone
            )));
        }
        if let Some(coordinates) = &self.coordinates {
            coordinates.validate()?;
        }
        for patient in &self.patients {
            patient.validate()?;
        }
        Ok(())
    }
}

/// 审计事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventKind {
    Creation,
    EscalatedToRegulation,
    RegulationStarted,
    RegulationAborted,
    PatientAdded,
    PatientRegulated,
    RegulationFinished,
    VehicleAssigned,
    VehicleStatusChanged,
    VehicleMilestone,
    VehiclePositionUpdated,
    VehicleReleased,
    QualityRecorded,
    LocationUpdated,
    PriorityChanged,
    Closed,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::EscalatedToRegulation => "escalation-to-regulation",
            Self::RegulationStarted => "regulation-started",
            Self::RegulationAborted => "regulation-aborted",
            Self::PatientAdded => "patient-added",
            Self::PatientRegulated => "patient-regulated",
            Self::RegulationFinished => "regulation-finished",
            Self::VehicleAssigned => "vehicle-assigned",
            Self::VehicleStatusChanged => "vehicle-status-changed",
            Self::VehicleMilestone => "vehicle-milestone",
            Self::VehiclePositionUpdated => "vehicle-position-updated",
            Self::VehicleReleased => "vehicle-released",
            Self::QualityRecorded => "quality-recorded",
            Self::LocationUpdated => "location-updated",
            Self::PriorityChanged => "priority-changed",
            Self::Closed => "closed",
        }
    }
}

impl TryFrom<&str> for AuditEventKind {
    type Error = SamuError;

    fn try_from(value: &str) -> Result<Self> {
        let kind = match value {
            "creation" => Self::Creation,
            "escalation-to-regulation" => Self::EscalatedToRegulation,
            "regulation-started" => Self::RegulationStarted,
            "regulation-aborted" => Self::RegulationAborted,
            "patient-added" => Self::PatientAdded,
            "patient-regulated" => Self::PatientRegulated,
            "regulation-finished" => Self::RegulationFinished,
            "vehicle-assigned" => Self::VehicleAssigned,
            "vehicle-status-changed" => Self::VehicleStatusChanged,
            "vehicle-milestone" => Self::VehicleMilestone,
            "vehicle-position-updated" => Self::VehiclePositionUpdated,
            "vehicle-released" => Self::VehicleReleased,
            "quality-recorded" => Self::QualityRecorded,
            "location-updated" => Self::LocationUpdated,
            "priority-changed" => Self::PriorityChanged,
            "closed" => Self::Closed,
            _ => {
                return Err(SamuError::Validation(format!(
                    "unknown audit event kind: {}",
                    value
                )))
            }
        };
        Ok(kind)
    }
}

/// 不可变的审计事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    /// 全局插入序号，时间戳相同时用于排序
    pub sequence: u64,
    pub occurrence_id: Uuid,
    pub kind: AuditEventKind,
    pub description: String,
    pub operator_id: Option<Uuid>,
    pub operator_name: Option<String>,
    pub assignment_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    /// 事件发生后事件的生命周期状态
    pub occurrence_state: OccurrenceState,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

/// 待写入的审计事件
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub occurrence_id: Uuid,
    pub kind: AuditEventKind,
    pub description: String,
    pub operator_id: Option<Uuid>,
    pub operator_name: Option<String>,
    pub assignment_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub occurrence_state: OccurrenceState,
    pub payload: Option<serde_json::Value>,
}

impl NewAuditEvent {
    pub fn new(
        occurrence_id: Uuid,
        kind: AuditEventKind,
        occurrence_state: OccurrenceState,
        description: impl Into<String>,
    ) -> Self {
        Self {
            occurrence_id,
            kind,
            description: description.into(),
            operator_id: None,
            operator_name: None,
            assignment_id: None,
            patient_id: None,
            occurrence_state,
            payload: None,
        }
    }

    pub fn by(mut self, operator_id: Uuid, operator_name: Option<String>) -> Self {
        self.operator_id = Some(operator_id);
        self.operator_name = operator_name;
        self
    }

    pub fn for_assignment(mut self, assignment_id: Uuid) -> Self {
        self.assignment_id = Some(assignment_id);
        self
    }

    pub fn for_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// 事件详情：事件本体 + 完整审计轨迹
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceDetail {
    pub occurrence: Occurrence,
    pub events: Vec<AuditEvent>,
}
