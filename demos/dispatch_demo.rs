//! 调度中心演示程序
//!
//! 展示一个急救事件从受理、医疗调节、派车到结案的完整过程

use chrono::{Duration, Utc};
use samu::core::collaborators::{Collaborators, InMemoryDirectory};
use samu::core::{
    Coordinates, CrewMember, NewOccurrence, NewPatient, NewVehicle, PatientAge,
    Priority, RiskClassification, Sex, VehicleStatus, VehicleType, VitalSigns,
};
use samu::dispatch::{
    Audience, DispatchCenter, DispatchSettings, Milestone, PatientRegulation, TimeWindow,
};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚑 SAMU 调度中心演示");

    // 1. 准备目录数据
    let directory = Arc::new(InMemoryDirectory::new());
    let operator = Uuid::new_v4();
    let regulator = Uuid::new_v4();
    let regulation_center = Uuid::new_v4();
    let hospital = Uuid::new_v4();
    directory.add_operator(operator, "调度员 Ana").await;
    directory.add_operator(regulator, "调节医生 Bruno").await;
    directory.add_center(regulation_center, "中央调节中心").await;
    directory.add_facility(hospital, "Hospital das Clínicas").await;

    let center = DispatchCenter::new(
        Collaborators::in_memory(directory),
        DispatchSettings::default(),
    );
    let mut notifications = center.subscribe(&[Audience::Dispatch, Audience::Fleet]);

    // 2. 登记车辆
    let mut vehicles = Vec::new();
    for (plate, vehicle_type, location) in [
        ("USA-0101", VehicleType::Basic, Coordinates::new(-23.55, -46.63)),
        ("USA-0202", VehicleType::Advanced, Coordinates::new(-23.56, -46.65)),
        ("UTI-0303", VehicleType::Icu, Coordinates::new(-23.57, -46.66)),
        ("UTI-0404", VehicleType::Icu, Coordinates::new(-23.62, -46.71)),
    ] {
        let crew = vehicle_type
            .minimum_crew()
            .iter()
            .map(|role| CrewMember {
                operator_id: Uuid::new_v4(),
                name: format!("{:?}", role),
                role: *role,
                active: true,
            })
            .collect();
        let vehicle = center
            .register_vehicle(NewVehicle {
                plate: plate.to_string(),
                vehicle_type,
                base_id: Uuid::new_v4(),
                base_location: Some(location),
                crew,
                equipment: vec![],
                odometer_km: 40_000,
                fuel_percent: 85.0,
                notes: None,
            })
            .await?;
        println!(
            "✅ 已登记车辆 {} ({:?}), 就绪评分 {:.2}",
            vehicle.plate,
            vehicle.vehicle_type,
            center.readiness_score(vehicle.id).await?
        );
        vehicles.push(vehicle);
    }

    // 3. 受理来电
    let occurrence = center
        .create_occurrence(
            NewOccurrence {
                call_type: "MEDICAL".to_string(),
                priority: Some(Priority::Emergency),
                caller_phone: "(11) 3333-4444".to_string(),
                caller_name: Some("Carlos".to_string()),
                location_text: "Av. Paulista, 1578".to_string(),
                coordinates: Some(Coordinates::new(-23.5614, -46.6559)),
                description: "男性路边晕倒，胸痛".to_string(),
                notes: None,
                regulation_center_id: Some(regulation_center),
                patients: vec![NewPatient {
                    name: None,
                    age: Some(PatientAge::Years(58)),
                    sex: Sex::Male,
                    chief_complaint: "胸痛".to_string(),
                }],
            },
            operator,
        )
        .await?;
    println!(
        "\n📞 新事件 {} ({:?}) 状态 {}",
        occurrence.code,
        occurrence.priority,
        occurrence.state.as_str()
    );

    // 4. 提交医疗调节
    center.escalate_to_regulation(occurrence.id, operator).await?;
    let queue = center.regulation_queue(Some(regulation_center)).await;
    println!("📋 调节队列中有 {} 个事件", queue.len());

    center.start_regulation(occurrence.id, regulator).await?;
    let patient_id = occurrence.patients[0].id;
    center
        .regulate_patient(
            patient_id,
            PatientRegulation {
                hypothesis: Some("急性心肌梗死".to_string()),
                risk: Some(RiskClassification::Critical),
                destination_facility_id: Some(hospital),
                clinical_picture: Some("胸骨后压榨性疼痛30分钟".to_string()),
                history: Some("高血压".to_string()),
                vitals: Some(VitalSigns {
                    blood_pressure: Some("90/60".to_string()),
                    heart_rate: Some(118),
                    oxygen_saturation: Some(91),
                    ..Default::default()
                }),
            },
            regulator,
        )
        .await?;
    let regulated = center.finish_regulation(occurrence.id, None, regulator).await?;
    println!("🩺 调节完成, 事件状态 {}", regulated.state.as_str());

    // 5. 推荐并派遣车辆
    let Some(candidate) = center.suggest_vehicle(occurrence.id, None).await? else {
        println!("⚠️  没有可用车辆");
        return Ok(());
    };
    println!(
        "\n🎯 推荐车辆 {} (评分 {:.2}, 距离 {:.1} km)",
        candidate.plate,
        candidate.score,
        candidate.distance_km.unwrap_or_default()
    );

    let assignment = center
        .assign_vehicle(occurrence.id, candidate.vehicle_id, operator)
        .await?;
    let dispatched_at = assignment.timeline.dispatched_at.unwrap_or_else(Utc::now);

    // 6. 车辆执行任务
    center
        .record_milestone(
            assignment.id,
            Milestone::DepartedBase,
            dispatched_at + Duration::minutes(1),
            operator,
        )
        .await?;
    for (status, minutes) in [
        (VehicleStatus::AtScene, 9),
        (VehicleStatus::Transporting, 27),
    ] {
        let updated = center
            .report_status(
                assignment.id,
                status,
                dispatched_at + Duration::minutes(minutes),
                operator,
            )
            .await?;
        println!("🔄 车辆 {} -> {}", updated.plate, status.as_str());
    }
    center
        .record_milestone(
            assignment.id,
            Milestone::ArrivedAtFacility,
            dispatched_at + Duration::minutes(41),
            operator,
        )
        .await?;

    let released = center
        .release_vehicle(assignment.id, Some(40_018), operator)
        .await?;
    center
        .record_quality(assignment.id, 5, None, operator)
        .await?;
    println!("✅ 车辆 {} 已释放", released.plate);

    // 7. 结案
    let closed = center.close_occurrence(occurrence.id, operator).await?;
    println!("📁 事件 {} 已结案", closed.code);

    // 8. 审计轨迹
    let detail = center.occurrence_detail(occurrence.id).await?;
    println!("\n📜 审计轨迹 ({} 条):", detail.events.len());
    for event in &detail.events {
        println!(
            "   #{} {} [{}] {}",
            event.sequence,
            event.timestamp.format("%H:%M:%S"),
            event.occurrence_state.as_str(),
            event.description
        );
    }

    // 9. 看板
    let snapshot = center.dashboard(TimeWindow::last_hours(24)).await;
    println!("\n📊 看板 ({} 辆车):", vehicles.len());
    for (state, count) in &snapshot.occurrences_by_state {
        println!("   事件 {}: {}", state.as_str(), count);
    }
    for (status, count) in &snapshot.vehicles_by_status {
        println!("   车辆 {}: {}", status.as_str(), count);
    }
    println!("   可用率: {:.1}%", snapshot.availability_percent);
    if let Some(minutes) = snapshot.average_regulation_minutes {
        println!("   平均调节时长: {:.1} 分钟", minutes);
    }

    let mut received = 0;
    while notifications.try_recv().is_some() {
        received += 1;
    }
    println!("\n📨 调度屏与车队共收到 {} 条通知", received);

    println!("\n🎉 调度中心演示完成!");
    Ok(())
}
