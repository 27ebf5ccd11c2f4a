//! 事件与车辆状态机
//!
//! 事件生命周期按事件驱动（转换表），车辆状态按目标状态驱动（合法边集合）。

use samu_core::{OccurrenceState, Result, SamuError, VehicleStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 事件状态转换触发
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OccurrenceEvent {
    Escalate,
    StartRegulation,
    AbortRegulation,
    FinishRegulation,
    Close,
}

/// 事件生命周期状态机
#[derive(Debug)]
pub struct OccurrenceStateMachine {
    transitions: HashMap<(OccurrenceState, OccurrenceEvent), OccurrenceState>,
}

impl OccurrenceStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert(
            (OccurrenceState::Open, OccurrenceEvent::Escalate),
            OccurrenceState::AwaitingRegulation,
        );
        transitions.insert(
            (OccurrenceState::AwaitingRegulation, OccurrenceEvent::StartRegulation),
            OccurrenceState::InRegulation,
        );
        // 唯一的回退边
        transitions.insert(
            (OccurrenceState::InRegulation, OccurrenceEvent::AbortRegulation),
            OccurrenceState::AwaitingRegulation,
        );
        transitions.insert(
            (OccurrenceState::InRegulation, OccurrenceEvent::FinishRegulation),
            OccurrenceState::Regulated,
        );

        for state in OccurrenceState::all() {
            if !state.is_terminal() {
                transitions.insert((state, OccurrenceEvent::Close), OccurrenceState::Closed);
            }
        }

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &OccurrenceState, event: &OccurrenceEvent) -> bool {
        self.transitions.contains_key(&(*from, *event))
    }

    /// 执行状态转换
    pub fn transition(
        &self,
        from: &OccurrenceState,
        event: &OccurrenceEvent,
    ) -> Result<OccurrenceState> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(SamuError::illegal_transition("occurrence", from, event)),
        }
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: &OccurrenceState) -> Vec<OccurrenceEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for OccurrenceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 车辆全局状态机
#[derive(Debug)]
pub struct VehicleStatusMachine {
    edges: HashSet<(VehicleStatus, VehicleStatus)>,
}

impl VehicleStatusMachine {
    pub fn new() -> Self {
        use VehicleStatus::*;

        let mut edges = HashSet::new();

        // 出车流程
        edges.insert((Available, EnRoute));
        edges.insert((EnRoute, AtScene));
        edges.insert((AtScene, Transporting));
        edges.insert((Transporting, Available));

        // 行政状态；故障车辆只能进入维护
        for from in VehicleStatus::all() {
            if from == Broken {
                continue;
            }
            for to in [Maintenance, Unavailable, Broken] {
                if from != to {
                    edges.insert((from, to));
                }
            }
        }
        edges.insert((Broken, Maintenance));

        // 恢复服务
        edges.insert((Maintenance, Available));
        edges.insert((Unavailable, Available));

        Self { edges }
    }

    pub fn can_transition(&self, from: VehicleStatus, to: VehicleStatus) -> bool {
        self.edges.contains(&(from, to))
    }

    pub fn transition(&self, from: VehicleStatus, to: VehicleStatus) -> Result<VehicleStatus> {
        if self.can_transition(from, to) {
            Ok(to)
        } else {
            Err(SamuError::illegal_transition("vehicle", from, to))
        }
    }

    /// 从当前状态可达的所有状态
    pub fn get_possible_targets(&self, from: VehicleStatus) -> Vec<VehicleStatus> {
        let mut targets: Vec<VehicleStatus> = self
            .edges
            .iter()
            .filter(|(state, _)| *state == from)
            .map(|(_, to)| *to)
            .collect();
        targets.sort();
        targets
    }
}

impl Default for VehicleStatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrence_happy_path() {
        let sm = OccurrenceStateMachine::new();

        let state = sm
            .transition(&OccurrenceState::Open, &OccurrenceEvent::Escalate)
            .unwrap();
        assert_eq!(state, OccurrenceState::AwaitingRegulation);
        let state = sm.transition(&state, &OccurrenceEvent::StartRegulation).unwrap();
        assert_eq!(state, OccurrenceState::InRegulation);
        let state = sm.transition(&state, &OccurrenceEvent::FinishRegulation).unwrap();
        assert_eq!(state, OccurrenceState::Regulated);
        let state = sm.transition(&state, &OccurrenceEvent::Close).unwrap();
        assert_eq!(state, OccurrenceState::Closed);
    }

    #[test]
    fn test_occurrence_invalid_transitions() {
        let sm = OccurrenceStateMachine::new();

        assert!(!sm.can_transition(&OccurrenceState::Open, &OccurrenceEvent::StartRegulation));
        assert!(!sm.can_transition(&OccurrenceState::Regulated, &OccurrenceEvent::Escalate));
        assert!(!sm.can_transition(
            &OccurrenceState::AwaitingRegulation,
            &OccurrenceEvent::AbortRegulation
        ));
        assert!(sm.get_possible_events(&OccurrenceState::Closed).is_empty());

        match sm.transition(&OccurrenceState::Closed, &OccurrenceEvent::Close) {
            Err(SamuError::IllegalStateTransition { from, .. }) => assert_eq!(from, "Closed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_close_from_any_open_state() {
        let sm = OccurrenceStateMachine::new();
        for state in OccurrenceState::all() {
            assert_eq!(
                sm.can_transition(&state, &OccurrenceEvent::Close),
                !state.is_terminal()
            );
        }
    }

    #[test]
    fn test_vehicle_dispatch_sequence() {
        let sm = VehicleStatusMachine::new();

        assert!(sm.can_transition(VehicleStatus::Available, VehicleStatus::EnRoute));
        assert!(sm.can_transition(VehicleStatus::EnRoute, VehicleStatus::AtScene));
        assert!(sm.can_transition(VehicleStatus::AtScene, VehicleStatus::Transporting));
        assert!(sm.can_transition(VehicleStatus::Transporting, VehicleStatus::Available));

        // 必须经过中间状态
        assert!(!sm.can_transition(VehicleStatus::Available, VehicleStatus::Transporting));
        assert!(!sm.can_transition(VehicleStatus::Available, VehicleStatus::AtScene));
        assert!(!sm.can_transition(VehicleStatus::EnRoute, VehicleStatus::Available));
    }

    #[test]
    fn test_broken_vehicle_only_goes_to_maintenance() {
        let sm = VehicleStatusMachine::new();

        assert_eq!(
            sm.get_possible_targets(VehicleStatus::Broken),
            vec![VehicleStatus::Maintenance]
        );
        assert!(sm
            .transition(VehicleStatus::Broken, VehicleStatus::Available)
            .is_err());
        assert!(sm.can_transition(VehicleStatus::Transporting, VehicleStatus::Broken));
        assert!(sm.can_transition(VehicleStatus::Maintenance, VehicleStatus::Available));
    }
}
