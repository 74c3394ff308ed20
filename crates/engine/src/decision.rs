//! Pure decision function driving which path an inbound signal takes.
//!
//! No I/O, no mutable state — `decide` is a straight match over flags the
//! caller has already computed. Kept standalone so it can be exercised with
//! a table of cases rather than end-to-end scenarios.

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionFlags {
    pub is_online: bool,
    pub has_live_job: bool,
    pub is_gap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NoOp,
    TriggerLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: &'static str,
}

pub fn decide(event_type: &str, flags: DecisionFlags) -> Decision {
    match event_type {
        "ws_incoming" => {
            if !flags.is_online {
                Decision { action: Action::NoOp, reason: "OFFLINE" }
            } else if !flags.has_live_job {
                Decision { action: Action::NoOp, reason: "JOB_MISSING_OR_INVALID" }
            } else if flags.is_gap {
                Decision { action: Action::NoOp, reason: "GAP_DETECTED" }
            } else {
                Decision { action: Action::TriggerLive, reason: "WS_INCOMING" }
            }
        }
        "replay_vault_missing" => Decision { action: Action::NoOp, reason: "REPLAY_ONLY" },
        _ => Decision { action: Action::NoOp, reason: "UNSUPPORTED_EVENT" },
    }
}

/// Strict gap rule: a jump of more than one past the last committed counter.
pub fn is_gap(incoming_counter: u64, local_max_processed: i64) -> bool {
    incoming_counter as i64 > local_max_processed + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_short_circuits() {
        let d = decide("ws_incoming", DecisionFlags { is_online: false, has_live_job: true, is_gap: false });
        assert_eq!(d, Decision { action: Action::NoOp, reason: "OFFLINE" });
    }

    #[test]
    fn missing_job_before_gap_check() {
        let d = decide("ws_incoming", DecisionFlags { is_online: true, has_live_job: false, is_gap: true });
        assert_eq!(d, Decision { action: Action::NoOp, reason: "JOB_MISSING_OR_INVALID" });
    }

    #[test]
    fn gap_blocks_live_trigger() {
        let d = decide("ws_incoming", DecisionFlags { is_online: true, has_live_job: true, is_gap: true });
        assert_eq!(d, Decision { action: Action::NoOp, reason: "GAP_DETECTED" });
    }

    #[test]
    fn clean_ws_incoming_triggers_live() {
        let d = decide("ws_incoming", DecisionFlags { is_online: true, has_live_job: true, is_gap: false });
        assert_eq!(d, Decision { action: Action::TriggerLive, reason: "WS_INCOMING" });
    }

    #[test]
    fn replay_vault_missing_is_replay_only() {
        let d = decide("replay_vault_missing", DecisionFlags::default());
        assert_eq!(d, Decision { action: Action::NoOp, reason: "REPLAY_ONLY" });
    }

    #[test]
    fn unknown_event_is_unsupported() {
        let d = decide("something_else", DecisionFlags::default());
        assert_eq!(d, Decision { action: Action::NoOp, reason: "UNSUPPORTED_EVENT" });
    }

    #[test]
    fn gap_detection_is_strictly_greater_than_one() {
        assert!(!is_gap(4, 3));
        assert!(is_gap(5, 3));
        assert!(!is_gap(0, -1));
        assert!(is_gap(2, -1));
    }
}
