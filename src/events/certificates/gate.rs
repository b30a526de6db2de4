use serde::Serialize;

/// Which workflow is asking: the post-event sweep, a successful QR scan,
/// or a completed feedback submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    PostEventSweep,
    QrScan,
    FeedbackSubmitted,
}

/// The certificate-relevant slice of an event's configuration.
#[derive(Debug, Clone, Copy)]
pub struct GateFlags {
    pub auto_generate_certificate: bool,
    pub feedback_required_for_certificate: bool,
}

/// Eligibility state for one (event, user) pair at evaluation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eligibility {
    pub attended: bool,
    pub checked_in: bool,
    pub feedback_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AutoGenerateDisabled,
    TriggerNotApplicable,
    NotAnAttendee,
    AwaitingCheckIn,
    AwaitingFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Issue,
    Skip(SkipReason),
}

/// Decide whether the triggering workflow may issue a certificate now.
///
/// The sweep and the scan trigger deliberately overlap on events that do not
/// gate on feedback: the scan path issues early, the sweep backstops anyone
/// it missed, and the issuer's per-(event, user) idempotency makes running
/// both harmless. Feedback-gated events issue only once the booking is both
/// checked in and has feedback recorded; a skip here is not a failure, it
/// just waits for the flag-setting event to re-trigger the gate.
pub fn evaluate(
    flags: GateFlags,
    trigger: Trigger,
    eligibility: Eligibility,
) -> GateDecision {
    if !flags.auto_generate_certificate {
        return GateDecision::Skip(SkipReason::AutoGenerateDisabled);
    }

    if flags.feedback_required_for_certificate {
        if matches!(trigger, Trigger::PostEventSweep) {
            return GateDecision::Skip(SkipReason::TriggerNotApplicable);
        }
        if !eligibility.checked_in {
            return GateDecision::Skip(SkipReason::AwaitingCheckIn);
        }
        if !eligibility.feedback_completed {
            return GateDecision::Skip(SkipReason::AwaitingFeedback);
        }
        return GateDecision::Issue;
    }

    match trigger {
        Trigger::PostEventSweep | Trigger::QrScan => {
            if eligibility.attended {
                GateDecision::Issue
            } else {
                GateDecision::Skip(SkipReason::NotAnAttendee)
            }
        }
        Trigger::FeedbackSubmitted => {
            GateDecision::Skip(SkipReason::TriggerNotApplicable)
        }
    }
}
