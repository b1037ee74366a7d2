use crate::models::{Assignment, EvaluationContext};

/// Assignments a supervisor holds at the same time as `proposed`, the
/// proposed one first, one entry per room.
pub fn rooms_held_with<'a>(ctx: &'a EvaluationContext, proposed: &'a Assignment) -> Vec<&'a Assignment> {
    let mut held = vec![proposed];
    for assignment in ctx.assignments_of(&proposed.supervisor_id) {
        if assignment.concurrent_with(proposed)
            && !held.iter().any(|h| h.room_id == assignment.room_id)
        {
            held.push(assignment);
        }
    }
    held
}

/// Rooms held at the busiest instant of the proposed window, the proposed
/// one first.
///
/// A full-day proposal next to a morning room and an afternoon room holds
/// two rooms at a time, not three.
pub fn peak_rooms_held_with<'a>(
    ctx: &'a EvaluationContext,
    proposed: &'a Assignment,
) -> Vec<&'a Assignment> {
    let held = rooms_held_with(ctx, proposed);
    let (start, end) = proposed.window();

    let mut peak = vec![proposed];
    for instant in held.iter().map(|a| a.window().0.max(start)) {
        if instant >= end {
            continue;
        }
        let at_instant: Vec<&Assignment> = held
            .iter()
            .copied()
            .filter(|a| {
                let (s, e) = a.window();
                s <= instant && instant < e
            })
            .collect();
        if at_instant.len() > peak.len() {
            peak = at_instant;
        }
    }
    peak
}

/// Room ids of `assignments`, for `affected_items`
pub(super) fn room_ids(assignments: &[&Assignment]) -> Vec<String> {
    assignments.iter().map(|a| a.room_id.clone()).collect()
}
