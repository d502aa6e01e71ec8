//! Schedule aggregate: room/showtime conflict checking.
//!
//! Owns the showtime calendar. A showtime may be created or moved only if
//! its half-open interval does not overlap any other showtime in the same
//! room, and a showtime with sold tickets is frozen entirely.

use cinebook_core::reducer::{Effects, Reducer};
use cinebook_core::{Effect, smallvec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{MovieId, RoomId, ScheduleState, Showtime, ShowtimeId};

/// Actions for the Schedule aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ScheduleAction {
    // Commands
    /// Add a showtime to the calendar
    CreateShowtime {
        /// Pre-allocated showtime id
        showtime_id: ShowtimeId,
        /// Movie to screen
        movie_id: MovieId,
        /// Target room
        room_id: RoomId,
        /// Start (inclusive)
        start: DateTime<Utc>,
        /// End (exclusive)
        end: DateTime<Utc>,
    },
    /// Move an existing showtime to a new interval
    RescheduleShowtime {
        /// Showtime to move
        showtime_id: ShowtimeId,
        /// New start (inclusive)
        start: DateTime<Utc>,
        /// New end (exclusive)
        end: DateTime<Utc>,
    },
    /// Record that tickets now exist for a showtime, freezing it
    MarkTicketed {
        /// The sold showtime
        showtime_id: ShowtimeId,
    },

    // Events
    /// A showtime was added
    ShowtimeCreated {
        /// The new showtime
        showtime: Showtime,
    },
    /// A showtime moved to a new interval
    ShowtimeRescheduled {
        /// The moved showtime
        showtime_id: ShowtimeId,
        /// New start
        start: DateTime<Utc>,
        /// New end
        end: DateTime<Utc>,
    },
    /// A showtime is now frozen by sold tickets
    ShowtimeLockedIn {
        /// The frozen showtime
        showtime_id: ShowtimeId,
    },
    /// A command failed validation
    ValidationFailed {
        /// What went wrong
        reason: String,
    },
}

/// Environment for the Schedule aggregate.
///
/// Conflict checking is a pure function of the calendar, so the aggregate
/// has no collaborators.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScheduleEnvironment;

impl ScheduleEnvironment {
    /// Creates the environment
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Reducer for the Schedule aggregate
#[derive(Clone, Copy, Debug, Default)]
pub struct ScheduleReducer;

impl ScheduleReducer {
    /// Creates a new `ScheduleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validation_failed(state: &mut ScheduleState, reason: String) -> Effects<ScheduleAction> {
        warn!(reason = %reason, "schedule command rejected");
        state.last_error = Some(reason.clone());
        apply_event(state, &ScheduleAction::ValidationFailed { reason });
        smallvec![Effect::None]
    }

    /// Showtimes in `room_id` whose interval overlaps `[start, end)`,
    /// excluding `exclude` (the showtime being moved)
    fn conflicts(
        state: &ScheduleState,
        room_id: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<ShowtimeId>,
    ) -> Vec<ShowtimeId> {
        state
            .showtimes
            .values()
            .filter(|s| s.room_id == room_id && Some(s.id) != exclude && s.overlaps(start, end))
            .map(|s| s.id)
            .collect()
    }
}

impl Reducer for ScheduleReducer {
    type State = ScheduleState;
    type Action = ScheduleAction;
    type Environment = ScheduleEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            ScheduleAction::CreateShowtime {
                showtime_id,
                movie_id,
                room_id,
                start,
                end,
            } => {
                if end <= start {
                    return Self::validation_failed(
                        state,
                        format!("showtime interval is empty or inverted: {start} >= {end}"),
                    );
                }
                if state.showtimes.contains_key(&showtime_id) {
                    return Self::validation_failed(
                        state,
                        format!("showtime {showtime_id} already exists"),
                    );
                }
                let conflicts = Self::conflicts(state, room_id, start, end, None);
                if !conflicts.is_empty() {
                    return Self::validation_failed(
                        state,
                        format!("room {room_id} already booked: conflicts with {conflicts:?}"),
                    );
                }

                state.last_error = None;
                let showtime = Showtime {
                    id: showtime_id,
                    movie_id,
                    room_id,
                    start,
                    end,
                };
                info!(showtime_id = %showtime_id, room_id = %room_id, "showtime created");
                let event = ScheduleAction::ShowtimeCreated { showtime };
                apply_event(state, &event);
                smallvec![Effect::None]
            },

            ScheduleAction::RescheduleShowtime {
                showtime_id,
                start,
                end,
            } => {
                let Some(existing) = state.showtimes.get(&showtime_id) else {
                    return Self::validation_failed(
                        state,
                        format!("showtime {showtime_id} not found"),
                    );
                };
                if state.is_locked(&showtime_id) {
                    return Self::validation_failed(
                        state,
                        format!("showtime {showtime_id} has sold tickets and cannot move"),
                    );
                }
                if end <= start {
                    return Self::validation_failed(
                        state,
                        format!("showtime interval is empty or inverted: {start} >= {end}"),
                    );
                }
                let room_id = existing.room_id;
                let conflicts = Self::conflicts(state, room_id, start, end, Some(showtime_id));
                if !conflicts.is_empty() {
                    return Self::validation_failed(
                        state,
                        format!("room {room_id} already booked: conflicts with {conflicts:?}"),
                    );
                }

                state.last_error = None;
                info!(showtime_id = %showtime_id, "showtime rescheduled");
                let event = ScheduleAction::ShowtimeRescheduled {
                    showtime_id,
                    start,
                    end,
                };
                apply_event(state, &event);
                smallvec![Effect::None]
            },

            ScheduleAction::MarkTicketed { showtime_id } => {
                if !state.showtimes.contains_key(&showtime_id) {
                    return Self::validation_failed(
                        state,
                        format!("showtime {showtime_id} not found"),
                    );
                }
                // Marking twice is a no-op, not an error.
                state.last_error = None;
                let event = ScheduleAction::ShowtimeLockedIn { showtime_id };
                apply_event(state, &event);
                smallvec![Effect::None]
            },

            // Events replayed through the store fold the same way
            event @ (ScheduleAction::ShowtimeCreated { .. }
            | ScheduleAction::ShowtimeRescheduled { .. }
            | ScheduleAction::ShowtimeLockedIn { .. }
            | ScheduleAction::ValidationFailed { .. }) => {
                apply_event(state, &event);
                smallvec![Effect::None]
            },
        }
    }
}

/// Folds an event into state. Deterministic, no validation.
fn apply_event(state: &mut ScheduleState, event: &ScheduleAction) {
    match event {
        ScheduleAction::ShowtimeCreated { showtime } => {
            state.showtimes.insert(showtime.id, showtime.clone());
        },
        ScheduleAction::ShowtimeRescheduled {
            showtime_id,
            start,
            end,
        } => {
            if let Some(showtime) = state.showtimes.get_mut(showtime_id) {
                showtime.start = *start;
                showtime.end = *end;
            }
        },
        ScheduleAction::ShowtimeLockedIn { showtime_id } => {
            state.ticketed.insert(*showtime_id);
        },
        ScheduleAction::ValidationFailed { reason } => {
            state.last_error = Some(reason.clone());
        },
        // Commands never reach the fold
        _ => {},
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cinebook_testing::{ReducerTest, assertions};
    use chrono::TimeZone;

    fn env() -> ScheduleEnvironment {
        ScheduleEnvironment::new()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    fn create(id: ShowtimeId, room_id: RoomId, start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduleAction {
        ScheduleAction::CreateShowtime {
            showtime_id: id,
            movie_id: MovieId::new(),
            room_id,
            start,
            end,
        }
    }

    #[test]
    fn overlapping_showtime_in_same_room_is_rejected() {
        let room = RoomId::new();
        let first = ShowtimeId::new();
        let second = ShowtimeId::new();

        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_actions([
                create(first, room, at(10, 0), at(12, 0)),
                create(second, room, at(11, 0), at(13, 0)),
            ])
            .then_state(move |state| {
                assert_eq!(state.count(), 1);
                assert!(state.get(&second).is_none());
                assert!(state.last_error.is_some());
            })
            .run();
    }

    #[test]
    fn back_to_back_showtimes_are_allowed() {
        let room = RoomId::new();
        let first = ShowtimeId::new();
        let second = ShowtimeId::new();

        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_actions([
                create(first, room, at(10, 0), at(12, 0)),
                create(second, room, at(12, 0), at(14, 0)),
            ])
            .then_state(|state| {
                assert_eq!(state.count(), 2);
                assert!(state.last_error.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn same_interval_different_rooms_do_not_conflict() {
        let first = ShowtimeId::new();
        let second = ShowtimeId::new();

        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_actions([
                create(first, RoomId::new(), at(10, 0), at(12, 0)),
                create(second, RoomId::new(), at(10, 0), at(12, 0)),
            ])
            .then_state(|state| {
                assert_eq!(state.count(), 2);
            })
            .run();
    }

    #[test]
    fn ticketed_showtime_cannot_be_rescheduled() {
        let room = RoomId::new();
        let showtime = ShowtimeId::new();

        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_actions([
                create(showtime, room, at(10, 0), at(12, 0)),
                ScheduleAction::MarkTicketed { showtime_id: showtime },
                ScheduleAction::RescheduleShowtime {
                    showtime_id: showtime,
                    start: at(15, 0),
                    end: at(17, 0),
                },
            ])
            .then_state(move |state| {
                let st = state.get(&showtime).unwrap();
                assert_eq!(st.start, at(10, 0));
                assert!(state.last_error.as_deref().unwrap().contains("sold tickets"));
            })
            .run();
    }

    #[test]
    fn reschedule_ignores_the_moving_showtime_itself() {
        let room = RoomId::new();
        let showtime = ShowtimeId::new();

        // Shifting within its own old interval must not self-conflict.
        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_actions([
                create(showtime, room, at(10, 0), at(12, 0)),
                ScheduleAction::RescheduleShowtime {
                    showtime_id: showtime,
                    start: at(11, 0),
                    end: at(13, 0),
                },
            ])
            .then_state(move |state| {
                let st = state.get(&showtime).unwrap();
                assert_eq!(st.start, at(11, 0));
                assert_eq!(st.end, at(13, 0));
                assert!(state.last_error.is_none());
            })
            .run();
    }

    #[test]
    fn empty_interval_is_rejected() {
        ReducerTest::new(ScheduleReducer::new())
            .with_env(env())
            .given_state(ScheduleState::new())
            .when_action(create(ShowtimeId::new(), RoomId::new(), at(12, 0), at(12, 0)))
            .then_state(|state| {
                assert_eq!(state.count(), 0);
                assert!(state.last_error.is_some());
            })
            .run();
    }
}
