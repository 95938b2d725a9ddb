//! Session Aggregate — the lifecycle state machine shared by every game
//! mode: scheduling, roster management, start/complete transitions, and
//! the round log.
//!
//! Grounded on `services/sessions.rs`'s `VerifyError` style for the error
//! enum and on `core/src/game/game.rs`'s `GameData` field layout for the
//! aggregate's own fields.

use crate::types::{Mode, PlayerId, SessionId, UtcDateTime};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by [`Session`] mutations.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SessionError {
    #[error("session is at capacity ({max_players} players)")]
    Capacity { max_players: u32 },
    #[error("session has already started")]
    AlreadyStarted,
    #[error("session has already completed")]
    AlreadyCompleted,
    #[error("session has no participants")]
    EmptyRoster,
    #[error("session has not started")]
    NotStarted,
    #[error("round timestamp precedes session start")]
    TimestampBeforeStart,
    #[error("round log belongs to a different session")]
    WrongSession,
    #[error("session has already logged {max_rounds} rounds")]
    RoundCapReached { max_rounds: u32 },
}

/// Lifecycle phase of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Scheduled,
    InProgress,
    Completed,
}

/// One resolved round, appended to the session's round log as the engine
/// resolves each round. Carries its own session id as a value, not a
/// reference, so the aggregate can reject a log built for a different
/// session outright.
#[derive(Debug, Clone, Serialize)]
pub struct RoundLog {
    pub session_id: SessionId,
    pub round_number: u32,
    pub shared_card_index: u32,
    pub winner: PlayerId,
    pub winner_card_index: u32,
    pub winning_symbol: u32,
    pub resolved_at: UtcDateTime,
}

/// The Session Aggregate: a single game's roster and lifecycle,
/// independent of which game mode is driving it.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub mode: Mode,
    pub max_players: u32,
    pub max_rounds: u32,
    pub phase: SessionPhase,
    pub participants: Vec<PlayerId>,
    pub created_at: UtcDateTime,
    pub last_updated_at: UtcDateTime,
    pub started_at: Option<UtcDateTime>,
    pub completed_at: Option<UtcDateTime>,
    pub round_logs: Vec<RoundLog>,
}

impl Session {
    /// `Schedule`: creates a new session in the `Scheduled` phase with an
    /// empty roster.
    pub fn schedule(mode: Mode, max_players: u32, max_rounds: u32, now: UtcDateTime) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            max_players,
            max_rounds,
            phase: SessionPhase::Scheduled,
            participants: Vec::new(),
            created_at: now,
            last_updated_at: now,
            started_at: None,
            completed_at: None,
            round_logs: Vec::new(),
        }
    }

    /// `AddParticipant` (invariant S1/S2): a no-op if the player is already
    /// on the roster. Otherwise the roster must be below capacity and the
    /// session must still be `Scheduled`.
    pub fn add_participant(
        &mut self,
        player: PlayerId,
        now: UtcDateTime,
    ) -> Result<(), SessionError> {
        if self.participants.contains(&player) {
            return Ok(());
        }
        if self.phase != SessionPhase::Scheduled {
            return Err(SessionError::AlreadyStarted);
        }
        if self.participants.len() as u32 >= self.max_players {
            return Err(SessionError::Capacity {
                max_players: self.max_players,
            });
        }
        self.participants.push(player);
        self.last_updated_at = now;
        Ok(())
    }

    /// `RemoveParticipant`: best-effort, only permitted before the session
    /// has started. Removing a player who is not on the roster is not an
    /// error.
    pub fn remove_participant(
        &mut self,
        player: PlayerId,
        now: UtcDateTime,
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Scheduled {
            return Err(SessionError::AlreadyStarted);
        }
        self.participants.retain(|p| *p != player);
        self.last_updated_at = now;
        Ok(())
    }

    /// `Start` (invariant S3): roster must be non-empty and the session
    /// must still be `Scheduled`.
    pub fn start(&mut self, now: UtcDateTime) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::InProgress => return Err(SessionError::AlreadyStarted),
            SessionPhase::Completed => return Err(SessionError::AlreadyCompleted),
            SessionPhase::Scheduled => {}
        }
        if self.participants.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        self.phase = SessionPhase::InProgress;
        self.started_at = Some(now);
        self.last_updated_at = now;
        Ok(())
    }

    /// `RegisterRound` (invariant S5/S6): appends a resolved round to the
    /// log. Rejects a log built for a different session and enforces the
    /// configured round cap.
    pub fn register_round(&mut self, log: RoundLog) -> Result<(), SessionError> {
        if log.session_id != self.id {
            return Err(SessionError::WrongSession);
        }
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::NotStarted);
        }
        if self.round_logs.len() as u32 >= self.max_rounds {
            return Err(SessionError::RoundCapReached {
                max_rounds: self.max_rounds,
            });
        }
        self.last_updated_at = log.resolved_at;
        self.round_logs.push(log);
        Ok(())
    }

    /// `Complete` (invariant S4): terminal transition, only valid from
    /// `InProgress`, and only at a timestamp no earlier than the session's
    /// own start.
    pub fn complete(&mut self, now: UtcDateTime) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Scheduled => return Err(SessionError::NotStarted),
            SessionPhase::Completed => return Err(SessionError::AlreadyCompleted),
            SessionPhase::InProgress => {}
        }
        let started_at = self.started_at.ok_or(SessionError::NotStarted)?;
        if now < started_at {
            return Err(SessionError::TimestampBeforeStart);
        }
        self.phase = SessionPhase::Completed;
        self.completed_at = Some(now);
        self.last_updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> UtcDateTime {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn roster_respects_capacity_and_dedupes_join() {
        let mut session = Session::schedule(Mode::Tower, 2, 5, at(0));
        let p1 = PlayerId(uuid::Uuid::new_v4());
        let p2 = PlayerId(uuid::Uuid::new_v4());
        let p3 = PlayerId(uuid::Uuid::new_v4());

        session.add_participant(p1, at(1)).unwrap();
        session.add_participant(p2, at(2)).unwrap();

        assert_eq!(
            session.add_participant(p3, at(3)),
            Err(SessionError::Capacity { max_players: 2 })
        );
        // Re-adding an existing participant is a no-op, not an error.
        session.add_participant(p1, at(4)).unwrap();
        assert_eq!(session.participants, vec![p1, p2]);
    }

    #[test]
    fn removing_an_absent_player_is_not_an_error() {
        let mut session = Session::schedule(Mode::Tower, 4, 5, at(0));
        let p1 = PlayerId(uuid::Uuid::new_v4());
        let stranger = PlayerId(uuid::Uuid::new_v4());
        session.add_participant(p1, at(1)).unwrap();

        session.remove_participant(stranger, at(2)).unwrap();
        assert_eq!(session.participants, vec![p1]);
    }

    #[test]
    fn start_requires_non_empty_roster() {
        let mut session = Session::schedule(Mode::Tower, 4, 5, at(0));
        assert_eq!(session.start(at(1)), Err(SessionError::EmptyRoster));

        let p1 = PlayerId(uuid::Uuid::new_v4());
        session.add_participant(p1, at(1)).unwrap();
        session.start(at(2)).unwrap();
        assert_eq!(session.phase, SessionPhase::InProgress);
        assert_eq!(session.start(at(3)), Err(SessionError::AlreadyStarted));
    }

    #[test]
    fn cannot_modify_roster_after_start() {
        let mut session = Session::schedule(Mode::Tower, 4, 5, at(0));
        let p1 = PlayerId(uuid::Uuid::new_v4());
        let p2 = PlayerId(uuid::Uuid::new_v4());
        session.add_participant(p1, at(1)).unwrap();
        session.start(at(2)).unwrap();

        assert_eq!(
            session.add_participant(p2, at(3)),
            Err(SessionError::AlreadyStarted)
        );
        assert_eq!(
            session.remove_participant(p1, at(3)),
            Err(SessionError::AlreadyStarted)
        );
    }

    #[test]
    fn register_round_enforces_cap_and_session_identity() {
        let mut session = Session::schedule(Mode::Tower, 4, 1, at(0));
        let p1 = PlayerId(uuid::Uuid::new_v4());
        session.add_participant(p1, at(1)).unwrap();
        session.start(at(10)).unwrap();

        let foreign_log = RoundLog {
            session_id: SessionId::new(),
            round_number: 1,
            shared_card_index: 0,
            winner: p1,
            winner_card_index: 1,
            winning_symbol: 3,
            resolved_at: at(11),
        };
        assert_eq!(
            session.register_round(foreign_log),
            Err(SessionError::WrongSession)
        );

        let log = RoundLog {
            session_id: session.id,
            round_number: 1,
            shared_card_index: 0,
            winner: p1,
            winner_card_index: 1,
            winning_symbol: 3,
            resolved_at: at(11),
        };
        session.register_round(log.clone()).unwrap();

        assert_eq!(
            session.register_round(log),
            Err(SessionError::RoundCapReached { max_rounds: 1 })
        );
    }

    #[test]
    fn complete_is_terminal_and_rejects_timestamps_before_start() {
        let mut session = Session::schedule(Mode::Tower, 4, 5, at(0));
        let p1 = PlayerId(uuid::Uuid::new_v4());
        session.add_participant(p1, at(1)).unwrap();

        assert_eq!(session.complete(at(2)), Err(SessionError::NotStarted));

        session.start(at(20)).unwrap();
        assert_eq!(
            session.complete(at(5)),
            Err(SessionError::TimestampBeforeStart)
        );

        session.complete(at(20)).unwrap();
        assert_eq!(session.phase, SessionPhase::Completed);
        assert_eq!(
            session.complete(at(21)),
            Err(SessionError::AlreadyCompleted)
        );
    }
}
