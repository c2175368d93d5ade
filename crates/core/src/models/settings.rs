//! Gameplay settings attached 1:1 to a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const TIME_FOR_ANSWER_MIN: i64 = 10;
pub const TIME_FOR_ANSWER_MAX: i64 = 120;
pub const TIME_FOR_CHOICE_MIN: i64 = 10;
pub const TIME_FOR_CHOICE_MAX: i64 = 180;

/// Per-room gameplay configuration, created together with the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub room_id: Uuid,
    /// Seconds a player has to answer, 10..=120
    pub time_for_answer: i64,
    /// Seconds a player has to choose a question, 10..=180
    pub time_for_choice: i64,
    pub allow_wrong_answer: bool,
    pub show_right_answer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomSettings {
    pub fn new(room_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            room_id,
            time_for_answer: 30,
            time_for_choice: 60,
            allow_wrong_answer: true,
            show_right_answer: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update, touching only the supplied fields
    pub fn apply(&mut self, patch: &GameplayPatch) {
        if let Some(v) = patch.time_for_answer {
            self.time_for_answer = v;
        }
        if let Some(v) = patch.time_for_choice {
            self.time_for_choice = v;
        }
        if let Some(v) = patch.allow_wrong_answer {
            self.allow_wrong_answer = v;
        }
        if let Some(v) = patch.show_right_answer {
            self.show_right_answer = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial gameplay update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameplayPatch {
    pub time_for_answer: Option<i64>,
    pub time_for_choice: Option<i64>,
    pub allow_wrong_answer: Option<bool>,
    pub show_right_answer: Option<bool>,
}

impl GameplayPatch {
    pub fn is_empty(&self) -> bool {
        self.time_for_answer.is_none()
            && self.time_for_choice.is_none()
            && self.allow_wrong_answer.is_none()
            && self.show_right_answer.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(v) = self.time_for_answer {
            if !(TIME_FOR_ANSWER_MIN..=TIME_FOR_ANSWER_MAX).contains(&v) {
                return Err(Error::Validation(format!(
                    "time_for_answer must be between {TIME_FOR_ANSWER_MIN} and {TIME_FOR_ANSWER_MAX}, got {v}"
                )));
            }
        }
        if let Some(v) = self.time_for_choice {
            if !(TIME_FOR_CHOICE_MIN..=TIME_FOR_CHOICE_MAX).contains(&v) {
                return Err(Error::Validation(format!(
                    "time_for_choice must be between {TIME_FOR_CHOICE_MIN} and {TIME_FOR_CHOICE_MAX}, got {v}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RoomSettings::new(Uuid::new_v4());
        assert_eq!(settings.time_for_answer, 30);
        assert_eq!(settings.time_for_choice, 60);
        assert!(settings.allow_wrong_answer);
        assert!(settings.show_right_answer);
    }

    #[test]
    fn test_apply_partial_patch() {
        let mut settings = RoomSettings::new(Uuid::new_v4());
        settings.apply(&GameplayPatch {
            time_for_answer: Some(45),
            show_right_answer: Some(false),
            ..GameplayPatch::default()
        });
        assert_eq!(settings.time_for_answer, 45);
        assert_eq!(settings.time_for_choice, 60);
        assert!(settings.allow_wrong_answer);
        assert!(!settings.show_right_answer);
    }

    #[test]
    fn test_patch_validation() {
        let ok = GameplayPatch {
            time_for_answer: Some(120),
            time_for_choice: Some(10),
            ..GameplayPatch::default()
        };
        ok.validate().unwrap();

        let too_fast = GameplayPatch {
            time_for_answer: Some(5),
            ..GameplayPatch::default()
        };
        assert!(too_fast.validate().is_err());

        let too_slow = GameplayPatch {
            time_for_choice: Some(181),
            ..GameplayPatch::default()
        };
        assert!(too_slow.validate().is_err());
    }

    #[test]
    fn test_empty_patch() {
        assert!(GameplayPatch::default().is_empty());
        assert!(!GameplayPatch {
            allow_wrong_answer: Some(false),
            ..GameplayPatch::default()
        }
        .is_empty());
    }
}
