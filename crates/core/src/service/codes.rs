//! Join code generation

use rand::Rng;
use tracing::debug;

use crate::config::LobbyConfig;
use crate::error::{Error, Result};
use crate::storage::DbHandle;

/// Draws short join codes and checks them against open rooms. The code space
/// is small, so collisions are expected and redrawn; running out of attempts
/// means the deployment needs a longer code length.
#[derive(Clone)]
pub struct RoomCodeGenerator {
    length: usize,
    alphabet: Vec<char>,
    max_attempts: u32,
}

impl RoomCodeGenerator {
    /// Build from validated configuration
    pub fn new(config: &LobbyConfig) -> Self {
        Self {
            length: config.code_length,
            alphabet: config.code_alphabet.chars().collect(),
            max_attempts: config.code_max_attempts,
        }
    }

    /// Draw one candidate code
    pub fn draw(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }

    /// Draw until the code is free among open rooms
    pub async fn generate_unique(&self, db: &DbHandle) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let code = self.draw();
            let candidate = code.clone();
            let in_use = db
                .read(move |db| db.rooms().code_in_open_use(&candidate))
                .await?;
            if !in_use {
                if attempt > 1 {
                    debug!(attempt, "room code drawn after collisions");
                }
                return Ok(code);
            }
        }
        Err(Error::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Room;
    use crate::storage::{Database, RoomStore};
    use uuid::Uuid;

    fn generator(config: &LobbyConfig) -> RoomCodeGenerator {
        RoomCodeGenerator::new(config)
    }

    #[test]
    fn test_draw_respects_length_and_alphabet() {
        let config = LobbyConfig::default();
        let gen = generator(&config);

        for _ in 0..50 {
            let code = gen.draw();
            assert_eq!(code.chars().count(), config.code_length);
            assert!(code.chars().all(|c| config.code_alphabet.contains(c)));
        }
    }

    #[tokio::test]
    async fn test_generate_unique_redraws_on_collision() {
        // Two-symbol alphabet, one-char codes: only "A" and "B" exist
        let config = LobbyConfig {
            code_length: 1,
            code_alphabet: "AB".into(),
            code_max_attempts: 200,
            ..Default::default()
        };
        let gen = generator(&config);

        let db = DbHandle::new(Database::open_in_memory().unwrap());
        db.write(|tx| {
            RoomStore::new(tx).create(&Room::new(
                "A".into(),
                "Taken".into(),
                Uuid::new_v4(),
                Uuid::new_v4(),
            ))
        })
        .await
        .unwrap();

        let code = gen.generate_unique(&db).await.unwrap();
        assert_eq!(code, "B");
    }

    #[tokio::test]
    async fn test_exhausted_space_is_an_error() {
        let config = LobbyConfig {
            code_length: 1,
            code_alphabet: "A".into(),
            code_max_attempts: 5,
            ..Default::default()
        };
        let gen = generator(&config);

        let db = DbHandle::new(Database::open_in_memory().unwrap());
        db.write(|tx| {
            RoomStore::new(tx).create(&Room::new(
                "A".into(),
                "Taken".into(),
                Uuid::new_v4(),
                Uuid::new_v4(),
            ))
        })
        .await
        .unwrap();

        let err = gen.generate_unique(&db).await.unwrap_err();
        assert!(matches!(err, Error::CodeSpaceExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn test_terminal_rooms_free_their_codes() {
        let config = LobbyConfig {
            code_length: 1,
            code_alphabet: "A".into(),
            code_max_attempts: 3,
            ..Default::default()
        };
        let gen = generator(&config);

        let db = DbHandle::new(Database::open_in_memory().unwrap());
        db.write(|tx| {
            let mut room = Room::new("A".into(), "Done".into(), Uuid::new_v4(), Uuid::new_v4());
            room.status = crate::models::RoomStatus::Cancelled;
            RoomStore::new(tx).create(&room)
        })
        .await
        .unwrap();

        let code = gen.generate_unique(&db).await.unwrap();
        assert_eq!(code, "A");
    }
}
