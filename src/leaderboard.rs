//! Fastest races, kept on disk as a pretty-printed JSON array.

use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// Records kept after each add.
pub const MAX_RECORDS: usize = 50;
/// Where the race keeps its records unless told otherwise.
pub const DEFAULT_LEADERBOARD_PATH: &str = "leaderboard.json";

/// One finished race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    /// Name the player gave.
    pub player_name: String,
    /// Seconds, lower is better.
    pub race_time: f64,
    /// Longest run of focused ticks during the race.
    pub max_focus_streak: u32,
    /// RFC 3339, local time.
    pub timestamp: String,
}

/// Errors from reading or writing the leaderboard file.
#[derive(Debug)]
pub enum LeaderboardError {
    /// Returned when the file cannot be read or written.
    IoError(io::Error),
    /// Returned when the file is not a JSON list of records.
    JsonError(serde_json::Error),
}

impl fmt::Display for LeaderboardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::IoError(error) => Cow::from(format!("leaderboard io error: {}", error)),
            Self::JsonError(error) => Cow::from(format!("leaderboard json error: {}", error)),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for LeaderboardError {}

impl From<io::Error> for LeaderboardError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<serde_json::Error> for LeaderboardError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value)
    }
}

fn sort_by_time(records: &mut [RaceRecord]) {
    records.sort_by(|a, b| a.race_time.total_cmp(&b.race_time));
}

/// Race records kept in a JSON file, sorted fastest first.
pub struct Leaderboard {
    path: PathBuf,
    records: Vec<RaceRecord>,
}

impl Leaderboard {
    /// Loads `path`. A missing file is an empty board; so is a corrupt one,
    /// with a warning, and the next add overwrites it.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match Self::load(&path) {
            Ok(records) => records,
            Err(LeaderboardError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Error loading leaderboard {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self { path, records }
    }

    fn load(path: &Path) -> Result<Vec<RaceRecord>, LeaderboardError> {
        let bytes = fs::read(path)?;
        let mut records: Vec<RaceRecord> = serde_json::from_slice(&bytes)?;
        sort_by_time(&mut records);
        Ok(records)
    }

    /// Rewrites the whole file.
    pub fn save(&self) -> Result<(), LeaderboardError> {
        let data = serde_json::to_vec_pretty(&self.records)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    /// Inserts a record stamped with the current local time, keeps the
    /// fastest [`MAX_RECORDS`] and saves.
    pub fn add_record(
        &mut self,
        player_name: &str,
        race_time: f64,
        max_focus_streak: u32,
    ) -> Result<(), LeaderboardError> {
        self.records.push(RaceRecord {
            player_name: player_name.to_owned(),
            race_time,
            max_focus_streak,
            timestamp: Local::now().to_rfc3339(),
        });
        sort_by_time(&mut self.records);
        self.records.truncate(MAX_RECORDS);
        info!("{} finished in {:.2}s", player_name, race_time);
        self.save()
    }

    /// Fastest `n` records.
    pub fn top_records(&self, n: usize) -> &[RaceRecord] {
        &self.records[..n.min(self.records.len())]
    }

    /// 0.0 when empty.
    pub fn best_time(&self) -> f64 {
        self.records.first().map(|r| r.race_time).unwrap_or(0.0)
    }

    /// 0 when empty.
    pub fn best_streak(&self) -> u32 {
        self.records
            .iter()
            .map(|r| r.max_focus_streak)
            .max()
            .unwrap_or(0)
    }

    /// All records, fastest first.
    pub fn records(&self) -> &[RaceRecord] {
        &self.records
    }

    /// The file the records are saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_board() {
        let dir = tempdir().unwrap();
        let board = Leaderboard::open(dir.path().join("board.json"));
        assert!(board.records().is_empty());
        assert_eq!(board.best_time(), 0.0);
        assert_eq!(board.best_streak(), 0);
        assert!(board.top_records(5).is_empty());
    }

    #[test]
    fn records_sort_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.json");
        let mut board = Leaderboard::open(&path);
        board.add_record("slow", 40.0, 12).unwrap();
        board.add_record("fast", 20.0, 3).unwrap();
        board.add_record("mid", 30.0, 7).unwrap();

        let names: Vec<&str> = board
            .top_records(2)
            .iter()
            .map(|r| r.player_name.as_str())
            .collect();
        assert_eq!(names, ["fast", "mid"]);
        assert_eq!(board.best_time(), 20.0);
        assert_eq!(board.best_streak(), 12);

        let reopened = Leaderboard::open(&path);
        assert_eq!(reopened.records(), board.records());
        assert!(chrono::DateTime::parse_from_rfc3339(&reopened.records()[0].timestamp).is_ok());
    }

    #[test]
    fn keeps_fifty_fastest() {
        let dir = tempdir().unwrap();
        let mut board = Leaderboard::open(dir.path().join("board.json"));
        for i in 0..60 {
            board.add_record("p", 100.0 - i as f64, 0).unwrap();
        }
        assert_eq!(board.records().len(), MAX_RECORDS);
        assert_eq!(board.best_time(), 41.0);
        assert_eq!(board.records().last().map(|r| r.race_time), Some(90.0));
    }

    #[test]
    fn unsorted_file_is_sorted_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(
            &path,
            r#"[
                {"player_name": "b", "race_time": 9.0, "max_focus_streak": 1, "timestamp": "2024-01-01T00:00:00"},
                {"player_name": "a", "race_time": 3.0, "max_focus_streak": 2, "timestamp": "2024-01-01T00:00:00"}
            ]"#,
        )
        .unwrap();
        let board = Leaderboard::open(&path);
        assert_eq!(board.records()[0].player_name, "a");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, "{ not json").unwrap();
        let mut board = Leaderboard::open(&path);
        assert!(board.records().is_empty());
        board.add_record("p", 1.0, 1).unwrap();
        assert_eq!(Leaderboard::open(&path).records().len(), 1);
    }
}
