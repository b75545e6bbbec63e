use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, ValidationError};
use crate::timing::{SparseTimingRecord, Tempo, TimeSignature};

/// A finished piece as handed over by whatever generated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub bpm: u16,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(alias = "dsl")]
    pub events: Vec<SparseTimingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chord_progression: Vec<String>,
}

impl Performance {
    pub fn new(bpm: u16, time_signature: TimeSignature, events: Vec<SparseTimingRecord>) -> Self {
        Self {
            bpm,
            time_signature,
            events,
            key: None,
            style: None,
            chord_progression: Vec::new(),
        }
    }

    pub fn tempo(&self) -> Result<Tempo, ValidationError> {
        Tempo::new(self.bpm, self.time_signature)
    }

    /// Loads a performance from RON, or from JSON when the extension is `.json`.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let performance = if is_json {
            Self::from_json(&contents)?
        } else {
            Self::from_ron(&contents)?
        };

        tracing::info!(
            "Loaded {} record(s) from {}",
            performance.events.len(),
            path.display()
        );
        Ok(performance)
    }

    pub fn from_ron(source: &str) -> Result<Self, LoadError> {
        let performance: Performance = ron::from_str(source)?;
        performance.tempo()?;
        Ok(performance)
    }

    pub fn from_json(source: &str) -> Result<Self, LoadError> {
        let performance: Performance = serde_json::from_str(source)?;
        performance.tempo()?;
        Ok(performance)
    }

    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_collaborator_json() {
        let json = r#"{
            "bpm": 96,
            "time_signature": {"numerator": 3, "denominator": 4},
            "key": "G major",
            "dsl": [
                {"measure": 1, "beat": 1, "event": "G3", "value": 80},
                {"beat_div4": 3, "event": "B3", "value": 60},
                {"beat": 2, "beat_div16": 5, "event": "Sustain", "value": 100}
            ]
        }"#;
        let performance = Performance::from_json(json).unwrap();

        assert_eq!(performance.bpm, 96);
        assert_eq!(performance.time_signature, TimeSignature::new(3, 4).unwrap());
        assert_eq!(performance.key.as_deref(), Some("G major"));
        assert_eq!(performance.events.len(), 3);
        assert_eq!(performance.events[1].quarter_sub, Some(3));
        assert_eq!(performance.events[2].sixteenth_sub, Some(5));
        assert_eq!(performance.events[2].measure, None);
    }

    #[test]
    fn test_time_signature_as_text() {
        let json = r#"{
            "bpm": 96,
            "time_signature": "3/4",
            "dsl": [{"event": "C4", "value": 80}]
        }"#;
        let performance = Performance::from_json(json).unwrap();
        assert_eq!(performance.time_signature, TimeSignature::new(3, 4).unwrap());
    }

    #[test]
    fn test_malformed_records_are_skipped_not_fatal() {
        let json = r#"{
            "bpm": 120,
            "dsl": [
                {"measure": 1, "event": "C4", "value": 80},
                {"beat": 300, "event": "D4", "value": 80},
                {"event": "E4", "value": -1},
                {"beat": 2, "event": "F4", "value": 80}
            ]
        }"#;
        let performance = Performance::from_json(json).unwrap();
        assert_eq!(performance.events.len(), 4);

        let tempo = performance.tempo().unwrap();
        let schedule = crate::timing::schedule_records(
            &performance.events,
            tempo,
            0,
            crate::timing::ReleasePolicy::EmitOnce,
        );
        let kept: Vec<usize> = schedule.events.iter().map(|e| e.index).collect();
        let skipped: Vec<usize> = schedule.rejected.iter().map(|e| e.index).collect();
        assert_eq!(kept, vec![0, 3]);
        assert_eq!(skipped, vec![1, 2]);
    }

    #[test]
    fn test_from_ron() {
        let ron = r#"(
            bpm: 120,
            events: [
                (measure: Some(1), event: "C4", value: 100),
                (beat: Some(3), event: "E4", value: 90),
            ],
        )"#;
        let performance = Performance::from_ron(ron).unwrap();
        assert_eq!(performance.time_signature, TimeSignature::COMMON);
        assert_eq!(performance.events[1].beat, Some(3));
    }

    #[test]
    fn test_rejects_bad_tempo() {
        let json = r#"{"bpm": 20, "dsl": []}"#;
        assert!(matches!(
            Performance::from_json(json),
            Err(LoadError::Validation(ValidationError::BpmOutOfRange(20)))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path =
            std::env::temp_dir().join(format!("midicue-performance-{}.ron", std::process::id()));
        let performance = Performance::new(
            140,
            TimeSignature::new(6, 8).unwrap(),
            vec![
                SparseTimingRecord::new("D4", 70).measure(1),
                SparseTimingRecord::new("ModWheel", 30).quarter_sub(2),
            ],
        );
        performance.save(&path).unwrap();
        let loaded = Performance::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, performance);
    }
}
