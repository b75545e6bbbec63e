use std::fmt;

use crate::error::EncodingError;
use crate::timing::ResolvedPosition;

/// A MIDI channel, 0..=15.
pub type Channel = u8;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Named controllers, matched after stripping spaces, `-` and `_` and lowercasing.
const CONTROLLERS: &[(&str, u8)] = &[
    ("modwheel", 1),
    ("modulation", 1),
    ("breath", 2),
    ("foot", 4),
    ("portamentotime", 5),
    ("volume", 7),
    ("balance", 8),
    ("pan", 10),
    ("expression", 11),
    ("sustain", 64),
    ("damper", 64),
    ("portamento", 65),
    ("sostenuto", 66),
    ("softpedal", 67),
    ("soft", 67),
    ("legato", 68),
    ("allsoundoff", 120),
    ("resetcontrollers", 121),
    ("allnotesoff", 123),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: Channel,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: Channel,
        pitch: u8,
        velocity: u8,
    },
    ControlChange {
        channel: Channel,
        controller: u8,
        value: u8,
    },
}

impl MidiMessage {
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => [NOTE_ON | channel, pitch, velocity],
            MidiMessage::NoteOff {
                channel,
                pitch,
                velocity,
            } => [NOTE_OFF | channel, pitch, velocity],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [CONTROL_CHANGE | channel, controller, value],
        }
    }

    /// Decodes note-on, note-off and control-change messages. Anything else is `None`.
    pub fn from_bytes(bytes: [u8; 3]) -> Option<Self> {
        let status = bytes[0] & 0xF0;
        let channel = bytes[0] & 0x0F;
        if bytes[1] > 0x7F || bytes[2] > 0x7F {
            return None;
        }
        match status {
            NOTE_ON => Some(MidiMessage::NoteOn {
                channel,
                pitch: bytes[1],
                velocity: bytes[2],
            }),
            NOTE_OFF => Some(MidiMessage::NoteOff {
                channel,
                pitch: bytes[1],
                velocity: bytes[2],
            }),
            CONTROL_CHANGE => Some(MidiMessage::ControlChange {
                channel,
                controller: bytes[1],
                value: bytes[2],
            }),
            _ => None,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { .. })
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => write!(
                f,
                "Note ON  ch={channel} note={} vel={velocity}",
                note_name(pitch)
            ),
            MidiMessage::NoteOff { channel, pitch, .. } => {
                write!(f, "Note OFF ch={channel} note={}", note_name(pitch))
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => write!(f, "CC       ch={channel} ctrl={controller} val={value}"),
        }
    }
}

/// What a record's `event` string refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDescriptor {
    Note(u8),
    Controller(u8),
}

impl EventDescriptor {
    pub fn parse(name: &str) -> Result<Self, EncodingError> {
        let trimmed = name.trim();
        if let Some(number) = parse_note(trimmed)? {
            return Ok(EventDescriptor::Note(number));
        }
        parse_controller(trimmed)
            .map(EventDescriptor::Controller)
            .ok_or_else(|| EncodingError::UnknownEvent(name.to_string()))
    }
}

/// Returns `Ok(None)` when `name` isn't note-shaped at all, so controller
/// lookup can take over.
fn parse_note(name: &str) -> Result<Option<u8>, EncodingError> {
    let mut chars = name.chars();
    let pitch_class: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('C') => 0,
        Some('D') => 2,
        Some('E') => 4,
        Some('F') => 5,
        Some('G') => 7,
        Some('A') => 9,
        Some('B') => 11,
        _ => return Ok(None),
    };

    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };

    let Ok(octave) = octave.parse::<i32>() else {
        return Ok(None);
    };

    let number = 12 * (octave + 1) + pitch_class + accidental;
    u8::try_from(number)
        .ok()
        .filter(|n| *n <= 127)
        .map(Some)
        .ok_or_else(|| EncodingError::NoteOutOfRange {
            name: name.to_string(),
            number,
        })
}

fn parse_controller(name: &str) -> Option<u8> {
    let key: String = name
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if let Some(number) = key.strip_prefix("cc") {
        return number.parse::<u8>().ok().filter(|n| *n <= 127);
    }

    CONTROLLERS
        .iter()
        .find(|(controller, _)| *controller == key)
        .map(|(_, number)| *number)
}

/// Canonical name of a MIDI note number, using sharps (`60` is `C4`).
pub fn note_name(number: u8) -> String {
    let octave = number as i32 / 12 - 1;
    format!("{}{}", PITCH_NAMES[(number % 12) as usize], octave)
}

/// Maps the 0-100 scale onto 0-127.
pub fn scale_value(value: u8) -> u8 {
    (value as f64 * 127.0 / 100.0).round().clamp(0.0, 127.0) as u8
}

pub fn validate_channel(channel: Channel) -> Result<Channel, EncodingError> {
    if channel > 0x0F {
        return Err(EncodingError::InvalidChannel(channel));
    }
    Ok(channel)
}

/// Encodes one semantic event. Notes become note-on, controllers become control change.
pub fn encode(event: &str, value: u8, channel: Channel) -> Result<MidiMessage, EncodingError> {
    let channel = validate_channel(channel)?;
    let scaled = scale_value(value);
    Ok(match EventDescriptor::parse(event)? {
        EventDescriptor::Note(pitch) => MidiMessage::NoteOn {
            channel,
            pitch,
            velocity: scaled,
        },
        EventDescriptor::Controller(controller) => MidiMessage::ControlChange {
            channel,
            controller,
            value: scaled,
        },
    })
}

/// The note-off paired with a note-on, or `None` for other messages.
pub fn release_for(message: &MidiMessage) -> Option<MidiMessage> {
    match *message {
        MidiMessage::NoteOn { channel, pitch, .. } => Some(MidiMessage::NoteOff {
            channel,
            pitch,
            velocity: 0,
        }),
        _ => None,
    }
}

/// An encoded event stamped with the moment it must fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// Index of the record this event came from.
    pub index: usize,
    pub position: ResolvedPosition,
    pub offset_seconds: f64,
    pub message: MidiMessage,
}

impl ScheduledEvent {
    pub fn wire_payload(&self) -> [u8; 3] {
        self.message.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_numbers() {
        assert_eq!(EventDescriptor::parse("C4"), Ok(EventDescriptor::Note(60)));
        assert_eq!(EventDescriptor::parse("A4"), Ok(EventDescriptor::Note(69)));
        assert_eq!(EventDescriptor::parse("F#3"), Ok(EventDescriptor::Note(54)));
        assert_eq!(EventDescriptor::parse("Bb2"), Ok(EventDescriptor::Note(46)));
        assert_eq!(EventDescriptor::parse("C-1"), Ok(EventDescriptor::Note(0)));
        assert_eq!(EventDescriptor::parse("G9"), Ok(EventDescriptor::Note(127)));
    }

    #[test]
    fn test_notes_out_of_range() {
        assert!(matches!(
            EventDescriptor::parse("G#9"),
            Err(EncodingError::NoteOutOfRange { number: 128, .. })
        ));
        assert!(matches!(
            EventDescriptor::parse("Cb-1"),
            Err(EncodingError::NoteOutOfRange { number: -1, .. })
        ));
    }

    #[test]
    fn test_controllers() {
        assert_eq!(
            EventDescriptor::parse("Sustain"),
            Ok(EventDescriptor::Controller(64))
        );
        assert_eq!(
            EventDescriptor::parse("ModWheel"),
            Ok(EventDescriptor::Controller(1))
        );
        assert_eq!(
            EventDescriptor::parse("mod-wheel"),
            Ok(EventDescriptor::Controller(1))
        );
        assert_eq!(
            EventDescriptor::parse("CC74"),
            Ok(EventDescriptor::Controller(74))
        );
        assert_eq!(
            EventDescriptor::parse("Kazoo"),
            Err(EncodingError::UnknownEvent("Kazoo".to_string()))
        );
        assert!(EventDescriptor::parse("CC200").is_err());
    }

    #[test]
    fn test_value_scaling() {
        assert_eq!(scale_value(0), 0);
        assert_eq!(scale_value(100), 127);
        assert_eq!(scale_value(50), 64);
        assert_eq!(scale_value(255), 127);
    }

    #[test]
    fn test_encode_bytes() {
        assert_eq!(encode("C4", 100, 0).unwrap().to_bytes(), [0x90, 60, 127]);
        assert_eq!(encode("A4", 0, 3).unwrap().to_bytes(), [0x93, 69, 0]);
        assert_eq!(encode("Sustain", 100, 0).unwrap().to_bytes(), [0xB0, 64, 127]);
        assert_eq!(
            encode("C4", 100, 16),
            Err(EncodingError::InvalidChannel(16))
        );
    }

    #[test]
    fn test_every_note_name_round_trips() {
        for number in 0..=127u8 {
            let name = note_name(number);
            let bytes = encode(&name, 80, 0).unwrap().to_bytes();
            assert_eq!(bytes[1], number);
            assert_eq!(note_name(bytes[1]), name);
        }
    }

    #[test]
    fn test_release_pairs_note_on_only() {
        let on = encode("E4", 70, 2).unwrap();
        assert_eq!(release_for(&on).unwrap().to_bytes(), [0x82, 64, 0]);
        let cc = encode("Sustain", 70, 2).unwrap();
        assert_eq!(release_for(&cc), None);
    }

    #[test]
    fn test_from_bytes() {
        assert_eq!(
            MidiMessage::from_bytes([0x91, 60, 100]),
            Some(MidiMessage::NoteOn {
                channel: 1,
                pitch: 60,
                velocity: 100
            })
        );
        assert_eq!(MidiMessage::from_bytes([0xE0, 0, 64]), None);
    }
}
