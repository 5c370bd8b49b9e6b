// THEORY:
// The `trace` module records and replays the decoder's callback sequence. A trace
// is JSON lines, one event per line; blank lines and lines starting with `#` are
// skipped. Replaying a trace drives the pipeline exactly like a live decoder would.
//
//   {"event":"start","poc":1,"width":32,"height":32}
//   {"event":"unit","x":0,"y":0,"size":16,"bits":100,"quality":30}
//   {"event":"group","index":0,"x":0,"y":0,"size":32,"bits":200,"quality":0}
//   {"event":"finish"}

use std::io::{BufRead, Lines};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_modules::resampler::{GroupReport, UnitReport};

/// One decoder callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecoderEvent {
    Start { poc: i32, width: u32, height: u32 },
    Unit(UnitReport),
    Group(GroupReport),
    /// AVC-style macroblock addressed in cell coordinates.
    Macroblock { col: u32, row: u32, bits: u64, quality: f64 },
    Finish,
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed event: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Iterates the events of a JSON-lines trace together with their line numbers.
pub struct TraceReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<(usize, DecoderEvent), TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let line = self.line;
            return Some(
                serde_json::from_str(trimmed)
                    .map(|event| (line, event))
                    .map_err(|source| TraceError::Parse { line, source }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_event_kinds() {
        let trace = r#"
# first picture
{"event":"start","poc":1,"width":32,"height":32}
{"event":"unit","x":0,"y":0,"size":16,"bits":100,"quality":30}

{"event":"macroblock","col":1,"row":1,"bits":50,"quality":28.5}
{"event":"group","index":0,"x":0,"y":0,"size":32,"bits":200,"quality":0}
{"event":"finish"}
"#;
        let events: Vec<(usize, DecoderEvent)> = TraceReader::new(trace.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            (
                3,
                DecoderEvent::Start {
                    poc: 1,
                    width: 32,
                    height: 32
                }
            )
        );
        assert!(matches!(events[1].1, DecoderEvent::Unit(UnitReport { bits: 100, size: 16, .. })));
        assert_eq!(events[2].0, 6);
        assert!(matches!(
            events[3].1,
            DecoderEvent::Group(GroupReport { index: 0, bits: 200, .. })
        ));
        assert_eq!(events[4].1, DecoderEvent::Finish);
    }

    #[test]
    fn parse_errors_carry_the_line_number() {
        let trace = "{\"event\":\"finish\"}\n{\"event\":\"unit\",\"x\":0}\n";
        let mut reader = TraceReader::new(trace.as_bytes());
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(TraceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = DecoderEvent::Start {
            poc: -3,
            width: 1920,
            height: 1080,
        };
        let text = serde_json::to_string(&event).unwrap();
        assert_eq!(text, r#"{"event":"start","poc":-3,"width":1920,"height":1080}"#);
    }
}
