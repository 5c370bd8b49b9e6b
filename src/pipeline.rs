// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires a
// `PictureSession` to the configured report sinks so a caller only has to forward
// decoder callbacks (or replay a recorded trace) and never touches the grid itself.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ComplexityConfig;
use crate::core_modules::error::ContractViolation;
use crate::core_modules::report::{
    CellReportWriter, GroupReportWriter, HeatmapWriter, ReportError, ReportSink,
};
use crate::core_modules::session::PictureSession;

// Re-export key data structures for the public API.
pub use crate::core_modules::resampler::{Extent, GroupReport, OverheadSplit, UnitReport};
pub use crate::core_modules::session::{
    CellEntry, GroupEntry, PictureSnapshot, SessionState, StartOutcome,
};
pub use crate::core_modules::trace::DecoderEvent;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("{sink} report failed: {source}")]
    Report {
        sink: &'static str,
        #[source]
        source: ReportError,
    },
}

/// Running totals over the pictures seen by a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Pictures handed to the sinks.
    pub pictures_reported: u32,
    /// Repeated pictures that were dropped.
    pub pictures_suppressed: u32,
    /// Unit, macroblock and group reports accepted, including suppressed ones.
    pub reports: u64,
}

/// A picture session plus the sinks its finished pictures go to.
pub struct ComplexityPipeline {
    session: PictureSession,
    sinks: Vec<Box<dyn ReportSink>>,
    stats: PipelineStats,
}

impl Default for ComplexityPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplexityPipeline {
    /// A pipeline with no sinks.
    pub fn new() -> Self {
        Self {
            session: PictureSession::new(),
            sinks: Vec::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Opens every sink enabled in `config`.
    pub fn from_config(config: &ComplexityConfig) -> Result<Self, PipelineError> {
        let mut pipeline = Self::new();

        if let Some(path) = &config.filename {
            let sink = CellReportWriter::create(path, config.dump_xy)
                .map_err(|source| PipelineError::Report { sink: "cell", source })?;
            info!(path = %path.display(), "cell report enabled");
            pipeline.add_sink(Box::new(sink));
        }
        if let Some(path) = &config.ctu_filename {
            let sink = GroupReportWriter::create(path, config.dump_xy)
                .map_err(|source| PipelineError::Report { sink: "group", source })?;
            info!(path = %path.display(), "group report enabled");
            pipeline.add_sink(Box::new(sink));
        }
        if let Some(dir) = &config.heatmap_dir {
            let sink = HeatmapWriter::create(dir, HeatmapWriter::DEFAULT_CELL_PIXELS)
                .map_err(|source| PipelineError::Report { sink: "heatmap", source })?;
            info!(dir = %dir.display(), "heatmap output enabled");
            pipeline.add_sink(Box::new(sink));
        }

        Ok(pipeline)
    }

    pub fn add_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn session(&self) -> &PictureSession {
        &self.session
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn start(
        &mut self,
        poc: i32,
        width: u32,
        height: u32,
    ) -> Result<StartOutcome, PipelineError> {
        Ok(self.session.start(poc, width, height)?)
    }

    pub fn ingest_unit(&mut self, unit: &UnitReport) -> Result<(), PipelineError> {
        self.session.ingest_unit(unit)?;
        self.stats.reports += 1;
        Ok(())
    }

    pub fn ingest_macroblock(
        &mut self,
        col: u32,
        row: u32,
        bits: u64,
        quality: f64,
    ) -> Result<(), PipelineError> {
        self.session.ingest_macroblock(col, row, bits, quality)?;
        self.stats.reports += 1;
        Ok(())
    }

    pub fn ingest_group(
        &mut self,
        group: &GroupReport,
    ) -> Result<Option<OverheadSplit>, PipelineError> {
        let split = self.session.ingest_group(group)?;
        self.stats.reports += 1;
        Ok(split)
    }

    /// Ends the current picture and reports it to every sink.
    ///
    /// Returns `false` when the picture was a suppressed repeat.
    pub fn finish(&mut self) -> Result<bool, PipelineError> {
        let Some(snapshot) = self.session.finish()? else {
            self.stats.pictures_suppressed += 1;
            return Ok(false);
        };

        for sink in &mut self.sinks {
            let name = sink.name();
            sink.write_picture(&snapshot)
                .and_then(|()| sink.flush())
                .map_err(|source| PipelineError::Report { sink: name, source })?;
        }
        self.stats.pictures_reported += 1;
        debug!(
            picture_index = snapshot.picture_index,
            poc = snapshot.poc,
            occupied_cells = snapshot.occupied_cells(),
            sinks = self.sinks.len(),
            "picture reported"
        );
        Ok(true)
    }

    /// Applies one decoder callback.
    pub fn handle(&mut self, event: &DecoderEvent) -> Result<(), PipelineError> {
        match event {
            DecoderEvent::Start { poc, width, height } => {
                self.start(*poc, *width, *height).map(|_| ())
            }
            DecoderEvent::Unit(unit) => self.ingest_unit(unit),
            DecoderEvent::Group(group) => self.ingest_group(group).map(|_| ()),
            DecoderEvent::Macroblock { col, row, bits, quality } => {
                self.ingest_macroblock(*col, *row, *bits, *quality)
            }
            DecoderEvent::Finish => self.finish().map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records `(picture_index, poc, bits per cell)` for every reported picture.
    struct RecordingSink {
        seen: Rc<RefCell<Vec<(u32, i32, Vec<u64>)>>>,
    }

    impl ReportSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn write_picture(&mut self, picture: &PictureSnapshot<'_>) -> Result<(), ReportError> {
            let bits = picture.cells().map(|e| e.bits).collect();
            self.seen
                .borrow_mut()
                .push((picture.picture_index, picture.poc, bits));
            Ok(())
        }
    }

    struct FailingSink;

    impl ReportSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn write_picture(&mut self, _picture: &PictureSnapshot<'_>) -> Result<(), ReportError> {
            Err(ReportError::Io(std::io::Error::other("disk full")))
        }
    }

    fn start(poc: i32) -> DecoderEvent {
        DecoderEvent::Start {
            poc,
            width: 32,
            height: 32,
        }
    }

    fn native(x: u32, y: u32, bits: u64) -> DecoderEvent {
        DecoderEvent::Unit(UnitReport {
            x,
            y,
            size: 16,
            bits,
            quality: 30.0,
        })
    }

    #[test]
    fn repeated_first_picture_is_reported_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline =
            ComplexityPipeline::new().with_sink(Box::new(RecordingSink { seen: seen.clone() }));

        let events = [
            start(0),
            native(0, 0, 10),
            DecoderEvent::Finish,
            start(0),
            native(0, 0, 99),
            DecoderEvent::Finish,
            start(1),
            native(16, 0, 20),
            DecoderEvent::Finish,
        ];
        for event in &events {
            pipeline.handle(event).unwrap();
        }

        assert_eq!(
            *seen.borrow(),
            vec![(0, 0, vec![10]), (1, 1, vec![0, 20])]
        );
        assert_eq!(
            pipeline.stats(),
            PipelineStats {
                pictures_reported: 2,
                pictures_suppressed: 1,
                reports: 3
            }
        );
    }

    #[test]
    fn suppressed_repeat_ignores_every_report_kind() {
        let mut pipeline = ComplexityPipeline::new();
        pipeline.handle(&start(2)).unwrap();
        pipeline.handle(&native(0, 0, 10)).unwrap();
        pipeline.handle(&DecoderEvent::Finish).unwrap();
        let before = pipeline.session().grid().clone();

        pipeline.handle(&start(2)).unwrap();
        assert_eq!(pipeline.session().state(), SessionState::Suppressed);
        let repeats = [
            native(16, 16, 5),
            DecoderEvent::Unit(UnitReport {
                x: 0,
                y: 16,
                size: 8,
                bits: 3,
                quality: 20.0,
            }),
            DecoderEvent::Unit(UnitReport {
                x: 0,
                y: 0,
                size: 32,
                bits: 40,
                quality: 20.0,
            }),
            DecoderEvent::Macroblock {
                col: 1,
                row: 0,
                bits: 9,
                quality: 30.0,
            },
        ];
        for event in &repeats {
            pipeline.handle(event).unwrap();
        }
        let split = pipeline
            .ingest_group(&GroupReport {
                index: 0,
                x: 0,
                y: 0,
                size: 32,
                bits: 500,
                quality: 0.0,
            })
            .unwrap();
        assert_eq!(split, None);

        assert!(!pipeline.finish().unwrap());
        assert_eq!(pipeline.session().grid(), &before);
        assert_eq!(pipeline.session().state(), SessionState::Idle);
    }

    #[test]
    fn contract_violation_surfaces_from_handle() {
        let mut pipeline = ComplexityPipeline::new();
        pipeline.handle(&start(0)).unwrap();
        pipeline.handle(&native(0, 0, 300)).unwrap();

        let err = pipeline
            .handle(&DecoderEvent::Group(GroupReport {
                index: 4,
                x: 0,
                y: 0,
                size: 32,
                bits: 100,
                quality: 0.0,
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Contract(ContractViolation::NegativeOverhead { group_index: 4, .. })
        ));
    }

    #[test]
    fn sink_failures_name_the_sink() {
        let mut pipeline = ComplexityPipeline::new().with_sink(Box::new(FailingSink));
        pipeline.start(0, 16, 16).unwrap();

        match pipeline.finish() {
            Err(PipelineError::Report { sink, .. }) => assert_eq!(sink, "failing"),
            other => panic!("expected sink failure, got {other:?}"),
        }
    }

    #[test]
    fn default_config_opens_no_sinks() {
        let mut pipeline = ComplexityPipeline::from_config(&ComplexityConfig::default()).unwrap();
        pipeline.start(3, 16, 16).unwrap();
        assert!(pipeline.finish().unwrap());
    }
}
