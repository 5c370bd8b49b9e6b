// THEORY:
// The `report` module turns finished pictures into output. A sink receives the
// read-only `PictureSnapshot` of every picture that was not suppressed. Text sinks
// write one block per picture:
//
//   Picture 0, POC 1
//   0	113	30
//   1	13	0
//
// The cell report has one `index bits qp` line per cell of the extent rectangle, the
// group report one `group_index group_bits qp` line per 64x64 anchor. With
// coordinate annotation each line is prefixed by `col,row` and a tab. The heatmap
// sink draws each cell as a square colored by its share of the busiest cell.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use thiserror::Error;

use crate::core_modules::session::PictureSnapshot;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("heatmap encoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// Consumer of finished pictures.
pub trait ReportSink {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn write_picture(&mut self, picture: &PictureSnapshot<'_>) -> Result<(), ReportError>;

    fn flush(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

fn write_header<W: Write>(out: &mut W, picture: &PictureSnapshot<'_>) -> std::io::Result<()> {
    writeln!(out, "Picture {}, POC {}", picture.picture_index, picture.poc)
}

/// Full per-cell report.
pub struct CellReportWriter<W: Write> {
    out: W,
    annotate_xy: bool,
}

impl<W: Write> CellReportWriter<W> {
    pub fn new(out: W, annotate_xy: bool) -> Self {
        Self { out, annotate_xy }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl CellReportWriter<BufWriter<File>> {
    /// Creates (truncating) the report file at `path`.
    pub fn create(path: &Path, annotate_xy: bool) -> Result<Self, ReportError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), annotate_xy))
    }
}

impl<W: Write> ReportSink for CellReportWriter<W> {
    fn name(&self) -> &'static str {
        "cell"
    }

    fn write_picture(&mut self, picture: &PictureSnapshot<'_>) -> Result<(), ReportError> {
        write_header(&mut self.out, picture)?;
        for entry in picture.cells() {
            if self.annotate_xy {
                write!(self.out, "{},{}\t", entry.coord.col, entry.coord.row)?;
            }
            writeln!(self.out, "{}\t{}\t{}", entry.index, entry.bits, entry.quality)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Short per-group report, one line per group anchor.
pub struct GroupReportWriter<W: Write> {
    out: W,
    annotate_xy: bool,
}

impl<W: Write> GroupReportWriter<W> {
    pub fn new(out: W, annotate_xy: bool) -> Self {
        Self { out, annotate_xy }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl GroupReportWriter<BufWriter<File>> {
    pub fn create(path: &Path, annotate_xy: bool) -> Result<Self, ReportError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), annotate_xy))
    }
}

impl<W: Write> ReportSink for GroupReportWriter<W> {
    fn name(&self) -> &'static str {
        "group"
    }

    fn write_picture(&mut self, picture: &PictureSnapshot<'_>) -> Result<(), ReportError> {
        write_header(&mut self.out, picture)?;
        for entry in picture.groups() {
            if self.annotate_xy {
                write!(self.out, "{},{}\t", entry.coord.col, entry.coord.row)?;
            }
            writeln!(
                self.out,
                "{}\t{}\t{}",
                entry.group_index, entry.group_bits, entry.quality
            )?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Maps a normalized heat value to an RGB color: blue, through yellow, to red.
pub fn heat_color(ratio: f64) -> [u8; 3] {
    let ratio = ratio.clamp(0.0, 1.0);
    let (r, g, b) = if ratio <= 0.5 {
        let t = ratio / 0.5;
        (0.0, 255.0 * t, 255.0 * (1.0 - t))
    } else {
        let t = (ratio - 0.5) / 0.5;
        (255.0 * t, 255.0 * (1.0 - t), 0.0)
    };
    [r.round() as u8, g.round() as u8, b.round() as u8]
}

/// Writes one PNG per picture, each cell drawn as a square colored by its share of
/// the busiest cell's bits.
pub struct HeatmapWriter {
    dir: PathBuf,
    /// Edge length of one cell in the output image, in pixels.
    cell_pixels: u32,
}

impl HeatmapWriter {
    pub const DEFAULT_CELL_PIXELS: u32 = 4;
    /// Largest accepted cell edge. A full 1024x1024-cell grid stays addressable in `u32`.
    pub const MAX_CELL_PIXELS: u32 = 32;

    /// Creates the output directory if needed. `cell_pixels` is clamped to
    /// `1..=MAX_CELL_PIXELS`.
    pub fn create(dir: impl Into<PathBuf>, cell_pixels: u32) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cell_pixels: cell_pixels.clamp(1, Self::MAX_CELL_PIXELS),
        })
    }

    pub fn cell_pixels(&self) -> u32 {
        self.cell_pixels
    }

    /// File the heatmap of `picture` is written to.
    pub fn path_for(&self, picture: &PictureSnapshot<'_>) -> PathBuf {
        self.dir.join(format!(
            "picture_{:05}_poc_{}.png",
            picture.picture_index, picture.poc
        ))
    }

    fn render(&self, picture: &PictureSnapshot<'_>) -> (u32, u32, Vec<u8>) {
        let scale = self.cell_pixels;
        let width = picture.extent.width() * scale;
        let height = picture.extent.height() * scale;
        let max_bits = picture.cells().map(|e| e.bits).max().unwrap_or(0);

        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        for entry in picture.cells() {
            let ratio = if max_bits == 0 {
                0.0
            } else {
                entry.bits as f64 / max_bits as f64
            };
            let color = heat_color(ratio);
            let top = entry.coord.row * scale;
            let left = entry.coord.col * scale;
            for y in top..top + scale {
                for x in left..left + scale {
                    let i = (y as usize * width as usize + x as usize) * 3;
                    buffer[i..i + 3].copy_from_slice(&color);
                }
            }
        }
        (width, height, buffer)
    }
}

impl ReportSink for HeatmapWriter {
    fn name(&self) -> &'static str {
        "heatmap"
    }

    fn write_picture(&mut self, picture: &PictureSnapshot<'_>) -> Result<(), ReportError> {
        let (width, height, buffer) = self.render(picture);
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            &buffer,
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )?;
        fs::write(self.path_for(picture), png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::resampler::{GroupReport, UnitReport};
    use crate::core_modules::session::PictureSession;

    fn worked_example() -> PictureSession {
        let mut session = PictureSession::new();
        session.start(1, 32, 32).unwrap();
        for (x, y, bits, quality) in [(0, 0, 100, 30.0), (16, 16, 50, 28.0)] {
            session
                .ingest_unit(&UnitReport {
                    x,
                    y,
                    size: 16,
                    bits,
                    quality,
                })
                .unwrap();
        }
        session
            .ingest_group(&GroupReport {
                index: 0,
                x: 0,
                y: 0,
                size: 32,
                bits: 200,
                quality: 0.0,
            })
            .unwrap();
        session
    }

    #[test]
    fn cell_report_lists_every_cell_of_the_extent() {
        let mut session = worked_example();
        let snapshot = session.finish().unwrap().expect("reported");
        let mut writer = CellReportWriter::new(Vec::new(), false);
        writer.write_picture(&snapshot).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "Picture 0, POC 1\n0\t113\t30\n1\t13\t0\n2\t12\t0\n3\t62\t28\n"
        );
    }

    #[test]
    fn cell_report_with_coordinates() {
        let mut session = worked_example();
        let snapshot = session.finish().unwrap().expect("reported");
        let mut writer = CellReportWriter::new(Vec::new(), true);
        writer.write_picture(&snapshot).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "0,0\t0\t113\t30");
        assert_eq!(lines[3], "0,1\t2\t12\t0");
    }

    #[test]
    fn group_report_samples_anchor_cells() {
        let mut session = worked_example();
        let snapshot = session.finish().unwrap().expect("reported");
        let mut writer = GroupReportWriter::new(Vec::new(), false);
        writer.write_picture(&snapshot).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "Picture 0, POC 1\n0\t200\t30\n");
    }

    #[test]
    fn heat_ramp_endpoints() {
        assert_eq!(heat_color(0.0), [0, 0, 255]);
        assert_eq!(heat_color(0.5), [0, 255, 0]);
        assert_eq!(heat_color(1.0), [255, 0, 0]);
        assert_eq!(heat_color(7.0), [255, 0, 0]);
    }

    #[test]
    fn heatmap_png_has_one_block_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = worked_example();
        let snapshot = session.finish().unwrap().expect("reported");

        let mut writer = HeatmapWriter::create(dir.path().join("maps"), 3).unwrap();
        writer.write_picture(&snapshot).unwrap();

        let path = writer.path_for(&snapshot);
        assert!(path.ends_with("picture_00000_poc_1.png"));
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (6, 6));
        // (0, 0) holds the most bits.
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn huge_cell_edge_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = worked_example();
        let snapshot = session.finish().unwrap().expect("reported");

        let mut writer = HeatmapWriter::create(dir.path(), u32::MAX).unwrap();
        assert_eq!(writer.cell_pixels(), HeatmapWriter::MAX_CELL_PIXELS);
        writer.write_picture(&snapshot).unwrap();

        let img = image::open(writer.path_for(&snapshot)).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (64, 64));
        // Bottom-right block belongs to cell (1, 1): 62 of 113 bits.
        assert_eq!(img.get_pixel(63, 63).0, heat_color(62.0 / 113.0));
    }
}
