use super::{Comparison, Metric};
use crate::class::ClassLabel;
use crate::error::{PipelineError, PipelineResult};
use image::{Rgb, RgbImage};
use std::io::Write;

const INCHES_PER_METRE: f64 = 39.370_078_740_157_48;
const MARGIN: u32 = 40;
const GRID_LINES: u32 = 5;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// Fixed bar colour of each class, identical in every chart.
pub fn palette_color(class: ClassLabel) -> Rgb<u8> {
    match class {
        ClassLabel::Agriculture => Rgb([230, 171, 2]),
        ClassLabel::SholaForest => Rgb([27, 94, 32]),
        ClassLabel::SholaGrassland => Rgb([166, 217, 106]),
        ClassLabel::Settlements => Rgb([213, 62, 79]),
        ClassLabel::Plantations => Rgb([117, 112, 179]),
        ClassLabel::TeaPlantations => Rgb([102, 166, 30]),
        ClassLabel::TimberPlantations => Rgb([141, 160, 203]),
        ClassLabel::WaterBodies => Rgb([49, 130, 189]),
        ClassLabel::Swamps => Rgb([128, 205, 193]),
        ClassLabel::Roads => Rgb([99, 99, 99]),
        ClassLabel::NoData => Rgb([200, 200, 200]),
    }
}

/// Grouped bar chart with one facet per period and one bar per class.
#[derive(Debug)]
pub struct BarChart<'a> {
    comparison: &'a Comparison,
    metric: Metric,
    facet_size: (u32, u32),
    dpi: u32,
}

impl<'a> BarChart<'a> {
    pub fn new(comparison: &'a Comparison, metric: Metric) -> Self {
        Self {
            comparison,
            metric,
            facet_size: (480, 360),
            dpi: 300,
        }
    }

    pub fn with_facet_size(mut self, width: u32, height: u32) -> Self {
        self.facet_size = (width.max(2 * MARGIN + 1), height.max(2 * MARGIN + 1));
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    fn axis_max(&self) -> f64 {
        match self.metric {
            Metric::Percent => 100.0,
            Metric::SquareKilometres => nice_ceiling(self.comparison.max_value()),
        }
    }

    pub fn render(&self) -> RgbImage {
        let (facet_width, facet_height) = self.facet_size;
        let facets = self.comparison.periods().len().max(1) as u32;
        let mut image = RgbImage::from_pixel(facet_width * facets, facet_height, WHITE);

        let classes: Vec<ClassLabel> = self.comparison.classes().collect();
        let plot_height = facet_height - 2 * MARGIN;
        let plot_width = facet_width - 2 * MARGIN;
        let baseline = facet_height - MARGIN;
        let axis_max = self.axis_max();

        for (facet, period) in self.comparison.periods().iter().enumerate() {
            let left = facet as u32 * facet_width + MARGIN;
            for step in 1..=GRID_LINES {
                let y = baseline - plot_height * step / GRID_LINES;
                fill(&mut image, left, y, plot_width, 1, GRID);
            }

            let slot = plot_width / classes.len().max(1) as u32;
            let bar_width = (slot * 4 / 5).max(1);
            for (i, class) in classes.iter().enumerate() {
                let Some(value) = self.comparison.get(*class, period) else {
                    continue;
                };
                let height = ((value / axis_max).clamp(0.0, 1.0) * plot_height as f64).round() as u32;
                let x = left + i as u32 * slot + (slot - bar_width) / 2;
                fill(&mut image, x, baseline - height, bar_width, height, palette_color(*class));
            }

            fill(&mut image, left, MARGIN, 1, plot_height, AXIS);
            fill(&mut image, left, baseline, plot_width, 1, AXIS);
        }
        image
    }

    /// PNG with the chart's DPI recorded in the `pHYs` chunk.
    pub fn encode_png<W: Write>(&self, writer: W) -> PipelineResult<()> {
        let image = self.render();
        let pixels_per_metre = (self.dpi as f64 * INCHES_PER_METRE).round() as u32;
        let mut encoder = png::Encoder::new(writer, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: pixels_per_metre,
            yppu: pixels_per_metre,
            unit: png::Unit::Meter,
        }));
        let chart_error = |e: png::EncodingError| PipelineError::Chart(e.to_string());
        let mut png = encoder.write_header().map_err(chart_error)?;
        png.write_image_data(image.as_raw()).map_err(chart_error)?;
        png.finish().map_err(chart_error)
    }
}

fn fill(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let x_end = (x + width).min(image.width());
    let y_end = (y + height).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

/// Smallest 1, 2 or 5 times a power of ten at or above `value`.
fn nice_ceiling(value: f64) -> f64 {
    if !(value.is_finite() && value > 0.0) {
        return 1.0;
    }
    let magnitude = 10_f64.powf(value.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|step| step * magnitude)
        .find(|candidate| *candidate >= value)
        .unwrap_or(10.0 * magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{AreaRow, AreaTable};

    fn comparison() -> Comparison {
        let rows = [
            (ClassLabel::SholaForest, "1848", 40.0),
            (ClassLabel::SholaGrassland, "1848", 80.0),
            (ClassLabel::SholaForest, "2018", 20.0),
        ];
        Comparison::outer_join(&[AreaTable {
            rows: rows
                .iter()
                .map(|(class, period, km2)| AreaRow {
                    class: *class,
                    time_period: period.to_string(),
                    area_m2: km2 * 1e6,
                })
                .collect(),
        }])
    }

    #[test]
    fn axis_ceiling_is_a_round_number() {
        assert_eq!(nice_ceiling(80.0), 100.0);
        assert_eq!(nice_ceiling(0.3), 0.5);
        assert_eq!(nice_ceiling(1500.0), 2000.0);
        assert_eq!(nice_ceiling(0.0), 1.0);
    }

    #[test]
    fn one_facet_per_period() {
        let comparison = comparison();
        let image = BarChart::new(&comparison, Metric::SquareKilometres)
            .with_facet_size(200, 100)
            .render();
        assert_eq!(image.dimensions(), (400, 100));

        // Grassland is the second of two slots in the first facet, 80% tall
        let slot = (200 - 2 * MARGIN) / 2;
        let x = MARGIN + slot + slot / 2;
        let y = 100 - MARGIN - 5;
        assert_eq!(*image.get_pixel(x, y), palette_color(ClassLabel::SholaGrassland));
        // No grassland bar in 2018
        assert_eq!(*image.get_pixel(200 + x, y), WHITE);
    }

    #[test]
    fn png_records_the_dpi() {
        let comparison = comparison();
        let mut bytes = Vec::new();
        BarChart::new(&comparison, Metric::Percent)
            .with_facet_size(120, 90)
            .with_dpi(300)
            .encode_png(&mut bytes)
            .unwrap();

        let decoder = png::Decoder::new(bytes.as_slice());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (240, 90));
        let dims = info.pixel_dims.unwrap();
        assert_eq!(dims.unit, png::Unit::Meter);
        assert_eq!(dims.xppu, 11811);
    }
}
