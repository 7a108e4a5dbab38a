// GDAL Persistent Auxiliary Metadata: category names live in
// <file>.aux.xml next to the raster, indexed by cell value.

use super::{Legend, RasterError, NODATA};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn pam_sidecar_path<P: AsRef<Path>>(raster_path: P) -> PathBuf {
    let mut name = raster_path.as_ref().as_os_str().to_os_string();
    name.push(".aux.xml");
    PathBuf::from(name)
}

/// Writes the PAM document for a single band with `legend` as its category
/// table. Codes missing from the legend get an empty category.
pub fn encode_pam<W: Write>(legend: &Legend, writer: W) -> Result<(), RasterError> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);

    let mut band = BytesStart::new("PAMRasterBand");
    band.push_attribute(("band", "1"));
    start(&mut xml, BytesStart::new("PAMDataset"))?;
    start(&mut xml, band)?;
    text_element(&mut xml, "NoDataValue", &NODATA.to_string())?;

    start(&mut xml, BytesStart::new("CategoryNames"))?;
    let max_code = legend.iter().map(|(code, _)| code).max().unwrap_or(NODATA);
    for code in 0..=max_code {
        let name = legend.label(code).map(|label| label.as_str()).unwrap_or("");
        text_element(&mut xml, "Category", name)?;
    }
    end(&mut xml, "CategoryNames")?;

    end(&mut xml, "PAMRasterBand")?;
    end(&mut xml, "PAMDataset")?;
    xml.get_mut().write_all(b"\n")?;
    Ok(())
}

pub fn pam_xml(legend: &Legend) -> Result<String, RasterError> {
    let mut buffer = Vec::new();
    encode_pam(legend, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| RasterError::Io(io::Error::other(e)))
}

pub fn write_pam_legend<P: AsRef<Path>>(legend: &Legend, sidecar_path: P) -> Result<(), RasterError> {
    let mut writer = BufWriter::new(File::create(sidecar_path)?);
    encode_pam(legend, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn start<W: Write>(xml: &mut Writer<W>, element: BytesStart) -> Result<(), RasterError> {
    xml.write_event(Event::Start(element)).map_err(io::Error::other)?;
    Ok(())
}

fn end<W: Write>(xml: &mut Writer<W>, name: &str) -> Result<(), RasterError> {
    xml.write_event(Event::End(BytesEnd::new(name))).map_err(io::Error::other)?;
    Ok(())
}

fn text_element<W: Write>(xml: &mut Writer<W>, name: &str, text: &str) -> Result<(), RasterError> {
    start(xml, BytesStart::new(name))?;
    if !text.is_empty() {
        xml.write_event(Event::Text(BytesText::new(text))).map_err(io::Error::other)?;
    }
    end(xml, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;

    fn categories(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut names = Vec::new();
        let mut inside = false;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == b"Category" => {
                    inside = true;
                    names.push(String::new());
                }
                Event::End(e) if e.name().as_ref() == b"Category" => inside = false,
                Event::Text(t) if inside => {
                    names.last_mut().unwrap().push_str(&t.unescape().unwrap());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        names
    }

    #[test]
    fn categories_are_indexed_by_code() {
        let xml = pam_xml(&Legend::classification()).unwrap();
        let names = categories(&xml);
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], "");
        assert_eq!(names[1], "agriculture");
        assert_eq!(names[7], "no_data");
        assert!(xml.starts_with("<PAMDataset>"));
        assert!(xml.contains("<PAMRasterBand band=\"1\">"));
        assert!(xml.contains("<NoDataValue>0</NoDataValue>"));
    }

    #[test]
    fn sidecar_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = pam_sidecar_path(dir.path().join("lc.tif"));
        write_pam_legend(&Legend::classification(), &path).unwrap();
        let xml = std::fs::read_to_string(&path).unwrap();
        assert_eq!(categories(&xml)[5], "plantations");
    }

    #[test]
    fn sidecar_sits_next_to_the_raster() {
        assert_eq!(
            pam_sidecar_path("results/lc_2018.tif"),
            PathBuf::from("results/lc_2018.tif.aux.xml")
        );
    }
}
