//! Own-station track export, invoked after every own-station fix.

use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub longitude_d: f64,
    pub latitude_d: f64,
    pub altitude_m: f64,
}

pub trait TrackExporter {
    fn export(&mut self, call_sign: &str, track: &[TrackPoint]) -> io::Result<()>;
}

/// Rewrites a KML `LineString` of the whole track so a mapping client can
/// watch the flight live by re-reading the file.
pub struct KmlExporter {
    path: PathBuf,
}

impl KmlExporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TrackExporter for KmlExporter {
    fn export(&mut self, call_sign: &str, track: &[TrackPoint]) -> io::Result<()> {
        let mut coordinates = String::new();
        for point in track {
            coordinates.push_str(&format!(
                "{},{},{}\n",
                point.longitude_d, point.latitude_d, point.altitude_m
            ));
        }
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Paths</name>
    <Placemark>
      <name>{call_sign} track</name>
      <description>{call_sign} weather balloon telemetry</description>
      <Style>
        <LineStyle>
          <color>7f00ffff</color>
          <width>4</width>
        </LineStyle>
        <PolyStyle>
          <color>7f00ff00</color>
        </PolyStyle>
      </Style>
      <LineString>
        <extrude>1</extrude>
        <tessellate>1</tessellate>
        <altitudeMode>absolute</altitudeMode>
        <coordinates>
{coordinates}        </coordinates>
      </LineString>
    </Placemark>
  </Document>
</kml>"#
        );
        fs::write(&self.path, document)
    }
}
