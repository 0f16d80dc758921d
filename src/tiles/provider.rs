use std::sync::atomic::AtomicUsize;

use crate::core::constants::TILE_SIZE;
use crate::{MapError, Result};

/// Configuration of one online tile provider, parsed from a positional CSV
/// line:
///
/// ```text
/// name,code,minZoom,maxZoom,tileSize,urlTemplate[,mirror1..mirror4][,"yinverse"|"ellipsoid"][,secret]
/// ```
///
/// A line is rejected when name, code or URL template is empty, or the zoom
/// fields are not integers. `{comma}` in the template stands for a literal
/// comma.
#[derive(Debug)]
pub struct TileProvider {
    pub name: String,
    pub code: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub url_template: String,
    /// Mirror host tokens substituted for `{$s}`, rotated round-robin.
    pub servers: Vec<String>,
    pub inverse_y: bool,
    pub ellipsoid: bool,
    pub secret: Option<String>,
    pub locale: String,
    pub(crate) next_server: AtomicUsize,
}

impl TileProvider {
    /// Parses a single provider configuration line.
    pub fn from_line(line: &str) -> Result<TileProvider> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());

        let record = match reader.records().next() {
            Some(Ok(record)) => record,
            Some(Err(e)) => return Err(MapError::Provider(e.to_string())),
            None => return Err(MapError::Provider("empty line".into())),
        };

        let field = |i: usize| record.get(i).unwrap_or("").trim();

        if record.len() < 6 {
            return Err(MapError::Provider(format!(
                "expected at least 6 fields, got {}",
                record.len()
            )));
        }
        if field(0).is_empty() || field(1).is_empty() || field(5).is_empty() {
            return Err(MapError::Provider(
                "name, code and URL template must not be empty".into(),
            ));
        }

        let min_zoom: u8 = field(2)
            .parse()
            .map_err(|_| MapError::Provider(format!("bad min zoom {:?}", field(2))))?;
        let max_zoom: u8 = field(3)
            .parse()
            .map_err(|_| MapError::Provider(format!("bad max zoom {:?}", field(3))))?;
        let tile_size = if field(4).is_empty() {
            TILE_SIZE
        } else {
            field(4)
                .parse()
                .map_err(|_| MapError::Provider(format!("bad tile size {:?}", field(4))))?
        };

        let servers: Vec<String> = (6..10)
            .map(field)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let flag = field(10);
        let secret = match field(11) {
            "" => None,
            s => Some(s.to_string()),
        };

        Ok(TileProvider {
            name: field(0).to_string(),
            code: field(1).to_string(),
            min_zoom,
            max_zoom,
            tile_size,
            url_template: field(5).replace("{comma}", ","),
            servers,
            inverse_y: flag == "yinverse",
            ellipsoid: flag == "ellipsoid",
            secret,
            locale: "en".to_string(),
            next_server: AtomicUsize::new(0),
        })
    }

    /// Sets the locale substituted for `{$l}`.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

/// Parses a multi-line provider configuration, skipping rejected lines.
pub fn providers_from_str(config: &str) -> Vec<TileProvider> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match TileProvider::from_line(line) {
            Ok(provider) => Some(provider),
            Err(e) => {
                log::warn!("skipping provider line {:?}: {}", line, e);
                None
            }
        })
        .collect()
}
