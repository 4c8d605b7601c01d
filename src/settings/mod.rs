use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, de};

use crate::Interval;
use crate::algorithms::Algorithm;
use crate::area::RoutingArea;
use crate::entities::Pin;

/// YAML scalar bridged to an exact decimal. Quoted strings and integers
/// parse digit-for-digit; floats go through their shortest round-trip
/// rendering, which reproduces the literal for human-authored settings
/// values.
#[derive(Debug, Clone, Copy)]
struct YamlDec(Decimal);

impl<'de> Deserialize<'de> for YamlDec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<YamlDec, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = YamlDec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal number")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<YamlDec, E> {
                Ok(YamlDec(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<YamlDec, E> {
                Ok(YamlDec(Decimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<YamlDec, E> {
                Decimal::from_str(&v.to_string()).map(YamlDec).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<YamlDec, E> {
                Decimal::from_str(v).map(YamlDec).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[derive(Debug, Deserialize)]
struct PinDoc {
    x: YamlDec,
    y: YamlDec,
}

#[derive(Debug, Deserialize)]
struct XIntervalDoc {
    x_min: YamlDec,
    x_max: YamlDec,
}

#[derive(Debug, Deserialize)]
struct FixNetDoc {
    space: YamlDec,
}

/// Raw problem-settings document as it appears in the YAML file.
#[derive(Debug, Deserialize)]
pub struct SettingsDoc {
    num_gaps: usize,
    num_subchannels: usize,
    gap_y_interval: YamlDec,
    y_bottom_blockage: YamlDec,
    avoid_points: IndexMap<String, PinDoc>,
    blockage_x_intervals: Vec<XIntervalDoc>,
    subchannel_x_intervals: Vec<XIntervalDoc>,
    gap_width: IndexMap<String, YamlDec>,
    shield_width: IndexMap<String, YamlDec>,
    subchannel_width: IndexMap<String, YamlDec>,
    #[serde(default)]
    fix_net_group: IndexMap<String, FixNetDoc>,
}

impl SettingsDoc {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read problem settings {}", path.display()))?;
        let doc = serde_yaml::from_str(text.trim_start_matches('\u{feff}'))
            .with_context(|| format!("cannot parse problem settings {}", path.display()))?;
        Ok(doc)
    }
}

/// Run-scoped options taken from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub reserved_areas_file: PathBuf,
    pub target_layer: String,
    pub algorithm: Algorithm,
    pub use_gco: bool,
    pub save_dir: PathBuf,
}

/// Reserved circuit-block rectangle on the target layer.
#[derive(Debug, Clone)]
pub struct ReservedArea {
    pub x_interval: Interval,
    pub y_interval: Interval,
}

/// Problem geometry with every layer-dependent width resolved for the
/// target layer.
#[derive(Debug)]
pub struct ProblemSettings {
    pub reserved_areas_file: PathBuf,
    pub target_layer: String,
    pub algorithm: Algorithm,
    pub use_gco: bool,
    pub save_dir: PathBuf,

    pub n_gaps: usize,
    pub n_subchannels: usize,
    /// Vertical pitch between consecutive routing rows.
    pub interval: Decimal,
    pub y_bottom_blockage: Decimal,
    pub avoid_points: FxHashMap<String, Pin>,
    pub blockage_x_intervals: Vec<Interval>,
    pub subchannel_x_intervals: Vec<Interval>,
    pub gap_width: Decimal,
    pub shield_width: Decimal,
    pub subchannel_width: Decimal,
    /// Per-group spacing overrides applied at netlist load.
    pub fix_net_space: FxHashMap<String, Decimal>,
}

fn layer_width(
    map: &IndexMap<String, YamlDec>,
    layer: &str,
    what: &str,
) -> Result<Decimal> {
    map.get(layer)
        .map(|d| d.0)
        .with_context(|| format!("no {what} configured for layer {layer}"))
}

impl ProblemSettings {
    pub fn new(doc: SettingsDoc, opts: RunOptions) -> Result<Self> {
        let gap_width = layer_width(&doc.gap_width, &opts.target_layer, "gap width")?;
        let shield_width = layer_width(&doc.shield_width, &opts.target_layer, "shield width")?;
        let subchannel_width =
            layer_width(&doc.subchannel_width, &opts.target_layer, "subchannel width")?;

        let avoid_points = doc
            .avoid_points
            .into_iter()
            .map(|(k, p)| (k, Pin::new(p.x.0, p.y.0)))
            .collect();

        let mut blockage_x_intervals: Vec<Interval> = doc
            .blockage_x_intervals
            .into_iter()
            .map(|iv| Interval::new(iv.x_min.0, iv.x_max.0))
            .collect();
        blockage_x_intervals.sort_by_key(|iv| iv.begin);

        let mut subchannel_x_intervals: Vec<Interval> = doc
            .subchannel_x_intervals
            .into_iter()
            .map(|iv| Interval::new(iv.x_min.0, iv.x_max.0))
            .collect();
        subchannel_x_intervals.sort_by_key(|iv| iv.begin);

        let fix_net_space = doc
            .fix_net_group
            .into_iter()
            .map(|(k, f)| (k, f.space.0))
            .collect();

        Ok(Self {
            reserved_areas_file: opts.reserved_areas_file,
            target_layer: opts.target_layer,
            algorithm: opts.algorithm,
            use_gco: opts.use_gco,
            save_dir: opts.save_dir,
            n_gaps: doc.num_gaps,
            n_subchannels: doc.num_subchannels,
            interval: doc.gap_y_interval.0,
            y_bottom_blockage: doc.y_bottom_blockage.0,
            avoid_points,
            blockage_x_intervals,
            subchannel_x_intervals,
            gap_width,
            shield_width,
            subchannel_width,
            fix_net_space,
        })
    }

    /// Clear vertical distance between the top of one gap and the bottom
    /// of the next.
    pub fn gap_interval(&self) -> Decimal {
        self.interval - self.gap_width
    }

    pub fn gap_height(&self, i: usize) -> Decimal {
        let i = Decimal::from(i as u64);
        self.y_bottom_blockage + (i + Decimal::ONE) * self.gap_interval() + i * self.gap_width
    }

    /// Width-only probe area for allocatability checks.
    pub fn generate_gap(&self) -> RoutingArea {
        RoutingArea::new(0, self.gap_width, Decimal::ZERO)
    }

    pub fn generate_gaps(&self) -> Vec<RoutingArea> {
        (0..self.n_gaps)
            .map(|i| RoutingArea::new(i, self.gap_width, self.gap_height(i)))
            .collect()
    }

    pub fn num_subchannel_cols(&self) -> usize {
        self.subchannel_x_intervals.len()
    }

    pub fn subchannel_interval(&self) -> Decimal {
        self.interval
    }

    pub fn subchannel_height(&self, i: usize) -> Decimal {
        self.y_bottom_blockage + Decimal::from(i as u64) * self.subchannel_interval()
    }

    pub fn generate_subchannel(&self) -> RoutingArea {
        RoutingArea::new(0, self.subchannel_width, Decimal::ZERO)
    }

    pub fn generate_subchannels(&self) -> Vec<RoutingArea> {
        (0..self.n_subchannels)
            .map(|i| RoutingArea::new(i, self.subchannel_width, self.subchannel_height(i)))
            .collect()
    }

    /// Reserved rectangles on the target layer, in file order.
    pub fn read_reserved_areas(&self) -> Result<Vec<ReservedArea>> {
        let text = fs::read_to_string(&self.reserved_areas_file).with_context(|| {
            format!("cannot read reserved areas {}", self.reserved_areas_file.display())
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

        let mut reserved = Vec::new();
        for record in reader.records() {
            let row = record.context("malformed reserved areas row")?;
            let layer = row.get(0).unwrap_or_default();
            if layer != self.target_layer {
                continue;
            }
            let field = |i: usize| -> Result<Decimal> {
                let cell = row
                    .get(i)
                    .with_context(|| format!("reserved areas row too short: {row:?}"))?;
                Decimal::from_str(cell.trim())
                    .with_context(|| format!("bad reserved area coordinate {cell:?}"))
            };
            let (x_min, y_min, x_max, y_max) = (field(1)?, field(2)?, field(3)?, field(4)?);
            reserved.push(ReservedArea {
                x_interval: Interval::new(x_min, x_max),
                y_interval: Interval::new(y_min, y_max),
            });
        }
        Ok(reserved)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    pub(crate) const SETTINGS_YAML: &str = "\
num_gaps: 3
num_subchannels: 2
gap_y_interval: 12.5
y_bottom_blockage: 2
avoid_points:
  \"7\": {x: 1.5, y: 40}
blockage_x_intervals:
  - {x_min: 30, x_max: 40}
  - {x_min: 10, x_max: 20}
subchannel_x_intervals:
  - {x_min: 0, x_max: 10}
  - {x_min: 20, x_max: 30}
gap_width: {D1: 10, D2: 8}
shield_width: {D1: 0.4, D2: \"0.5\"}
subchannel_width: {D1: 5, D2: 4}
fix_net_group:
  fx_a: {space: 0.3}
";

    pub(crate) fn options() -> RunOptions {
        RunOptions {
            reserved_areas_file: PathBuf::from("reserved.csv"),
            target_layer: "D1".to_string(),
            algorithm: Algorithm::Le,
            use_gco: false,
            save_dir: PathBuf::from("out"),
        }
    }

    #[test]
    fn yaml_scalars_parse_exactly() {
        let ps = ProblemSettings::new(
            serde_yaml::from_str(SETTINGS_YAML).unwrap(),
            options(),
        )
        .unwrap();
        assert_eq!(ps.interval, dec!(12.5));
        assert_eq!(ps.shield_width, dec!(0.4));
        assert_eq!(ps.gap_width, dec!(10));
        assert_eq!(ps.avoid_points["7"], Pin::new(dec!(1.5), dec!(40)));
        assert_eq!(ps.fix_net_space["a_1"], dec!(0.3));
        // intervals come back sorted by begin
        assert_eq!(ps.blockage_x_intervals[0].begin, dec!(10));
        assert_eq!(ps.blockage_x_intervals[1].begin, dec!(30));
    }

    #[test]
    fn quoted_widths_parse_like_floats() {
        let mut opts = options();
        opts.target_layer = "D2".to_string();
        let ps =
            ProblemSettings::new(serde_yaml::from_str(SETTINGS_YAML).unwrap(), opts).unwrap();
        assert_eq!(ps.shield_width, dec!(0.5));
    }

    #[test]
    fn gap_heights_climb_by_pitch() {
        let ps = ProblemSettings::new(
            serde_yaml::from_str(SETTINGS_YAML).unwrap(),
            options(),
        )
        .unwrap();
        // gap interval 12.5 - 10 = 2.5
        assert_eq!(ps.gap_height(0), dec!(4.5));
        assert_eq!(ps.gap_height(1), dec!(17));
        assert_eq!(ps.subchannel_height(1), dec!(14.5));
        let gaps = ps.generate_gaps();
        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[2].y_mid(), dec!(29.5) + dec!(5));
    }

    #[test]
    fn reserved_areas_filter_by_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\u{feff}D1,0,0,10,5").unwrap();
        writeln!(file, "D2,0,0,99,99").unwrap();
        writeln!(file, "D1,20,0,30,5").unwrap();
        let mut opts = options();
        opts.reserved_areas_file = file.path().to_path_buf();
        let ps =
            ProblemSettings::new(serde_yaml::from_str(SETTINGS_YAML).unwrap(), opts).unwrap();
        let reserved = ps.read_reserved_areas().unwrap();
        assert_eq!(reserved.len(), 2);
        assert_eq!(reserved[0].x_interval, Interval::new(dec!(0), dec!(10)));
        assert_eq!(reserved[1].x_interval, Interval::new(dec!(20), dec!(30)));
        assert_eq!(reserved[0].y_interval, Interval::new(dec!(0), dec!(5)));
    }
}
