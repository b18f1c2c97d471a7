use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open date interval `[begin, end)`. A missing `end` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub begin: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < begin {
            return Err(Error::config(format!(
                "date range ends ({end}) before it begins ({begin})"
            )));
        }
        Ok(Self {
            begin,
            end: Some(end),
        })
    }

    pub fn since(begin: NaiveDate) -> Self {
        Self { begin, end: None }
    }

    /// Parse two ISO dates (`YYYY-MM-DD`).
    pub fn parse(begin: &str, end: &str) -> Result<Self> {
        Self::new(begin.parse()?, end.parse()?)
    }

    pub fn is_empty(self: &Self) -> bool {
        self.end.is_some_and(|end| end <= self.begin)
    }

    pub fn contains(self: &Self, date: NaiveDate) -> bool {
        date >= self.begin && self.end.map_or(true, |end| date < end)
    }

    /// Overlap of two ranges, `None` when they do not overlap.
    pub fn intersect(self: &Self, other: &DateRange) -> Option<DateRange> {
        let begin = self.begin.max(other.begin);
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let range = DateRange { begin, end };
        (!range.is_empty()).then_some(range)
    }

    /// Last day inside the range.
    pub fn last_day(self: &Self) -> Option<NaiveDate> {
        self.end.map(|end| end - Duration::days(1))
    }
}

impl fmt::Display for DateRange {
    fn fmt(self: &Self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.begin, end),
            None => write!(f, "[{}, ..)", self.begin),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Landsat generations, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Sensor {
    Landsat5,
    Landsat7,
    Landsat8,
}

impl Sensor {
    pub const ALL: [Sensor; 3] = [Sensor::Landsat5, Sensor::Landsat7, Sensor::Landsat8];

    /// Short key used in log columns (`L5Dates`...).
    pub fn key(self: &Self) -> &'static str {
        match self {
            Self::Landsat5 => "L5",
            Self::Landsat7 => "L7",
            Self::Landsat8 => "L8",
        }
    }

    /// Value of the STAC `platform` property.
    pub fn platform(self: &Self) -> &'static str {
        match self {
            Self::Landsat5 => "landsat-5",
            Self::Landsat7 => "landsat-7",
            Self::Landsat8 => "landsat-8",
        }
    }

    /// Earth Engine image collection the exports read from.
    pub fn export_collection(self: &Self) -> &'static str {
        match self {
            Self::Landsat5 => "LANDSAT/LT05/C02/T1_TOA",
            Self::Landsat7 => "LANDSAT/LE07/C02/T1_TOA",
            Self::Landsat8 => "LANDSAT/LC08/C02/T1_TOA",
        }
    }

    pub fn bands(self: &Self) -> &'static [&'static str] {
        match self {
            Self::Landsat5 => &["B1", "B2", "B3", "B4", "B5", "B6"],
            Self::Landsat7 => &["B1", "B2", "B3", "B4", "B5", "B6_VCID_1"],
            Self::Landsat8 => &["B2", "B3", "B4", "B5", "B6", "B10"],
        }
    }

    /// Dates this sensor produces usable scenes for. Landsat 7 stops at the
    /// scan line corrector failure.
    pub fn window(self: &Self) -> DateRange {
        match self {
            Self::Landsat5 => DateRange {
                begin: ymd(1984, 1, 1),
                end: Some(ymd(2012, 5, 1)),
            },
            Self::Landsat7 => DateRange {
                begin: ymd(1999, 1, 1),
                end: Some(ymd(2003, 5, 31)),
            },
            Self::Landsat8 => DateRange::since(ymd(2013, 1, 1)),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(self: &Self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Landsat5 => write!(f, "Landsat 5 TM"),
            Self::Landsat7 => write!(f, "Landsat 7 ETM+"),
            Self::Landsat8 => write!(f, "Landsat 8 OLI/TIRS"),
        }
    }
}

/// Elevation rasters exported once per glacier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ElevationDataset {
    /// Global GMTED2010, used on its own in coarse-only runs.
    Coarse,
    /// SRTM 1 arc-second.
    Regional,
    /// ArcticDEM 2 m mosaic.
    HighRes,
}

impl ElevationDataset {
    pub fn asset_id(self: &Self) -> &'static str {
        match self {
            Self::Coarse => "USGS/GMTED2010",
            Self::Regional => "USGS/SRTMGL1_003",
            Self::HighRes => "UMN/PGC/ArcticDEM/V3/2m_mosaic",
        }
    }

    pub fn scale(self: &Self) -> f64 {
        match self {
            Self::Coarse | Self::Regional => 30.0,
            Self::HighRes => 2.0,
        }
    }

    /// Output file name: the asset id with path separators flattened.
    pub fn output_name(self: &Self) -> String {
        self.asset_id().replace('/', "_")
    }
}
