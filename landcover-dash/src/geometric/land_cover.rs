use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Land cover class code (ESA WorldCover uses 10, 20, ..., 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassCode(pub u16);

impl ClassCode {
    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ClassCode {
    fn from(code: u16) -> Self {
        ClassCode(code)
    }
}

/// Grouped reducers emit the group field as a JSON number, sometimes as `10.0`.
/// Integral floats are accepted; fractional, negative or zero codes are not.
impl<'de> Deserialize<'de> for ClassCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        if raw.fract() != 0.0 || raw < 1.0 || raw > f64::from(u16::MAX) {
            return Err(serde::de::Error::custom(format!(
                "invalid land cover class code: {}",
                raw
            )));
        }
        Ok(ClassCode(raw as u16))
    }
}

/// RGB color of a class in legends, palettes and pie charts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// `#rrggbb`, lowercase
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            anyhow::bail!("Expected a #rrggbb color, got {:?}", s);
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).context(format!("Invalid color: {:?}", s))
        };
        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Neutral grey used for codes missing from the class table and for pie remainders
pub const UNKNOWN_CLASS_COLOR: Rgb = Rgb::new(0x99, 0x99, 0x99);

/// ESA WorldCover v200 class codes
/// Name                Code
/// Tree cover           10
/// Shrubland            20
/// Grassland            30
/// Cropland             40
/// Built-up             50
/// Bare / sparse        60
/// Snow & ice           70
/// Permanent water      80
/// Herbaceous wetland   90
/// Mangroves            95
/// Moss & lichen       100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldCoverClass {
    TreeCover = 10,
    Shrubland = 20,
    Grassland = 30,
    Cropland = 40,
    BuiltUp = 50,
    BareSparse = 60,
    SnowIce = 70,
    PermanentWater = 80,
    HerbaceousWetland = 90,
    Mangroves = 95,
    MossLichen = 100,
}

impl WorldCoverClass {
    pub const ALL: [WorldCoverClass; 11] = [
        WorldCoverClass::TreeCover,
        WorldCoverClass::Shrubland,
        WorldCoverClass::Grassland,
        WorldCoverClass::Cropland,
        WorldCoverClass::BuiltUp,
        WorldCoverClass::BareSparse,
        WorldCoverClass::SnowIce,
        WorldCoverClass::PermanentWater,
        WorldCoverClass::HerbaceousWetland,
        WorldCoverClass::Mangroves,
        WorldCoverClass::MossLichen,
    ];

    pub fn code(self) -> ClassCode {
        ClassCode(self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            WorldCoverClass::TreeCover => "Tree cover",
            WorldCoverClass::Shrubland => "Shrubland",
            WorldCoverClass::Grassland => "Grassland",
            WorldCoverClass::Cropland => "Cropland",
            WorldCoverClass::BuiltUp => "Built-up",
            WorldCoverClass::BareSparse => "Bare / sparse",
            WorldCoverClass::SnowIce => "Snow & ice",
            WorldCoverClass::PermanentWater => "Permanent water",
            WorldCoverClass::HerbaceousWetland => "Herbaceous wetland",
            WorldCoverClass::Mangroves => "Mangroves",
            WorldCoverClass::MossLichen => "Moss & lichen",
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            WorldCoverClass::TreeCover => Rgb::new(0x00, 0x64, 0x00),
            WorldCoverClass::Shrubland => Rgb::new(0xff, 0xbb, 0x22),
            WorldCoverClass::Grassland => Rgb::new(0xff, 0xff, 0x4c),
            WorldCoverClass::Cropland => Rgb::new(0xf0, 0x96, 0xff),
            WorldCoverClass::BuiltUp => Rgb::new(0xfa, 0x00, 0x00),
            WorldCoverClass::BareSparse => Rgb::new(0xb4, 0xb4, 0xb4),
            WorldCoverClass::SnowIce => Rgb::new(0xf0, 0xf0, 0xf0),
            WorldCoverClass::PermanentWater => Rgb::new(0x00, 0x64, 0xc8),
            WorldCoverClass::HerbaceousWetland => Rgb::new(0x00, 0x96, 0xa0),
            WorldCoverClass::Mangroves => Rgb::new(0x00, 0xcf, 0x75),
            WorldCoverClass::MossLichen => Rgb::new(0xfa, 0xe6, 0xa0),
        }
    }
}

impl TryFrom<ClassCode> for WorldCoverClass {
    type Error = ClassCode;

    fn try_from(code: ClassCode) -> std::result::Result<Self, ClassCode> {
        WorldCoverClass::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or(code)
    }
}

/// One entry of the class reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub code: ClassCode,
    pub name: String,
    pub color: Rgb,
}

impl From<WorldCoverClass> for ClassInfo {
    fn from(class: WorldCoverClass) -> Self {
        ClassInfo {
            code: class.code(),
            name: class.name().to_string(),
            color: class.color(),
        }
    }
}

/// Static class reference table, loaded once per session and never mutated
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    classes: BTreeMap<ClassCode, ClassInfo>,
}

impl ClassTable {
    /// Build a table from explicit entries. Duplicate codes are rejected.
    pub fn new(entries: Vec<ClassInfo>) -> Result<Self> {
        let mut classes = BTreeMap::new();
        for info in entries {
            let code = info.code;
            if classes.insert(code, info).is_some() {
                anyhow::bail!("Duplicate class code {} in class table", code);
            }
        }
        if classes.is_empty() {
            anyhow::bail!("Class table must contain at least one class");
        }
        Ok(ClassTable { classes })
    }

    /// The 11-class ESA WorldCover legend
    pub fn worldcover() -> Self {
        ClassTable {
            classes: WorldCoverClass::ALL
                .iter()
                .map(|&c| (c.code(), ClassInfo::from(c)))
                .collect(),
        }
    }

    pub fn get(&self, code: ClassCode) -> Option<&ClassInfo> {
        self.classes.get(&code)
    }

    pub fn contains(&self, code: ClassCode) -> bool {
        self.classes.contains_key(&code)
    }

    /// Codes in ascending order
    pub fn codes(&self) -> impl Iterator<Item = ClassCode> + '_ {
        self.classes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Display name, falling back to `Class <code>` for codes outside the table
    pub fn label(&self, code: ClassCode) -> String {
        self.get(code)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("Class {}", code))
    }

    pub fn color(&self, code: ClassCode) -> Rgb {
        self.get(code).map(|info| info.color).unwrap_or(UNKNOWN_CLASS_COLOR)
    }

    /// Palette for the full classification layer: colors in code order,
    /// stretched between the smallest and largest code.
    pub fn palette(&self) -> Palette {
        let min = self.codes().next().map(ClassCode::value).unwrap_or(0);
        let max = self.codes().last().map(ClassCode::value).unwrap_or(0);
        Palette {
            min,
            max,
            colors: self.iter().map(|info| info.color).collect(),
        }
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        ClassTable::worldcover()
    }
}

/// Visualization parameters of the full classification layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Palette {
    pub min: u16,
    pub max: u16,
    pub colors: Vec<Rgb>,
}

impl Palette {
    /// Colors as hex strings without `#`, the form tile servers take in query strings
    pub fn to_query_value(&self) -> String {
        self.colors
            .iter()
            .map(|c| c.to_hex().trim_start_matches('#').to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
