//! Enlargement methods and the strategy table that describes them.
//!
//! The planner never hard-codes what a method does. Output size, safe
//! magnification ceiling and relative cost all come from a [`MethodTable`],
//! which starts from the stock entries below and can be overridden per method
//! in `wallfit.toml`:
//!
//! | Method | Scale | Max factor | Cost |
//! |--------|-------|------------|------|
//! | `upscale2x` | fixed 2× | 2 | cheap |
//! | `upscale4x` | fixed 4× | 4 | cheap |
//! | `aurasr` | fixed 4× | 4 | cheap |
//! | `usdu` | variable | 4 | expensive |
//! | `none` | 1× (base image as-is) | 1 | free |
//!
//! Fixed scales are limited to [`MAX_FIXED_SCALE`] and no enlarged edge may
//! exceed [`MAX_DIMENSION`] pixels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest integer scale a fixed-scale method may declare.
pub const MAX_FIXED_SCALE: u32 = 16;

/// Largest edge of an enlarged image; JPEG cannot address more.
pub const MAX_DIMENSION: u32 = 65_535;

/// An enlargement whose output would not fit in an image.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize)]
#[error(
    "enlarging {base_width}x{base_height} by {factor}x exceeds {} pixels per edge",
    MAX_DIMENSION
)]
pub struct OutputSizeError {
    pub base_width: u32,
    pub base_height: u32,
    pub factor: f64,
}

/// An enlargement pipeline offered by the external enlarger.
///
/// Declaration order is also dispatch order: all `upscale2x` tasks run before
/// any `upscale4x` task, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Upscale2x,
    Upscale4x,
    #[serde(rename = "aurasr")]
    AuraSr,
    Usdu,
    None,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Upscale2x,
        Method::Upscale4x,
        Method::AuraSr,
        Method::Usdu,
        Method::None,
    ];

    /// Name used in config files, CLI flags and artifact filenames.
    pub fn name(self) -> &'static str {
        match self {
            Method::Upscale2x => "upscale2x",
            Method::Upscale4x => "upscale4x",
            Method::AuraSr => "aurasr",
            Method::Usdu => "usdu",
            Method::None => "none",
        }
    }

    /// Whether this method produces an enlarged artifact at all.
    pub fn enlarges(self) -> bool {
        self != Method::None
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Method::ALL.iter().map(|m| m.name()).collect();
                format!("unknown method '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// How a method's output size relates to its input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Always magnifies by exactly this integer factor.
    Fixed(u32),
    /// Magnifies by whatever factor is requested, up to `max_factor`.
    Variable,
}

/// Relative cost of running a method on the enlargement backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    Free,
    Cheap,
    Expensive,
}

impl fmt::Display for CostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CostClass::Free => "free",
            CostClass::Cheap => "cheap",
            CostClass::Expensive => "expensive",
        })
    }
}

/// Strategy entry for one method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodSpec {
    pub scale: Scale,
    /// Largest magnification this method is trusted to deliver without
    /// visible artifacts. Devices needing more get a forced-magnification
    /// warning.
    pub max_factor: f64,
    pub cost: CostClass,
}

impl MethodSpec {
    /// Output dimensions when enlarging a `base` image for a required `factor`.
    ///
    /// Fixed-scale methods ignore `factor`. Variable-scale methods honor it,
    /// capped at `max_factor`, truncating to whole pixels. Fails when either
    /// edge would exceed [`MAX_DIMENSION`].
    pub fn output_size(
        &self,
        base: (u32, u32),
        factor: f64,
    ) -> Result<(u32, u32), OutputSizeError> {
        let size = match self.scale {
            Scale::Fixed(n) => base.0.checked_mul(n).zip(base.1.checked_mul(n)),
            Scale::Variable => {
                let f = self.applied_factor(factor);
                let w = (base.0 as f64 * f).floor();
                let h = (base.1 as f64 * f).floor();
                (w <= u32::MAX as f64 && h <= u32::MAX as f64).then(|| (w as u32, h as u32))
            }
        };
        match size {
            Some((w, h)) if w <= MAX_DIMENSION && h <= MAX_DIMENSION => Ok((w, h)),
            _ => Err(OutputSizeError {
                base_width: base.0,
                base_height: base.1,
                factor: self.applied_factor(factor),
            }),
        }
    }

    /// The factor actually applied for a required `factor`.
    pub fn applied_factor(&self, factor: f64) -> f64 {
        match self.scale {
            Scale::Fixed(n) => n as f64,
            Scale::Variable => factor.min(self.max_factor).max(1.0),
        }
    }
}

/// Lookup table from method to its strategy entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodTable {
    specs: BTreeMap<Method, MethodSpec>,
}

impl MethodTable {
    /// The stock table (see the [module docs](self)).
    pub fn stock() -> Self {
        let specs = Method::ALL
            .into_iter()
            .map(|m| (m, stock_spec(m)))
            .collect();
        Self { specs }
    }

    /// Stock table with user overrides layered on top.
    pub fn with_overrides(overrides: &BTreeMap<Method, MethodSpec>) -> Self {
        let mut table = Self::stock();
        for (method, spec) in overrides {
            table.specs.insert(*method, *spec);
        }
        table
    }

    pub fn get(&self, method: Method) -> MethodSpec {
        self.specs
            .get(&method)
            .copied()
            .unwrap_or_else(|| stock_spec(method))
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::stock()
    }
}

fn stock_spec(method: Method) -> MethodSpec {
    match method {
        Method::Upscale2x => MethodSpec {
            scale: Scale::Fixed(2),
            max_factor: 2.0,
            cost: CostClass::Cheap,
        },
        Method::Upscale4x | Method::AuraSr => MethodSpec {
            scale: Scale::Fixed(4),
            max_factor: 4.0,
            cost: CostClass::Cheap,
        },
        Method::Usdu => MethodSpec {
            scale: Scale::Variable,
            max_factor: 4.0,
            cost: CostClass::Expensive,
        },
        Method::None => MethodSpec {
            scale: Scale::Fixed(1),
            max_factor: 1.0,
            cost: CostClass::Free,
        },
    }
}
