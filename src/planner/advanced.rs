// Advanced PHASE flags
//
// Typed form of the recombination, delta and threshold options. The planner
// treats the produced tokens as opaque and forwards them ahead of `-S`.
use crate::error::{BatchError, BatchResult};
use serde::{Deserialize, Serialize};

const DEFAULT_CALL_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "model", rename_all = "UPPERCASE")]
pub enum RecombinationModel {
    #[default]
    Mr0,
    /// Always run with n = 1.
    Mr1,
    /// One or two hotspot intervals `(a, b)`.
    Mr2 { hotspots: Vec<(u32, u32)> },
    Mr3,
    Mr4 { r: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeltaModel {
    #[default]
    Default,
    One,
    File(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdvancedOptions {
    #[serde(default)]
    pub recombination: RecombinationModel,
    #[serde(default)]
    pub individual_cap: Option<u32>,
    #[serde(default)]
    pub delta: DeltaModel,
    #[serde(default)]
    pub p_threshold: Option<f64>,
    #[serde(default)]
    pub q_threshold: Option<f64>,
    /// Free-form flags, split on whitespace.
    #[serde(default)]
    pub extra_flags: String,
}

impl AdvancedOptions {
    pub fn to_args(&self) -> BatchResult<Vec<String>> {
        let mut args = Vec::new();

        match &self.recombination {
            RecombinationModel::Mr0 => args.push("-MR0".to_string()),
            RecombinationModel::Mr3 => args.push("-MR3".to_string()),
            RecombinationModel::Mr1 => {
                args.push("-MR1".to_string());
                args.push("1".to_string());
            }
            RecombinationModel::Mr2 { hotspots } => {
                if hotspots.is_empty() || hotspots.len() > 2 {
                    return Err(BatchError::config("-MR2 takes one or two hotspots"));
                }
                args.push("-MR2".to_string());
                args.push(hotspots.len().to_string());
                for (i, &(a, b)) in hotspots.iter().enumerate() {
                    if a == 0 || b == 0 {
                        return Err(BatchError::config(format!(
                            "Please provide a{n} and b{n} for -MR2.",
                            n = i + 1
                        )));
                    }
                    args.push(a.min(b).to_string());
                    args.push(a.max(b).to_string());
                }
            }
            RecombinationModel::Mr4 { r } => {
                let r = r.trim();
                if r.is_empty() {
                    return Err(BatchError::config("Please provide a -R value for -MR4."));
                }
                args.push("-MR4".to_string());
                args.push("-R".to_string());
                args.push(r.to_string());
            }
        }

        if let Some(n) = self.individual_cap {
            args.push("-N".to_string());
            args.push(n.to_string());
        }

        match &self.delta {
            DeltaModel::Default => {}
            DeltaModel::One => args.push("-d1".to_string()),
            DeltaModel::File(file) => {
                let file = file.trim();
                if file.is_empty() {
                    return Err(BatchError::config("Please choose a delta file for -d<file>."));
                }
                args.push(format!("-d{}", file));
            }
        }

        for (flag, value) in [("-p", self.p_threshold), ("-q", self.q_threshold)] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(BatchError::config(format!(
                        "{} threshold must be between 0 and 1, got {}",
                        flag, v
                    )));
                }
                if (v - DEFAULT_CALL_THRESHOLD).abs() > f64::EPSILON {
                    args.push(format!("{}{}", flag, v));
                }
            }
        }

        args.extend(self.extra_flags.split_whitespace().map(String::from));

        Ok(args)
    }
}
